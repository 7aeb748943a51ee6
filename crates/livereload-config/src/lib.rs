//! Configuration management for livereload.
//!
//! Parses `livereload.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//! - a bare `$` (e.g. `assets$v2`) is kept literally
//!
//! Expanded fields:
//! - `server.host`
//! - `app.template_dir`
//! - `app.static_dir`
//! - `live_reload.roots`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override debug mode (live reload is only active in debug mode).
    pub debug: Option<bool>,
    /// Override the directories watched for changes.
    pub roots: Option<Vec<PathBuf>>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "livereload.toml";

/// Upper bound for `live_reload.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Upper bound for `live_reload.keep_alive_secs`.
const MAX_KEEP_ALIVE_SECS: u64 = 300;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Application configuration (paths are relative strings from TOML).
    app: AppConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved application configuration (set after loading).
    #[serde(skip)]
    pub app_resolved: AppConfig,
    /// Resolved directories to watch (set after loading).
    #[serde(skip)]
    pub watch_roots: Vec<PathBuf>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5000,
        }
    }
}

/// Raw application configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AppConfigRaw {
    debug: Option<bool>,
    template_dir: Option<String>,
    static_dir: Option<String>,
}

/// Resolved application configuration with absolute paths.
#[derive(Debug, Default)]
pub struct AppConfig {
    /// Whether the application runs in debug mode.
    pub debug: bool,
    /// Directory holding HTML templates.
    pub template_dir: PathBuf,
    /// Directory holding static assets.
    pub static_dir: PathBuf,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Glob patterns a changed path must match (empty = everything).
    pub watch_patterns: Vec<String>,
    /// Glob patterns that never trigger a reload.
    pub ignore_patterns: Vec<String>,
    /// Directories to watch, relative to the config file.
    ///
    /// Defaults to the template and static directories.
    pub roots: Option<Vec<String>>,
    /// Quiet window used to coalesce bursts of filesystem events.
    pub debounce_ms: u64,
    /// Idle interval after which a keep-alive frame is sent to clients.
    pub keep_alive_secs: u64,
    /// Per-client buffer of pending reload messages.
    pub channel_capacity: usize,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            watch_patterns: Vec::new(),
            ignore_patterns: default_ignore_patterns(),
            roots: None,
            debounce_ms: 100,
            keep_alive_secs: 10,
            channel_capacity: 16,
        }
    }
}

/// Editor and VCS noise ignored unless the config says otherwise.
fn default_ignore_patterns() -> Vec<String> {
    [".git", ".DS_Store", "*.swp", "*~"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LIVERELOAD_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `livereload.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(debug) = settings.debug {
            self.app_resolved.debug = debug;
        }
        if let Some(roots) = &settings.roots {
            self.watch_roots.clone_from(roots);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let app_resolved = AppConfig {
            debug: false,
            template_dir: base.join("templates"),
            static_dir: base.join("static"),
        };
        let watch_roots = vec![
            app_resolved.template_dir.clone(),
            app_resolved.static_dir.clone(),
        ];

        Self {
            server: ServerConfig::default(),
            app: AppConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            app_resolved,
            watch_roots,
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        // Validate configuration after loading and resolution
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload;

        if live_reload.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }
        if live_reload.keep_alive_secs == 0 || live_reload.keep_alive_secs > MAX_KEEP_ALIVE_SECS {
            return Err(ConfigError::Validation(format!(
                "live_reload.keep_alive_secs must be between 1 and {MAX_KEEP_ALIVE_SECS}"
            )));
        }
        if live_reload.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "live_reload.channel_capacity must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref dir) = self.app.template_dir {
            self.app.template_dir = Some(expand::expand_env(dir, "app.template_dir")?);
        }
        if let Some(ref dir) = self.app.static_dir {
            self.app.static_dir = Some(expand::expand_env(dir, "app.static_dir")?);
        }
        if let Some(ref mut roots) = self.live_reload.roots {
            for root in roots.iter_mut() {
                *root = expand::expand_env(root, "live_reload.roots")?;
            }
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.app_resolved = AppConfig {
            debug: self.app.debug.unwrap_or(false),
            template_dir: resolve(self.app.template_dir.as_deref(), "templates"),
            static_dir: resolve(self.app.static_dir.as_deref(), "static"),
        };

        self.watch_roots = match &self.live_reload.roots {
            Some(roots) => roots.iter().map(|r| config_dir.join(r)).collect(),
            None => vec![
                self.app_resolved.template_dir.clone(),
                self.app_resolved.static_dir.clone(),
            ],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert!(!config.app_resolved.debug);
        assert_eq!(
            config.app_resolved.template_dir,
            PathBuf::from("/test/templates")
        );
        assert_eq!(config.app_resolved.static_dir, PathBuf::from("/test/static"));
        assert_eq!(
            config.watch_roots,
            vec![
                PathBuf::from("/test/templates"),
                PathBuf::from("/test/static")
            ]
        );
        assert!(config.live_reload.watch_patterns.is_empty());
        assert_eq!(config.live_reload.debounce_ms, 100);
        assert_eq!(config.live_reload.keep_alive_secs, 10);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = "";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.live_reload.ignore_patterns, default_ignore_patterns());
    }

    #[test]
    fn test_parse_server_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_parse_live_reload_config() {
        let toml = r#"
[live_reload]
watch_patterns = ["**/*.html", "**/*.css"]
ignore_patterns = ["__pycache__", "*.log"]
roots = ["."]
debounce_ms = 250
keep_alive_secs = 30
channel_capacity = 4
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.live_reload.watch_patterns,
            vec!["**/*.html".to_owned(), "**/*.css".to_owned()]
        );
        assert_eq!(
            config.live_reload.ignore_patterns,
            vec!["__pycache__".to_owned(), "*.log".to_owned()]
        );
        assert_eq!(config.live_reload.roots, Some(vec![".".to_owned()]));
        assert_eq!(config.live_reload.debounce_ms, 250);
        assert_eq!(config.live_reload.keep_alive_secs, 30);
        assert_eq!(config.live_reload.channel_capacity, 4);
    }

    #[test]
    fn test_resolve_paths_default_roots() {
        let toml = r#"
[app]
debug = true
template_dir = "views"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert!(config.app_resolved.debug);
        assert_eq!(
            config.app_resolved.template_dir,
            PathBuf::from("/project/views")
        );
        assert_eq!(
            config.app_resolved.static_dir,
            PathBuf::from("/project/static")
        );
        assert_eq!(
            config.watch_roots,
            vec![
                PathBuf::from("/project/views"),
                PathBuf::from("/project/static")
            ]
        );
    }

    #[test]
    fn test_resolve_paths_explicit_roots() {
        let toml = r#"
[live_reload]
roots = ["statics", "config"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.watch_roots,
            vec![
                PathBuf::from("/project/statics"),
                PathBuf::from("/project/config")
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[app]
debug = true
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.app_resolved.debug);
        assert_eq!(config.config_path, Some(path));
        assert_eq!(config.watch_roots[0], dir.path().join("templates"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/livereload.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_apply_cli_settings_host() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_debug_and_roots() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            debug: Some(true),
            roots: Some(vec![PathBuf::from("/elsewhere")]),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert!(config.app_resolved.debug);
        assert_eq!(config.watch_roots, vec![PathBuf::from("/elsewhere")]);
        assert_eq!(
            config.app_resolved.template_dir,
            PathBuf::from("/test/templates")
        ); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let config_before = Config::default_with_base(Path::new("/test"));
        let mut config = Config::default_with_base(Path::new("/test"));

        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.server.host, config_before.server.host);
        assert_eq!(config.server.port, config_before.server.port);
        assert_eq!(config.watch_roots, config_before.watch_roots);
    }

    #[test]
    fn test_expand_env_vars_roots() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("LIVERELOAD_TEST_ASSETS", "assets");
        }

        let toml = r#"
[live_reload]
roots = ["${LIVERELOAD_TEST_ASSETS}", "${LIVERELOAD_TEST_UNSET_ROOT:-views}"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(
            config.live_reload.roots,
            Some(vec!["assets".to_owned(), "views".to_owned()])
        );

        unsafe {
            std::env::remove_var("LIVERELOAD_TEST_ASSETS");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("MISSING_VAR_CONFIG_TEST");
        }

        let toml = r#"
[server]
host = "${MISSING_VAR_CONFIG_TEST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("MISSING_VAR_CONFIG_TEST"));
        assert!(err.to_string().contains("server.host"));
    }

    // Validation tests

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let result = config.validate();
        assert!(result.is_err(), "Expected validation to fail");
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_server_host_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.host = String::new();
        assert_validation_error(&config, &["server.host", "empty"]);
    }

    #[test]
    fn test_validate_server_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        assert_validation_error(&config, &["server.port"]);
    }

    #[test]
    fn test_validate_debounce_too_high() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.debounce_ms = 60_000;
        assert_validation_error(&config, &["debounce_ms", "10000"]);
    }

    #[test]
    fn test_validate_zero_debounce_allowed() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.debounce_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_keep_alive_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.keep_alive_secs = 0;
        assert_validation_error(&config, &["keep_alive_secs"]);
    }

    #[test]
    fn test_validate_channel_capacity_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.channel_capacity = 0;
        assert_validation_error(&config, &["channel_capacity"]);
    }

    #[test]
    fn test_load_accepts_blank_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[live_reload]
watch_patterns = ["  "]
ignore_patterns = ["", "*.log"]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.live_reload.watch_patterns, vec!["  ".to_owned()]);
        assert_eq!(
            config.live_reload.ignore_patterns,
            vec![String::new(), "*.log".to_owned()]
        );
    }
}
