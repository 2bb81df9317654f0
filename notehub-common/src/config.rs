//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. Every value has
//! a compiled default, so a missing or malformed file only produces a
//! warning. Sources are consulted in this order:
//!
//! 1. Command-line arguments (handled by the binary, passed in as overrides)
//! 2. Environment variables (`NOTEHUB_CONFIG`, `NOTEHUB_ROOT`)
//! 3. TOML configuration file
//! 4. Compiled defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NOTEHUB_CONFIG";

/// Environment variable naming the root (data) folder
pub const ROOT_ENV_VAR: &str = "NOTEHUB_ROOT";

/// Route words that can never be used as a free-URL note id
pub const DEFAULT_FORBIDDEN_NOTE_IDS: &[&str] = &[
    "robots.txt", "favicon.ico", "api", "s", "p", "new", "me", "health",
    "login", "logout", "register", "uploads", "uploadimage", "realtime",
    "403", "404", "500",
];

/// Bootstrap configuration loaded from TOML
///
/// Fields are all optional in the file; absent keys take their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL; derived from host/port when absent
    pub server_url: Option<String>,
    pub root_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub uploads_path: Option<PathBuf>,

    pub allow_anonymous: bool,
    pub allow_anonymous_edits: bool,
    pub allow_anonymous_views: bool,
    pub allow_free_url: bool,
    pub allow_pdf_export: bool,
    pub forbidden_note_ids: Vec<String>,
    pub default_permission: String,
    pub session_lifetime_days: i64,
    pub max_upload_bytes: usize,

    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            server_url: None,
            root_folder: None,
            database_path: None,
            uploads_path: None,
            allow_anonymous: true,
            allow_anonymous_edits: false,
            allow_anonymous_views: true,
            allow_free_url: false,
            allow_pdf_export: false,
            forbidden_note_ids: DEFAULT_FORBIDDEN_NOTE_IDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_permission: "limited".to_string(),
            session_lifetime_days: 14,
            max_upload_bytes: 10 * 1024 * 1024,
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Realtime collaboration tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// How often dirty live documents are written back
    pub save_interval_secs: u64,
    /// Upper bound on concurrent editor connections per note
    pub max_clients_per_note: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            save_interval_secs: 5,
            max_clients_per_note: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse TOML text into a config
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load config from the first file found, falling back to defaults
    ///
    /// `explicit` is the `--config` argument. Unreadable or invalid files are
    /// reported and skipped rather than aborting startup.
    pub fn load(explicit: Option<&Path>) -> Self {
        let Some(path) = locate_config_file(explicit) else {
            info!("No config file found, using compiled defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => match Self::from_toml_str(&text) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring invalid config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Find the configuration file
///
/// Priority: explicit argument, `NOTEHUB_CONFIG`, user config dir, `/etc`.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("notehub").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/notehub/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Root folder resolution
///
/// 1. Command-line argument
/// 2. `NOTEHUB_ROOT`
/// 3. `root_folder` from TOML
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default data folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("notehub"))
        .unwrap_or_else(|| PathBuf::from("./notehub_data"))
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub uploads_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub server_url: String,

    pub allow_anonymous: bool,
    pub allow_anonymous_edits: bool,
    pub allow_anonymous_views: bool,
    pub allow_free_url: bool,
    pub allow_pdf_export: bool,
    pub forbidden_note_ids: Vec<String>,
    pub default_permission: crate::Permission,
    pub session_lifetime_days: i64,
    pub max_upload_bytes: usize,

    pub realtime: RealtimeConfig,
    pub log_level: String,
}

/// Command-line overrides applied on top of the TOML config
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl ServerConfig {
    /// Resolve the final configuration from TOML and CLI overrides
    pub fn resolve(toml: TomlConfig, overrides: Overrides) -> Result<Self> {
        let root_folder = resolve_root_folder(overrides.root_folder.as_deref(), &toml);
        let db_path = toml
            .database_path
            .clone()
            .unwrap_or_else(|| root_folder.join("notehub.db"));
        let uploads_path = toml
            .uploads_path
            .clone()
            .unwrap_or_else(|| root_folder.join("uploads"));

        let host = overrides.host.unwrap_or(toml.host);
        let port = overrides.port.unwrap_or(toml.port);
        let server_url = toml
            .server_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let default_permission = toml.default_permission.parse()?;

        if toml.realtime.save_interval_secs == 0 {
            return Err(Error::Config(
                "realtime.save_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            root_folder,
            db_path,
            uploads_path,
            host,
            port,
            server_url,
            allow_anonymous: toml.allow_anonymous,
            allow_anonymous_edits: toml.allow_anonymous_edits,
            allow_anonymous_views: toml.allow_anonymous_views,
            allow_free_url: toml.allow_free_url,
            allow_pdf_export: toml.allow_pdf_export,
            forbidden_note_ids: toml.forbidden_note_ids,
            default_permission,
            session_lifetime_days: toml.session_lifetime_days,
            max_upload_bytes: toml.max_upload_bytes,
            realtime: toml.realtime,
            log_level: overrides.log_level.unwrap_or(toml.logging.level),
        })
    }

    /// Configuration rooted at `root`, everything else defaulted
    ///
    /// Used by tests and by tooling that only needs a data folder.
    pub fn for_root(root: &Path) -> Result<Self> {
        let overrides = Overrides {
            root_folder: Some(root.to_path_buf()),
            ..Default::default()
        };
        Self::resolve(TomlConfig::default(), overrides)
    }

    /// Create the root and uploads folders if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.root_folder, &self.uploads_path] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.allow_anonymous);
        assert!(!config.allow_anonymous_edits);
        assert_eq!(config.realtime.save_interval_secs, 5);
        assert_eq!(config.logging.level, "info");
        assert!(config.forbidden_note_ids.iter().any(|id| id == "api"));
    }

    #[test]
    fn test_partial_toml_overrides_only_given_keys() {
        let text = r#"
            port = 8080
            allow_pdf_export = true

            [realtime]
            max_clients_per_note = 3
        "#;
        let config = TomlConfig::from_toml_str(text).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.allow_pdf_export);
        assert_eq!(config.realtime.max_clients_per_note, 3);
        assert_eq!(config.realtime.save_interval_secs, 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolve_derives_paths_and_url() {
        let overrides = Overrides {
            root_folder: Some(PathBuf::from("/tmp/notehub-root")),
            port: Some(4000),
            ..Default::default()
        };
        let config = ServerConfig::resolve(TomlConfig::default(), overrides).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/notehub-root/notehub.db"));
        assert_eq!(config.uploads_path, PathBuf::from("/tmp/notehub-root/uploads"));
        assert_eq!(config.server_url, "http://127.0.0.1:4000");
    }

    #[test]
    fn test_server_url_trailing_slash_trimmed() {
        let toml = TomlConfig {
            server_url: Some("https://notes.example.com/".to_string()),
            ..Default::default()
        };
        let config = ServerConfig::resolve(toml, Overrides {
            root_folder: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.server_url, "https://notes.example.com");
    }

    #[test]
    fn test_invalid_default_permission_rejected() {
        let toml = TomlConfig {
            default_permission: "everyone".to_string(),
            ..Default::default()
        };
        assert!(ServerConfig::resolve(toml, Overrides::default()).is_err());
    }
}
