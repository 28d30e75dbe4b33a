//! Configuration for the program.

/// Name of the directory under the platform's local data directory.
#[cfg(windows)]
static DATA_DIR_NAME: &str = "PaperMCDownloader";
#[cfg(not(windows))]
static DATA_DIR_NAME: &str = "paperctl";

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}
impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}
impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, .. } => {
                write!(f, "cannot read configuration {}", path.to_string_lossy())
            }
            ConfigError::Parse { path, .. } => {
                write!(f, "cannot parse configuration {}", path.to_string_lossy())
            }
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

/// Configuration for the program.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the server list is kept.
    pub data_dir: std::path::PathBuf,
    /// Java executable used to run server jars.
    pub java: String,
    /// Extra JVM arguments placed before `-jar`.
    pub java_args: Vec<String>,
    /// Number of threads carrying out slow requests.
    pub workers: usize,
    /// Pending slow requests beyond which new ones are rejected.
    pub queue_capacity: usize,
    pub download_timeout_secs: u64,
    /// Bound on the run that generates a fresh server's default files.
    pub first_run_timeout_secs: u64,
    /// Bound on waiting for a server to exit after `stop`.
    pub stop_timeout_secs: u64,
    /// Time a server gets between SIGTERM and SIGKILL when killed.
    pub kill_grace_secs: u64,
    pub delete_policy: crate::manager::DeletePolicy,
    pub log_level: String,
    pub properties: crate::properties::PropertyDefaults,
    /// Additional version labels, or replacement URLs for built-in ones.
    pub versions: std::collections::BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            data_dir: Self::default_data_dir(),
            java: "java".into(),
            java_args: Vec::new(),
            workers: 2,
            queue_capacity: 16,
            download_timeout_secs: 600,
            first_run_timeout_secs: 600,
            stop_timeout_secs: 120,
            kill_grace_secs: 10,
            delete_policy: crate::manager::DeletePolicy::StopFirst,
            log_level: "info".into(),
            properties: crate::properties::PropertyDefaults::default(),
            versions: std::collections::BTreeMap::new(),
        };
    }
}

impl Config {
    /// Local application data directory of the current user.
    pub fn default_data_dir() -> std::path::PathBuf {
        let base: std::path::PathBuf = if cfg!(windows) {
            match std::env::var_os("LOCALAPPDATA") {
                Some(n) => n.into(),
                None => std::path::PathBuf::from("."),
            }
        } else if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|n| !n.is_empty()) {
            xdg.into()
        } else {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home).join(".local").join("share"),
                None => std::path::PathBuf::from("."),
            }
        };
        return base.join(DATA_DIR_NAME);
    }

    /// Where the configuration of this program will be stored at by default.
    pub fn default_fs_path() -> std::path::PathBuf {
        return Self::default_data_dir().join(CONFIG_FILE);
    }

    /// Get configuration from filesystem.
    ///
    /// An explicitly given file must exist. Without one, the default location
    /// is tried and defaults are used if nothing is there.
    pub fn get_from_fs(config_file_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (path, required): (std::path::PathBuf, bool) = match config_file_path {
            Some(n) => (n.to_path_buf(), true),
            None => (Self::default_fs_path(), false),
        };

        let content: String = match std::fs::read_to_string(&path) {
            Ok(n) => n,
            Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config: Config = Self::parse(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        return Ok(config);
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: std::path::PathBuf::new(),
            source,
        })?;
        config.validate()?;
        return Ok(config);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.java.trim().is_empty() {
            return Err(ConfigError::Invalid("java must not be empty".into()));
        }
        for (label, url) in &self.versions {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::Invalid(format!(
                    "version {label}: '{url}' is not an HTTP URL"
                )));
            }
        }
        return Ok(());
    }

    pub fn store_path(&self) -> std::path::PathBuf {
        return self.data_dir.join(crate::store::STORE_FILE);
    }

    pub fn catalog(&self) -> crate::catalog::VersionCatalog {
        return crate::catalog::VersionCatalog::with_overrides(self.versions.clone());
    }

    pub fn launcher(&self) -> crate::proc::Launcher {
        return crate::proc::Launcher::java(&self.java, &self.java_args);
    }

    pub fn download_timeout(&self) -> std::time::Duration {
        return std::time::Duration::from_secs(self.download_timeout_secs);
    }

    pub fn first_run_timeout(&self) -> std::time::Duration {
        return std::time::Duration::from_secs(self.first_run_timeout_secs);
    }

    pub fn manager_settings(&self) -> crate::manager::Settings {
        return crate::manager::Settings {
            stop_timeout: std::time::Duration::from_secs(self.stop_timeout_secs),
            kill_grace: std::time::Duration::from_secs(self.kill_grace_secs),
            delete_policy: self.delete_policy,
        };
    }
}
