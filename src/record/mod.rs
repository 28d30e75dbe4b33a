//! Server records: what a managed server is, independent of whether it runs.

/// Lower bound (inclusive) of automatically assigned ports.
pub const PORT_AUTO_MIN: u16 = 25000;

/// Upper bound (exclusive) of automatically assigned ports.
pub const PORT_AUTO_MAX: u16 = 35000;

/// Name, _not the absolute path_, of the server jar inside a record's
/// directory.
pub const SERVER_JAR: &str = "server.jar";

/// Identity and location of one managed server.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServerRecord {
    /// Display name given by the user. Not guaranteed unique.
    pub name: String,
    /// Absolute path of the directory the server lives in.
    pub directory: std::path::PathBuf,
    /// Version label, a key of the version catalog at creation time.
    pub version: String,
    /// Primary game port. The control (RCON) port is the next one.
    pub port: u16,
}

impl ServerRecord {
    /// New record. A random port from `[PORT_AUTO_MIN, PORT_AUTO_MAX)` is
    /// picked when `port` is not given.
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<std::path::PathBuf>,
        version: impl Into<String>,
        port: Option<u16>,
    ) -> Self {
        let port: u16 = match port {
            Some(n) => n,
            None => random_port(),
        };
        return Self {
            name: name.into(),
            directory: directory.into(),
            version: version.into(),
            port,
        };
    }

    /// Port for the remote administration protocol.
    pub fn control_port(&self) -> u16 {
        return self.port + 1;
    }

    /// Whether the primary port leaves room for the control port.
    pub fn has_valid_ports(&self) -> bool {
        return self.port > 0 && self.port < u16::MAX;
    }

    pub fn jar_path(&self) -> std::path::PathBuf {
        return self.directory.join(SERVER_JAR);
    }
}

impl std::fmt::Display for ServerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (Port: {}, Version: {}) at {}",
            self.name,
            self.port,
            self.version,
            self.directory.to_string_lossy()
        )
    }
}

fn random_port() -> u16 {
    use rand::Rng;
    return rand::thread_rng().gen_range(PORT_AUTO_MIN..PORT_AUTO_MAX);
}
