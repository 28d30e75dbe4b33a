//! The server's own configuration files: `server.properties` and `eula.txt`.

pub const PROPERTIES_FILE: &str = "server.properties";

pub const EULA_FILE: &str = "eula.txt";

static EULA_DECLINED: &str = "eula=false";
static EULA_ACCEPTED: &str = "eula=true";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamemode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl std::fmt::Display for Gamemode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: &str = match self {
            Gamemode::Survival => "survival",
            Gamemode::Creative => "creative",
            Gamemode::Adventure => "adventure",
            Gamemode::Spectator => "spectator",
        };
        write!(f, "{s}")
    }
}

/// Settings that are the same for every provisioned server unless configured
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct PropertyDefaults {
    pub motd: String,
    pub online_mode: bool,
    pub gamemode: Gamemode,
    pub max_players: u32,
}

impl Default for PropertyDefaults {
    fn default() -> Self {
        return Self {
            motd: "A Minecraft Server".into(),
            online_mode: true,
            gamemode: Gamemode::Survival,
            max_players: 20,
        };
    }
}

/// The subset of `server.properties` this program manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    pub server_port: u16,
    pub query_port: u16,
    pub rcon_port: u16,
    pub motd: String,
    pub online_mode: bool,
    pub gamemode: Gamemode,
    pub max_players: u32,
}

impl ServerProperties {
    /// Properties for a record: game and query share the record's port, the
    /// control port is the one after it.
    pub fn for_record(
        record: &crate::record::ServerRecord,
        defaults: &PropertyDefaults,
    ) -> Self {
        return Self {
            server_port: record.port,
            query_port: record.port,
            rcon_port: record.control_port(),
            motd: defaults.motd.clone(),
            online_mode: defaults.online_mode,
            gamemode: defaults.gamemode,
            max_players: defaults.max_players,
        };
    }

    /// Serialize in the line oriented `key=value` format the server reads.
    pub fn render(&self) -> String {
        let lines: [String; 8] = [
            "#Minecraft server properties".to_string(),
            format!("server-port={}", self.server_port),
            format!("query.port={}", self.query_port),
            format!("rcon.port={}", self.rcon_port),
            format!("motd={}", escape_value(&self.motd)),
            format!("online-mode={}", self.online_mode),
            format!("gamemode={}", self.gamemode),
            format!("max-players={}", self.max_players),
        ];
        let mut rendered: String = lines.join("\n");
        rendered.push('\n');
        return rendered;
    }

    /// Write into `dir`, replacing whatever properties file was there.
    pub fn write_to(&self, dir: &std::path::Path) -> Result<std::path::PathBuf, std::io::Error> {
        let path: std::path::PathBuf = dir.join(PROPERTIES_FILE);
        std::fs::write(&path, self.render())?;
        return Ok(path);
    }
}

/// Properties values cannot span lines.
fn escape_value(value: &str) -> String {
    return value.replace('\\', "\\\\").replace('\n', "\\n").replace('\r', "\\r");
}

/// Whether `dir` holds a EULA file that has already been accepted.
pub fn eula_accepted(dir: &std::path::Path) -> Result<bool, std::io::Error> {
    return match std::fs::read_to_string(dir.join(EULA_FILE)) {
        Ok(content) => Ok(content.lines().any(|line| line.trim() == EULA_ACCEPTED)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    };
}

/// Flip the acceptance flag in `dir`'s EULA file if the file exists.
///
/// Returns whether a file was found. Running it on an already accepted file
/// leaves the content as is.
pub fn accept_eula(dir: &std::path::Path) -> Result<bool, std::io::Error> {
    let path: std::path::PathBuf = dir.join(EULA_FILE);
    let content: String = match std::fs::read_to_string(&path) {
        Ok(n) => n,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    let accepted: String = content.replace(EULA_DECLINED, EULA_ACCEPTED);
    if accepted != content {
        std::fs::write(&path, accepted)?;
    }
    return Ok(true);
}
