//! Flat file persistence of the known server records.
//!
//! One record per line: `name,directory,version,port`. No header. Within a
//! field `%`, `,`, CR and LF are percent-escaped, so a line without any of
//! those characters reads exactly like an unescaped one.

pub const STORE_FILE: &str = "servers.txt";

static DELIMITER: char = ',';

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    /// Contains the 1-based line number and what is wrong with it.
    Parse { line: usize, reason: String },
}
impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Parse { .. } => None,
        }
    }
}
impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io { path, .. } => {
                write!(f, "cannot access record store {}", path.to_string_lossy())
            }
            StoreError::Parse { line, reason } => {
                write!(f, "malformed record on line {line}: {reason}")
            }
        }
    }
}

/// The backing file of the records. Saves through one `Store` never
/// interleave.
pub struct Store {
    path: std::path::PathBuf,
    write_lock: std::sync::Mutex<()>,
}

impl Store {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        return Self {
            path: path.into(),
            write_lock: std::sync::Mutex::new(()),
        };
    }

    /// Store file inside a data directory.
    pub fn in_dir(data_dir: &std::path::Path) -> Self {
        return Self::new(data_dir.join(STORE_FILE));
    }

    pub fn path(&self) -> &std::path::Path {
        return &self.path;
    }

    /// Replace the file's content with `records`.
    ///
    /// Written to a sibling temporary file first and renamed over the target,
    /// so readers never see a half written file.
    pub fn save_all(&self, records: &[crate::record::ServerRecord]) -> Result<(), StoreError> {
        let _guard: std::sync::MutexGuard<()> = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut content: String = String::new();
        for record in records {
            content.push_str(&encode_line(record));
            content.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
            }
        }

        let mut tmp_name: std::ffi::OsString = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path: std::path::PathBuf = std::path::PathBuf::from(tmp_name);
        {
            use std::io::Write;
            let mut file: std::fs::File = std::fs::File::create(&tmp_path)
                .map_err(|source| self.io_error(source))?;
            file.write_all(content.as_bytes())
                .map_err(|source| self.io_error(source))?;
            file.sync_all().map_err(|source| self.io_error(source))?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|source| self.io_error(source))?;

        log::debug!(
            "Saved {} record(s) to {}",
            records.len(),
            self.path.to_string_lossy()
        );
        return Ok(());
    }

    /// Read every record. A missing file means no records.
    pub fn load_all(&self) -> Result<Vec<crate::record::ServerRecord>, StoreError> {
        let content: String = match std::fs::read_to_string(&self.path) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "No record store at {} yet -- Starting empty",
                    self.path.to_string_lossy()
                );
                return Ok(Vec::new());
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let mut records: Vec<crate::record::ServerRecord> = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line: &str = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let record: crate::record::ServerRecord =
                decode_line(line).map_err(|reason| StoreError::Parse { line: i + 1, reason })?;
            records.push(record);
        }
        return Ok(records);
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        return StoreError::Io {
            path: self.path.clone(),
            source,
        };
    }
}

pub fn encode_line(record: &crate::record::ServerRecord) -> String {
    return format!(
        "{},{},{},{}",
        escape_field(&record.name),
        escape_field(&record.directory.to_string_lossy()),
        escape_field(&record.version),
        record.port
    );
}

/// Parse one line of the server list.
///
/// ```rust
/// let record = paperctl::store::decode_line("S1,/srv/s%2C1,1.21.1,25565").unwrap();
/// assert_eq!(record.directory, std::path::PathBuf::from("/srv/s,1"));
/// assert_eq!(record.control_port(), 25566);
/// assert!(paperctl::store::decode_line("S1,/srv/s1,1.21.1").is_err());
/// ```
pub fn decode_line(line: &str) -> Result<crate::record::ServerRecord, String> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, got {}", fields.len()));
    }
    let port: u16 = match fields[3].trim().parse::<u16>() {
        Ok(n) => n,
        Err(_) => return Err(format!("invalid port '{}'", fields[3])),
    };
    let record: crate::record::ServerRecord = crate::record::ServerRecord {
        name: unescape_field(fields[0]),
        directory: std::path::PathBuf::from(unescape_field(fields[1])),
        version: unescape_field(fields[2]),
        port,
    };
    if !record.has_valid_ports() {
        return Err(format!("port {port} leaves no room for the control port"));
    }
    return Ok(record);
}

fn escape_field(field: &str) -> String {
    let mut escaped: String = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ',' => escaped.push_str("%2C"),
            '\n' => escaped.push_str("%0A"),
            '\r' => escaped.push_str("%0D"),
            _ => escaped.push(c),
        }
    }
    return escaped;
}

/// Inverse of [`escape_field`]. A `%` that does not start a known escape is
/// kept as is.
fn unescape_field(field: &str) -> String {
    let mut unescaped: String = String::with_capacity(field.len());
    let mut rest: &str = field;
    while let Some(i) = rest.find('%') {
        unescaped.push_str(&rest[..i]);
        let tail: &str = &rest[i..];
        let decoded: Option<char> = match tail.get(..3) {
            Some("%25") => Some('%'),
            Some("%2C") | Some("%2c") => Some(','),
            Some("%0A") | Some("%0a") => Some('\n'),
            Some("%0D") | Some("%0d") => Some('\r'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                unescaped.push(c);
                rest = &tail[3..];
            }
            None => {
                unescaped.push('%');
                rest = &tail[1..];
            }
        }
    }
    unescaped.push_str(rest);
    return unescaped;
}
