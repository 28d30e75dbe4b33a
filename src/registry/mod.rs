//! In-memory collection of the known servers and their runtime state.

/// Registry assigned identity of an entry, stable while the program runs.
pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Being set up. Not persisted yet.
    Provisioning,
    Ready,
}

/// One server: its record, its process supervisor and the token that
/// cancels whatever operation currently runs on it.
pub struct Entry {
    id: RecordId,
    record: crate::record::ServerRecord,
    ready: std::sync::atomic::AtomicBool,
    supervisor: std::sync::Mutex<crate::supervisor::Supervisor>,
    cancel: crate::util::CancelToken,
}

impl Entry {
    pub fn id(&self) -> RecordId {
        return self.id;
    }

    pub fn record(&self) -> &crate::record::ServerRecord {
        return &self.record;
    }

    pub fn phase(&self) -> Phase {
        return match self.ready.load(std::sync::atomic::Ordering::SeqCst) {
            true => Phase::Ready,
            false => Phase::Provisioning,
        };
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Exclusive access to the supervisor for one lifecycle operation. Fails
    /// with [`crate::error::Error::Busy`] instead of waiting when another
    /// operation holds it.
    pub fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, crate::supervisor::Supervisor>, crate::error::Error> {
        return match self.supervisor.try_lock() {
            Ok(guard) => Ok(guard),
            Err(std::sync::TryLockError::WouldBlock) => {
                Err(crate::error::Error::Busy(self.record.name.clone()))
            }
            Err(std::sync::TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        };
    }

    pub fn cancel_token(&self) -> &crate::util::CancelToken {
        return &self.cancel;
    }

    /// Point in time view of the entry.
    pub fn summary(&self) -> EntrySummary {
        let (state, pid): (State, Option<u32>) = match self.phase() {
            Phase::Provisioning => (State::Provisioning, None),
            Phase::Ready => match self.supervisor.try_lock() {
                Ok(sup) => (sup.status().into(), sup.pid()),
                Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                    let sup = poisoned.into_inner();
                    (sup.status().into(), sup.pid())
                }
                Err(std::sync::TryLockError::WouldBlock) => (State::Busy, None),
            },
        };
        return EntrySummary {
            id: self.id,
            name: self.record.name.clone(),
            directory: self.record.directory.clone(),
            version: self.record.version.clone(),
            port: self.record.port,
            state,
            pid,
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum State {
    Provisioning,
    Stopped,
    Running,
    /// A lifecycle operation is in progress.
    Busy,
}
impl From<crate::supervisor::Status> for State {
    fn from(value: crate::supervisor::Status) -> Self {
        return match value {
            crate::supervisor::Status::Stopped => State::Stopped,
            crate::supervisor::Status::Running => State::Running,
        };
    }
}
impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg: &str = match self {
            State::Provisioning => "Provisioning",
            State::Stopped => "Stopped",
            State::Running => "Running",
            State::Busy => "Busy",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EntrySummary {
    pub id: RecordId,
    pub name: String,
    pub directory: std::path::PathBuf,
    pub version: String,
    pub port: u16,
    pub state: State,
    pub pid: Option<u32>,
}
impl std::fmt::Display for EntrySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} (Port: {}, Version: {}) {}",
            self.id, self.name, self.port, self.version, self.state
        )?;
        if let Some(pid) = self.pid {
            write!(f, " as PID {pid}")?;
        }
        return Ok(());
    }
}

/// The known servers. Cheap to share behind an `Arc`; all methods take
/// `&self`.
#[derive(Default)]
pub struct Registry {
    entries: std::sync::Mutex<Vec<std::sync::Arc<Entry>>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        return Self::default();
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<std::sync::Arc<Entry>>> {
        return self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }

    /// Append a record, wiring it to its own supervisor.
    pub fn insert(
        &self,
        record: crate::record::ServerRecord,
        phase: Phase,
        launcher: crate::proc::Launcher,
    ) -> std::sync::Arc<Entry> {
        let id: RecordId = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let supervisor: crate::supervisor::Supervisor =
            crate::supervisor::Supervisor::new(&record, launcher);
        let entry: std::sync::Arc<Entry> = std::sync::Arc::new(Entry {
            id,
            record,
            ready: std::sync::atomic::AtomicBool::new(phase == Phase::Ready),
            supervisor: std::sync::Mutex::new(supervisor),
            cancel: crate::util::CancelToken::new(),
        });

        let mut entries = self.entries();
        if entries.iter().any(|e| e.record.name == entry.record.name) {
            log::warn!(
                "Another server is already named {} -- Use #{} to address this one",
                entry.record.name,
                entry.id
            );
        }
        if let Some(other) = entries
            .iter()
            .find(|e| e.record.directory == entry.record.directory)
        {
            log::warn!(
                "{} shares directory {} with {}",
                entry.record.name,
                entry.record.directory.to_string_lossy(),
                other.record.name
            );
        }
        entries.push(std::sync::Arc::clone(&entry));
        return entry;
    }

    pub fn remove(&self, id: RecordId) -> Option<std::sync::Arc<Entry>> {
        let mut entries = self.entries();
        let index: usize = entries.iter().position(|e| e.id == id)?;
        return Some(entries.remove(index));
    }

    pub fn get(&self, id: RecordId) -> Option<std::sync::Arc<Entry>> {
        return self.entries().iter().find(|e| e.id == id).cloned();
    }

    /// Look up an entry by `#<id>` or by name.
    pub fn find(&self, selector: &str) -> Result<std::sync::Arc<Entry>, crate::error::Error> {
        if let Some(id) = selector
            .strip_prefix('#')
            .and_then(|n| n.parse::<RecordId>().ok())
        {
            return self
                .get(id)
                .ok_or_else(|| crate::error::Error::NotFound(selector.to_string()));
        }

        let entries = self.entries();
        let mut matching = entries.iter().filter(|e| e.record.name == selector);
        let first: &std::sync::Arc<Entry> = match matching.next() {
            Some(n) => n,
            None => return Err(crate::error::Error::NotFound(selector.to_string())),
        };
        if matching.next().is_some() {
            return Err(crate::error::Error::Ambiguous(selector.to_string()));
        }
        return Ok(std::sync::Arc::clone(first));
    }

    /// Every entry, in insertion order.
    pub fn list(&self) -> Vec<std::sync::Arc<Entry>> {
        return self.entries().clone();
    }

    /// Records of the entries that belong on disk.
    pub fn ready_records(&self) -> Vec<crate::record::ServerRecord> {
        return self
            .entries()
            .iter()
            .filter(|e| e.phase() == Phase::Ready)
            .map(|e| e.record.clone())
            .collect();
    }
}
