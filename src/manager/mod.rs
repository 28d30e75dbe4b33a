//! Core functionality of the program: lifecycle operations on the known
//! servers.

/// What deleting a running server does to its process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Stop it gracefully first; keep the record if that fails.
    #[default]
    StopFirst,
    /// Leave it running unsupervised.
    Orphan,
}

impl std::str::FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "stop-first" => Ok(DeletePolicy::StopFirst),
            "orphan" => Ok(DeletePolicy::Orphan),
            other => Err(format!(
                "unknown delete policy '{other}', expected 'stop-first' or 'orphan'"
            )),
        };
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub stop_timeout: std::time::Duration,
    pub kill_grace: std::time::Duration,
    pub delete_policy: DeletePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        return Self {
            stop_timeout: std::time::Duration::from_secs(120),
            kill_grace: std::time::Duration::from_secs(10),
            delete_policy: DeletePolicy::StopFirst,
        };
    }
}

/// What the user asks for when creating a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServer {
    pub name: String,
    pub directory: std::path::PathBuf,
    /// Catalog default when absent.
    pub version: Option<String>,
    /// Random when absent.
    pub port: Option<u16>,
}

pub struct Manager {
    registry: crate::registry::Registry,
    store: crate::store::Store,
    provisioner: crate::provision::Provisioner,
    settings: Settings,
    persist_lock: std::sync::Mutex<()>,
    /// Set by [`Manager::shutdown`]. No operation starts afterwards.
    closed: std::sync::atomic::AtomicBool,
}

impl Manager {
    pub fn new(
        provisioner: crate::provision::Provisioner,
        store: crate::store::Store,
        settings: Settings,
    ) -> Self {
        return Self {
            registry: crate::registry::Registry::new(),
            store,
            provisioner,
            settings,
            persist_lock: std::sync::Mutex::new(()),
            closed: std::sync::atomic::AtomicBool::new(false),
        };
    }

    /// Populate the registry from the store. Loaded servers are stopped.
    pub fn load(&self) -> Result<usize, crate::error::Error> {
        let records: Vec<crate::record::ServerRecord> = self.store.load_all()?;
        let count: usize = records.len();
        for record in records {
            if self.provisioner.catalog().resolve(&record.version).is_none() {
                log::warn!(
                    "{} uses version '{}' which is no longer in the catalog",
                    record.name,
                    record.version
                );
            }
            self.registry.insert(
                record,
                crate::registry::Phase::Ready,
                self.provisioner.launcher().clone(),
            );
        }
        log::debug!(
            "Loaded {} server(s) from {}",
            count,
            self.store.path().to_string_lossy()
        );
        return Ok(count);
    }

    pub fn registry(&self) -> &crate::registry::Registry {
        return &self.registry;
    }

    pub fn versions(&self) -> Vec<String> {
        return self
            .provisioner
            .catalog()
            .labels()
            .map(String::from)
            .collect();
    }

    pub fn list(&self) -> Vec<crate::registry::EntrySummary> {
        return self.registry.list().iter().map(|e| e.summary()).collect();
    }

    /// Register and provision a new server, then persist it.
    ///
    /// The entry is visible while provisioning but only written to disk once
    /// provisioning succeeded. On failure it is dropped again.
    pub fn create(
        &self,
        request: NewServer,
    ) -> Result<std::sync::Arc<crate::registry::Entry>, crate::error::Error> {
        self.ensure_open()?;
        if request.name.trim().is_empty() {
            return Err(crate::error::Error::InvalidRecord("name is empty".into()));
        }
        let version: String = match request.version {
            Some(n) => n,
            None => match self.provisioner.catalog().default_label() {
                Some(n) => n.to_string(),
                None => return Err(crate::error::Error::UnknownVersion(String::new())),
            },
        };
        let directory: std::path::PathBuf = absolute(&request.directory)?;
        let record: crate::record::ServerRecord =
            crate::record::ServerRecord::new(request.name, directory, version, request.port);
        if !record.has_valid_ports() {
            return Err(crate::error::Error::InvalidRecord(format!(
                "port {} leaves no room for the control port",
                record.port
            )));
        }
        self.provisioner.resolve(&record)?;

        let entry: std::sync::Arc<crate::registry::Entry> = self.registry.insert(
            record,
            crate::registry::Phase::Provisioning,
            self.provisioner.launcher().clone(),
        );
        // Pairs with `shutdown`, which closes before cancelling every entry.
        if let Err(err) = self.ensure_open() {
            self.registry.remove(entry.id());
            return Err(err);
        }
        log::info!("Setting up {}...", entry.record());

        let provisioned: Result<(), crate::error::Error> = entry.lock().and_then(|_guard| {
            self.provisioner
                .provision(entry.record(), entry.cancel_token())
        });
        if let Err(err) = provisioned {
            self.registry.remove(entry.id());
            return Err(err);
        }

        entry.mark_ready();
        self.persist()?;
        return Ok(entry);
    }

    pub fn start(
        &self,
        selector: &str,
    ) -> Result<(crate::record::ServerRecord, crate::supervisor::Transition), crate::error::Error>
    {
        let entry: std::sync::Arc<crate::registry::Entry> = self.ready_entry(selector)?;
        let mut sup = entry.lock()?;
        let transition: crate::supervisor::Transition = sup.start()?;
        return Ok((entry.record().clone(), transition));
    }

    pub fn stop(
        &self,
        selector: &str,
    ) -> Result<(crate::record::ServerRecord, crate::supervisor::Transition), crate::error::Error>
    {
        let entry: std::sync::Arc<crate::registry::Entry> = self.ready_entry(selector)?;
        let mut sup = entry.lock()?;
        entry.cancel_token().reset();
        let transition: crate::supervisor::Transition =
            sup.stop(self.settings.stop_timeout, entry.cancel_token())?;
        return Ok((entry.record().clone(), transition));
    }

    pub fn restart(&self, selector: &str) -> Result<crate::record::ServerRecord, crate::error::Error> {
        let entry: std::sync::Arc<crate::registry::Entry> = self.ready_entry(selector)?;
        let mut sup = entry.lock()?;
        entry.cancel_token().reset();
        sup.restart(self.settings.stop_timeout, entry.cancel_token())?;
        return Ok(entry.record().clone());
    }

    /// Force the server process down, e.g. after a failed stop.
    pub fn kill(
        &self,
        selector: &str,
    ) -> Result<(crate::record::ServerRecord, crate::supervisor::Transition), crate::error::Error>
    {
        let entry: std::sync::Arc<crate::registry::Entry> = self.ready_entry(selector)?;
        let mut sup = entry.lock()?;
        let transition: crate::supervisor::Transition = sup.kill(self.settings.kill_grace)?;
        return Ok((entry.record().clone(), transition));
    }

    /// Forget a server and persist. The server's directory is left alone.
    /// Fails with `Busy` while the server is still being set up.
    pub fn delete(
        &self,
        selector: &str,
        policy: Option<DeletePolicy>,
    ) -> Result<crate::record::ServerRecord, crate::error::Error> {
        let entry: std::sync::Arc<crate::registry::Entry> = self.ready_entry(selector)?;
        let mut sup = entry.lock()?;
        match policy.unwrap_or(self.settings.delete_policy) {
            DeletePolicy::StopFirst => {
                entry.cancel_token().reset();
                sup.stop(self.settings.stop_timeout, entry.cancel_token())?;
            }
            DeletePolicy::Orphan => {
                sup.detach();
            }
        }
        self.registry.remove(entry.id());
        drop(sup);
        self.persist()?;
        return Ok(entry.record().clone());
    }

    /// Ask the operation in flight on a server to give up. Returns the
    /// affected record.
    pub fn cancel(&self, selector: &str) -> Result<crate::record::ServerRecord, crate::error::Error> {
        let entry: std::sync::Arc<crate::registry::Entry> = self.registry.find(selector)?;
        entry.cancel_token().cancel();
        log::info!("Cancellation requested for {}", entry.record().name);
        return Ok(entry.record().clone());
    }

    /// Stop every running server, killing the ones that do not stop. Returns
    /// how many were running.
    ///
    /// Operations still queued are rejected with `Shutdown` once they run.
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut stopped: usize = 0;
        for entry in self.registry.list() {
            entry.cancel_token().cancel();
        }
        for entry in self.registry.list() {
            let name: &str = &entry.record().name;
            let mut sup = match entry.lock() {
                Ok(n) => n,
                Err(err) => {
                    log::warn!("Cannot stop {name}: {err}");
                    continue;
                }
            };
            if sup.status() != crate::supervisor::Status::Running {
                continue;
            }
            stopped += 1;
            entry.cancel_token().reset();
            if let Err(err) = sup.stop(self.settings.stop_timeout, entry.cancel_token()) {
                log::warn!("Cannot stop {name} gracefully: {err} -- Killing it");
                if let Err(err) = sup.kill(self.settings.kill_grace) {
                    log::error!("Cannot kill {name}: {err}");
                }
            }
        }
        return stopped;
    }

    /// Write every ready record to the store.
    pub fn persist(&self) -> Result<(), crate::error::Error> {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let records: Vec<crate::record::ServerRecord> = self.registry.ready_records();
        self.store.save_all(&records)?;
        return Ok(());
    }

    fn ensure_open(&self) -> Result<(), crate::error::Error> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::Error::Shutdown);
        }
        return Ok(());
    }

    fn ready_entry(
        &self,
        selector: &str,
    ) -> Result<std::sync::Arc<crate::registry::Entry>, crate::error::Error> {
        self.ensure_open()?;
        let entry: std::sync::Arc<crate::registry::Entry> = self.registry.find(selector)?;
        if entry.phase() != crate::registry::Phase::Ready {
            return Err(crate::error::Error::Busy(entry.record().name.clone()));
        }
        return Ok(entry);
    }
}

fn absolute(path: &std::path::Path) -> Result<std::path::PathBuf, crate::error::Error> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd: std::path::PathBuf =
        std::env::current_dir().map_err(|source| crate::error::Error::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })?;
    return Ok(cwd.join(path));
}


#[cfg(all(test, unix))]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::provision::testing::FakeFetch;
    use crate::supervisor::Transition;

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::status(404), DeletePolicy::StopFirst);

        let request = NewServer {
            name: "S1".into(),
            directory: servers.path().join("s1"),
            version: Some("1.21.1".into()),
            port: None,
        };
        let result = mgr.create(request);
        assert!(matches!(result, Err(crate::error::Error::Download(_))), "{:?}", result.err());
        assert!(mgr.list().is_empty());
        assert_eq!(crate::store::Store::in_dir(data.path()).load_all().unwrap(), vec![]);
    }

    #[test]
    fn test_unknown_version_is_rejected_before_registering() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        let mut request = new_server("S1", &servers.path().join("s1"));
        request.version = Some("2.0".into());
        assert!(matches!(mgr.create(request), Err(crate::error::Error::UnknownVersion(_))));
        assert!(mgr.list().is_empty());
        assert!(!servers.path().join("s1").exists());
    }

    #[test]
    fn test_create_persists_and_reloads() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);

        let mut request = new_server("S1", &servers.path().join("s1"));
        request.version = None;
        let entry = mgr.create(request).unwrap();
        let record = entry.record().clone();
        assert_eq!(record.version, "1.21.1");
        assert!((25000..35000).contains(&record.port));

        let reloaded = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        assert_eq!(reloaded.load().unwrap(), 1);
        let listed = reloaded.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "S1");
        assert_eq!(listed[0].port, record.port);
        assert_eq!(listed[0].state, crate::registry::State::Stopped);
    }

    #[test]
    fn test_start_stop_restart_cycle() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();

        assert_eq!(mgr.start("S1").unwrap().1, Transition::Changed);
        assert_eq!(mgr.start("S1").unwrap().1, Transition::Unchanged);
        assert_eq!(mgr.list()[0].state, crate::registry::State::Running);

        mgr.restart("S1").unwrap();
        assert_eq!(mgr.list()[0].state, crate::registry::State::Running);

        assert_eq!(mgr.stop("S1").unwrap().1, Transition::Changed);
        assert_eq!(mgr.stop("S1").unwrap().1, Transition::Unchanged);
        assert_eq!(mgr.list()[0].state, crate::registry::State::Stopped);
    }

    #[test]
    fn test_operation_on_busy_record_fails_fast() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        let entry = mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();

        let guard = entry.lock().unwrap();
        assert!(matches!(mgr.start("S1"), Err(crate::error::Error::Busy(_))));
        assert!(matches!(mgr.delete("S1", None), Err(crate::error::Error::Busy(_))));
        drop(guard);
        assert_eq!(mgr.list().len(), 1);
    }

    #[test]
    fn test_delete_while_provisioning_is_busy() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.registry().insert(
            crate::record::ServerRecord::new("S1", servers.path(), "1.21.1", Some(30000)),
            crate::registry::Phase::Provisioning,
            crate::provision::testing::fake_server(),
        );

        assert!(matches!(mgr.delete("S1", None), Err(crate::error::Error::Busy(_))));
        assert!(matches!(
            mgr.delete("S1", Some(DeletePolicy::Orphan)),
            Err(crate::error::Error::Busy(_))
        ));
        assert_eq!(mgr.list().len(), 1);
        assert!(!crate::store::Store::in_dir(data.path()).path().exists());
    }

    #[test]
    fn test_recreate_in_directory_with_accepted_eula() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        // Once accepted, never exits on its own, not even on end of input.
        let script: &str = r#"
if ! grep -q eula=true eula.txt 2>/dev/null; then
    printf 'eula=false\n' > eula.txt
    exit 1
fi
exec sleep 30
"#;
        let launcher = crate::proc::Launcher::new("sh", vec!["-c".into(), script.into()]);
        let mgr = manager_with_launcher(data.path(), launcher, std::time::Duration::from_secs(2));
        let dir = servers.path().join("s1");

        mgr.create(new_server("S1", &dir)).unwrap();
        mgr.delete("S1", None).unwrap();
        let started = std::time::Instant::now();
        let again = mgr.create(new_server("S1", &dir));
        assert!(again.is_ok(), "{:?}", again.err());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(mgr.list().len(), 1);
        assert_eq!(crate::store::Store::in_dir(data.path()).load_all().unwrap().len(), 1);
        assert!(dir.join(crate::properties::PROPERTIES_FILE).is_file());
    }

    #[test]
    fn test_operations_after_shutdown_are_rejected() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();

        assert_eq!(mgr.shutdown(), 0);
        assert!(matches!(mgr.start("S1"), Err(crate::error::Error::Shutdown)));
        assert!(matches!(
            mgr.create(new_server("S2", &servers.path().join("s2"))),
            Err(crate::error::Error::Shutdown)
        ));
        assert_eq!(mgr.list().len(), 1);
        assert!(!servers.path().join("s2").exists());
        assert_eq!(mgr.list()[0].state, crate::registry::State::Stopped);
    }

    #[test]
    fn test_delete_stops_running_server_first() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();
        mgr.create(new_server("S2", &servers.path().join("s2"))).unwrap();
        mgr.start("S1").unwrap();

        let deleted = mgr.delete("S1", None).unwrap();
        assert_eq!(deleted.name, "S1");
        let names: Vec<String> = mgr.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["S2".to_string()]);
        let stored = crate::store::Store::in_dir(data.path()).load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "S2");
        assert!(servers.path().join("s1").join("server.jar").exists());
    }

    #[test]
    fn test_delete_with_orphan_policy_leaves_process_running() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();
        mgr.start("S1").unwrap();
        let pid = mgr.list()[0].pid.unwrap();

        mgr.delete("S1", Some(DeletePolicy::Orphan)).unwrap();
        assert!(mgr.list().is_empty());

        let pid = nix::unistd::Pid::from_raw(pid as i32);
        // Not reaped by us: signal 0 only checks for existence.
        assert!(nix::sys::signal::kill(pid, None::<nix::sys::signal::Signal>).is_ok());
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
    }

    #[test]
    fn test_shutdown_stops_running_servers() {
        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        mgr.create(new_server("S1", &servers.path().join("s1"))).unwrap();
        mgr.create(new_server("S2", &servers.path().join("s2"))).unwrap();
        mgr.start("S2").unwrap();

        assert_eq!(mgr.shutdown(), 1);
        assert!(mgr
            .list()
            .iter()
            .all(|s| s.state == crate::registry::State::Stopped));
    }

    #[test]
    fn test_invalid_requests() {
        let data = tempfile::tempdir().unwrap();
        let mgr = manager(data.path(), FakeFetch::ok(), DeletePolicy::StopFirst);
        let mut request = new_server(" ", data.path());
        assert!(matches!(mgr.create(request.clone()), Err(crate::error::Error::InvalidRecord(_))));
        request.name = "S1".into();
        request.port = Some(u16::MAX);
        assert!(matches!(mgr.create(request), Err(crate::error::Error::InvalidRecord(_))));
        assert!(matches!(mgr.start("S1"), Err(crate::error::Error::NotFound(_))));
    }

    #[test]
    fn test_delete_policy_parses() {
        assert_eq!("orphan".parse::<DeletePolicy>(), Ok(DeletePolicy::Orphan));
        assert_eq!("stop-first".parse::<DeletePolicy>(), Ok(DeletePolicy::StopFirst));
        assert!("later".parse::<DeletePolicy>().is_err());
    }
}
