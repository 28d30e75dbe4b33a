//! First time setup of a server directory: binary, generated defaults,
//! EULA acceptance and our properties.

pub struct Provisioner {
    catalog: std::sync::Arc<crate::catalog::VersionCatalog>,
    fetcher: Box<dyn crate::http::Fetch + Send + Sync>,
    launcher: crate::proc::Launcher,
    defaults: crate::properties::PropertyDefaults,
    first_run_timeout: std::time::Duration,
}

impl Provisioner {
    pub fn new(
        catalog: std::sync::Arc<crate::catalog::VersionCatalog>,
        fetcher: Box<dyn crate::http::Fetch + Send + Sync>,
        launcher: crate::proc::Launcher,
        defaults: crate::properties::PropertyDefaults,
        first_run_timeout: std::time::Duration,
    ) -> Self {
        return Self {
            catalog,
            fetcher,
            launcher,
            defaults,
            first_run_timeout,
        };
    }

    pub fn catalog(&self) -> &crate::catalog::VersionCatalog {
        return &self.catalog;
    }

    pub fn launcher(&self) -> &crate::proc::Launcher {
        return &self.launcher;
    }

    /// Download URL of the record's version.
    pub fn resolve<'a>(
        &'a self,
        record: &crate::record::ServerRecord,
    ) -> Result<&'a str, crate::error::Error> {
        return self
            .catalog
            .resolve(&record.version)
            .ok_or_else(|| crate::error::Error::UnknownVersion(record.version.clone()));
    }

    /// Set up `record.directory` so the server can be started.
    ///
    /// Blocks for the duration of the download and of one full run of the
    /// server. Any failure aborts the remaining steps; files written by
    /// earlier steps stay. Persisting the record is up to the caller.
    pub fn provision(
        &self,
        record: &crate::record::ServerRecord,
        cancel: &crate::util::CancelToken,
    ) -> Result<(), crate::error::Error> {
        let url: &str = self.resolve(record)?;
        let dir: &std::path::Path = &record.directory;

        std::fs::create_dir_all(dir).map_err(|source| crate::error::Error::ConfigWrite {
            path: dir.to_path_buf(),
            source,
        })?;

        log::info!("Downloading PaperMC {} for {}...", record.version, record.name);
        let jar: std::path::PathBuf = record.jar_path();
        let bytes: u64 = self.fetcher.fetch(url, &jar, cancel)?;
        log::info!("Downloaded {} ({} bytes)", jar.to_string_lossy(), bytes);

        let accepted: bool = crate::properties::eula_accepted(dir).map_err(|source| {
            crate::error::Error::ConfigWrite {
                path: dir.join(crate::properties::EULA_FILE),
                source,
            }
        })?;
        if accepted {
            // An accepted server would keep running instead of exiting.
            log::info!(
                "{} already has an accepted {} -- Skipping the first run",
                dir.to_string_lossy(),
                crate::properties::EULA_FILE
            );
        } else {
            log::info!(
                "Running {} once to generate its default files...",
                record.name
            );
            let status: std::process::ExitStatus = crate::proc::run_to_end(
                &self.launcher,
                dir,
                self.first_run_timeout,
                cancel,
                &record.name,
            )?;
            if !status.success() {
                // Refusing to run with an unaccepted EULA is the expected outcome.
                log::debug!("First run of {} ended: {status}", record.name);
            }
        }

        match crate::properties::accept_eula(dir) {
            Ok(true) => log::debug!("Accepted EULA of {}", record.name),
            Ok(false) => log::warn!(
                "No {} generated for {} -- Not accepting anything",
                crate::properties::EULA_FILE,
                record.name
            ),
            Err(source) => {
                return Err(crate::error::Error::ConfigWrite {
                    path: dir.join(crate::properties::EULA_FILE),
                    source,
                })
            }
        }

        let properties: crate::properties::ServerProperties =
            crate::properties::ServerProperties::for_record(record, &self.defaults);
        let path: std::path::PathBuf =
            properties
                .write_to(dir)
                .map_err(|source| crate::error::Error::ConfigWrite {
                    path: dir.join(crate::properties::PROPERTIES_FILE),
                    source,
                })?;
        log::debug!(
            "Wrote {} (ports {}, {}, {})",
            path.to_string_lossy(),
            properties.server_port,
            properties.query_port,
            properties.rcon_port
        );

        log::info!("{} is set up", record.name);
        return Ok(());
    }
}
