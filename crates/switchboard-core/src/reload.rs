//! Route table reloading and the config file watcher.
//!
//! Reloads re-read the whole config file and swap the route table only when
//! validation passes; a rejected file leaves the live table untouched.
//! Server and stream settings are not reloadable — a change there is logged
//! and ignored until restart.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::{Config, ConfigError},
    routes::RouteTable,
};

/// How often the watcher polls the config file's modification time.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Reloads routes from the config file into a shared [`RouteTable`].
#[derive(Debug)]
pub struct ConfigReloader {
    path: PathBuf,
    routes: Arc<RouteTable>,
    baseline: Config,
}

impl ConfigReloader {
    /// Creates a reloader for the given file and table.
    ///
    /// `baseline` is the configuration the process started with; it is used
    /// to detect edits to the non-reloadable sections.
    pub fn new(path: impl Into<PathBuf>, routes: Arc<RouteTable>, baseline: Config) -> Self {
        Self {
            path: path.into(),
            routes,
            baseline,
        }
    }

    /// Re-reads the config file and swaps the route table.
    ///
    /// Returns the new route count. On any load or validation error the
    /// live table is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from loading or validating the file.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let config = Config::load(&self.path)?;

        if config.server != self.baseline.server || config.nats != self.baseline.nats {
            warn!(
                path = %self.path.display(),
                "server/nats configuration changed on disk; only routes are hot-reloadable, restart to apply the rest"
            );
        }

        self.routes.replace(&config.routes);
        let route_count = config.routes.len();
        info!(route_count, "configuration reloaded successfully");
        Ok(route_count)
    }

    /// Polls the config file's modification time and reloads on change.
    ///
    /// Runs until the cancellation token fires. A failed reload keeps the
    /// prior table and logs the error; the watcher keeps polling.
    pub async fn watch(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(WATCH_INTERVAL);
        let mut last_modified = modified_at(&self.path);

        info!(path = %self.path.display(), "watching config file for changes");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("config watcher stopping");
                    return;
                }
                _ = interval.tick() => {}
            }

            let Some(modified) = modified_at(&self.path) else {
                // Transient: the file may be mid-replace by the operator.
                continue;
            };

            if last_modified != Some(modified) {
                last_modified = Some(modified);
                match self.reload() {
                    Ok(route_count) => {
                        info!(route_count, "config file changed, routes reloaded");
                    }
                    Err(err) => {
                        error!(error = %err, "config file changed but reload failed, keeping previous routes");
                    }
                }
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, Write};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::Route;

    const BASE_YAML: &str = r"
server:
  port: 8080
nats:
  url: nats://localhost:4222
  stream_name: CALL_EVENTS
  subject_pattern: call.signal.*
  ack_wait_seconds: 10
  max_deliveries: 3
routes:
  - domain: t.example
    endpoints:
      - http://a.example/hook
";

    fn write_file(file: &mut NamedTempFile, contents: &str) {
        let handle = file.as_file_mut();
        handle.set_len(0).expect("truncate temp config");
        handle.rewind().expect("rewind temp config");
        handle.write_all(contents.as_bytes()).expect("write temp config");
        handle.flush().expect("flush temp config");
    }

    fn reloader(file: &NamedTempFile) -> (ConfigReloader, Arc<RouteTable>) {
        let config = Config::load(file.path()).expect("base config should load");
        let routes = Arc::new(RouteTable::new(&config.routes));
        (
            ConfigReloader::new(file.path(), Arc::clone(&routes), config),
            routes,
        )
    }

    #[test]
    fn successful_reload_swaps_routes() {
        let mut file = NamedTempFile::new().expect("temp file");
        write_file(&mut file, BASE_YAML);
        let (reloader, routes) = reloader(&file);

        let updated = BASE_YAML.replace("http://a.example/hook", "http://b.example/hook");
        write_file(&mut file, &updated);

        let count = reloader.reload().expect("reload should succeed");
        assert_eq!(count, 1);
        assert_eq!(
            routes.endpoints_for("t.example"),
            Some(vec!["http://b.example/hook".to_string()])
        );
    }

    #[test]
    fn failed_reload_keeps_previous_routes() {
        let mut file = NamedTempFile::new().expect("temp file");
        write_file(&mut file, BASE_YAML);
        let (reloader, routes) = reloader(&file);
        let before = routes.snapshot();

        // ack_wait at the endpoint timeout makes the file invalid.
        let broken = BASE_YAML.replace("ack_wait_seconds: 10", "ack_wait_seconds: 3");
        write_file(&mut file, &broken);

        let err = reloader.reload().expect_err("reload should fail");
        assert!(matches!(err, ConfigError::Invalid(_)));

        // The live table is bitwise unchanged.
        let after = routes.snapshot();
        assert_eq!(*before, *after);
        assert_eq!(
            routes.endpoints_for("t.example"),
            Some(vec!["http://a.example/hook".to_string()])
        );
    }

    #[test]
    fn unparseable_file_keeps_previous_routes() {
        let mut file = NamedTempFile::new().expect("temp file");
        write_file(&mut file, BASE_YAML);
        let (reloader, routes) = reloader(&file);

        write_file(&mut file, "routes: [::: not yaml");

        assert!(reloader.reload().is_err());
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn reload_accepts_route_additions() {
        let mut file = NamedTempFile::new().expect("temp file");
        write_file(&mut file, BASE_YAML);
        let (reloader, routes) = reloader(&file);

        let updated = format!(
            "{BASE_YAML}  - domain: u.example\n    endpoints:\n      - http://c.example/hook\n"
        );
        write_file(&mut file, &updated);

        let count = reloader.reload().expect("reload should succeed");
        assert_eq!(count, 2);
        assert_eq!(
            routes.endpoints_for("u.example"),
            Some(vec!["http://c.example/hook".to_string()])
        );
    }

    #[tokio::test]
    async fn watcher_picks_up_route_change() {
        let mut file = NamedTempFile::new().expect("temp file");
        write_file(&mut file, BASE_YAML);
        let (reloader, routes) = reloader(&file);

        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(Arc::new(reloader).watch(shutdown.clone()));

        // Ensure a different mtime even on coarse-grained filesystems.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let updated = BASE_YAML.replace("http://a.example/hook", "http://b.example/hook");
        write_file(&mut file, &updated);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(6);
        loop {
            if routes.endpoints_for("t.example")
                == Some(vec!["http://b.example/hook".to_string()])
            {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "watcher did not apply the change within the poll window"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        shutdown.cancel();
        watcher.await.expect("watcher task should join");
    }

    #[test]
    fn manual_replace_does_not_require_reloader() {
        // The reload endpoint and the watcher share RouteTable::replace;
        // direct replacement keeps lookups consistent.
        let table = RouteTable::new(&[Route {
            domain: "t.example".into(),
            endpoints: vec!["http://a.example/hook".into()],
        }]);
        table.replace(&[]);
        assert!(table.is_empty());
    }
}
