//! Config file watcher for hot-adding services.
//!
//! Breaker parameters are immutable, so the only thing a reload can change is
//! which services exist. The watcher forwards just the service list; the
//! registry ignores entries for services it already holds.
//!
//! The parent directory is watched rather than the file itself. Editors that
//! save by writing a temp file and renaming it over the original replace the
//! inode, and a watch on the old inode would silently stop firing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::resilience::CircuitBreakerConfig;

/// Watches the config file and emits its service list after each change.
pub struct ConfigWatcher {
    path: PathBuf,
    services_tx: mpsc::UnboundedSender<Vec<CircuitBreakerConfig>>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of the service updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Vec<CircuitBreakerConfig>>) {
        let (services_tx, services_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                services_tx,
            },
            services_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = watch_dir(&self.path);
        let Some(file_name) = self.path.file_name().map(|n| n.to_os_string()) else {
            return Err(notify::Error::generic("config path has no file name"));
        };

        let path = self.path.clone();
        let tx = self.services_tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches_config(&event, &file_name) => {
                    if let Some(services) = reload_services(&path) {
                        let _ = tx.send(services);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, dir = ?dir, "Watching config for new services");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `event` wrote, created or renamed-in the config file.
fn touches_config(event: &Event, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Load the service list, or `None` if the file is currently invalid.
fn reload_services(path: &Path) -> Option<Vec<CircuitBreakerConfig>> {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(
                path = ?path,
                services = config.services.len(),
                "Config changed, offering services to the registry"
            );
            Some(config.services)
        }
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Config reload rejected, keeping current services");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RenameMode};
    use notify::EventKind;

    fn name() -> OsString {
        OsString::from("breaker.toml")
    }

    #[test]
    fn test_rename_over_config_counts_as_change() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/etc/breaker/breaker.toml"));
        assert!(touches_config(&event, &name()));

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/breaker/breaker.toml"));
        assert!(touches_config(&event, &name()));
    }

    #[test]
    fn test_other_files_and_reads_are_ignored() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/breaker/breaker.toml.swp"));
        assert!(!touches_config(&event, &name()));

        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/etc/breaker/breaker.toml"));
        assert!(!touches_config(&event, &name()));
    }

    #[test]
    fn test_watch_dir_of_bare_file_name() {
        assert_eq!(watch_dir(Path::new("breaker.toml")), PathBuf::from("."));
        assert_eq!(
            watch_dir(Path::new("/etc/breaker/breaker.toml")),
            PathBuf::from("/etc/breaker")
        );
    }

    #[test]
    fn test_reload_forwards_services_only_when_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breaker.toml");

        std::fs::write(
            &path,
            r#"
[[services]]
service_id = "tts"
failure_threshold = 2
recovery_timeout_ms = 5000
half_open_success_threshold = 1
"#,
        )
        .unwrap();
        let services = reload_services(&path).unwrap();
        assert_eq!(services, vec![CircuitBreakerConfig::new("tts", 2, 5_000, 1)]);

        std::fs::write(&path, "[[services]]\nservice_id = \"\"\n").unwrap();
        assert!(reload_services(&path).is_none());
    }
}
