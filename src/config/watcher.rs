//! Configuration file watcher for hot reload.
//!
//! Editors usually emit several modify events per save; a reload is only
//! forwarded when the parsed configuration differs from the last one sent.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::InspectorConfig;

/// Watches one TOML file and emits validated configurations that changed.
pub struct ConfigWatcher {
    path: PathBuf,
    current: InspectorConfig,
    update_tx: mpsc::UnboundedSender<InspectorConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the configuration already in use.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(
        path: &Path,
        current: InspectorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<InspectorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher stops when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let last_sent = Mutex::new(self.current);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_content_change(&event.kind) => match load_config(&path) {
                    Ok(new_config) => {
                        let mut last = last_sent.lock().unwrap_or_else(PoisonError::into_inner);
                        if forward_if_changed(&mut last, new_config, &tx) {
                            tracing::info!(path = ?path, "Configuration reloaded");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    kind.is_modify() || kind.is_create()
}

/// Send `new` if it differs from `last`; returns whether it was sent.
fn forward_if_changed(
    last: &mut InspectorConfig,
    new: InspectorConfig,
    tx: &mpsc::UnboundedSender<InspectorConfig>,
) -> bool {
    if *last == new {
        return false;
    }
    *last = new.clone();
    tx.send(new).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_reloads_suppressed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut last = InspectorConfig::default();

        assert!(!forward_if_changed(&mut last, InspectorConfig::default(), &tx));

        let mut changed = InspectorConfig::default();
        changed.store.max_capacity = 7;
        assert!(forward_if_changed(&mut last, changed.clone(), &tx));
        assert!(!forward_if_changed(&mut last, changed, &tx));

        assert_eq!(rx.try_recv().unwrap().store.max_capacity, 7);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_content_change_kinds() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_content_change(&EventKind::Remove(RemoveKind::File)));
    }
}
