//! Link event source
//!
//! An inotify watch on the device's sysfs `carrier` file. A blocking reader
//! thread forwards every modification into a tokio channel; the controller
//! pulls events one at a time.

use crate::inspector::carrier_path;
use crate::types::LinkEvent;
use async_trait::async_trait;
use ethlink_common::{EthError, EthResult};
use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Ordered stream of "link may have changed" events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkEventSource: Send {
    /// Next event; `Ok(None)` once the source has ended
    async fn next_event(&mut self) -> EthResult<Option<LinkEvent>>;
}

type EventResult = EthResult<LinkEvent>;

/// Carrier-file watcher. Yields [`LinkEvent::Initial`] first, then one
/// [`LinkEvent::CarrierChanged`] per modification.
pub struct CarrierWatcher {
    device: String,
    initial_pending: bool,
    rx: mpsc::UnboundedReceiver<EventResult>,
}

impl CarrierWatcher {
    /// Establish the watch. Fails with `DeviceNotFound` when the carrier
    /// file does not exist.
    pub fn subscribe(sysfs_root: &Path, device: &str) -> EthResult<Self> {
        let path = carrier_path(sysfs_root, device);

        let inotify = Inotify::init(InitFlags::IN_CLOEXEC)
            .map_err(|e| EthError::watch(format!("inotify init: {}", e)))?;

        let mask = AddWatchFlags::IN_MODIFY | AddWatchFlags::IN_DELETE_SELF;
        match inotify.add_watch(path.as_path(), mask) {
            Ok(_) => {}
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => {
                return Err(EthError::device_not_found(device));
            }
            Err(e) => {
                return Err(EthError::watch(format!("watch {}: {}", path.display(), e)));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let thread_device = device.to_string();
        std::thread::Builder::new()
            .name(format!("carrier-{}", device))
            .spawn(move || watch_loop(inotify, thread_device, tx))
            .map_err(|e| EthError::watch(format!("spawn reader thread: {}", e)))?;

        debug!(device, path = %path.display(), "Watching carrier file");

        Ok(Self {
            device: device.to_string(),
            initial_pending: true,
            rx,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

#[async_trait]
impl LinkEventSource for CarrierWatcher {
    async fn next_event(&mut self) -> EthResult<Option<LinkEvent>> {
        if self.initial_pending {
            self.initial_pending = false;
            return Ok(Some(LinkEvent::Initial));
        }
        match self.rx.recv().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

fn watch_loop(inotify: Inotify, device: String, tx: mpsc::UnboundedSender<EventResult>) {
    loop {
        let events = match inotify.read_events() {
            Ok(events) => events,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!(device = %device, error = %e, "Carrier watch read failed");
                let _ = tx.send(Err(EthError::watch(e.to_string())));
                return;
            }
        };

        for event in events {
            trace!(device = %device, mask = ?event.mask, "Carrier inotify event");

            if event
                .mask
                .intersects(AddWatchFlags::IN_DELETE_SELF | AddWatchFlags::IN_IGNORED)
            {
                let _ = tx.send(Err(EthError::device_not_found(device.as_str())));
                return;
            }

            if event.mask.contains(AddWatchFlags::IN_MODIFY)
                && tx.send(Ok(LinkEvent::CarrierChanged)).is_err()
            {
                // Receiver dropped
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = CarrierWatcher::subscribe(dir.path(), "eth9").err().unwrap();
        assert!(matches!(err, EthError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_first_event_is_initial() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("eth0")).unwrap();
        std::fs::write(dir.path().join("eth0/carrier"), "0\n").unwrap();

        let mut watcher = CarrierWatcher::subscribe(dir.path(), "eth0").unwrap();
        assert_eq!(watcher.device(), "eth0");
        assert_eq!(watcher.next_event().await.unwrap(), Some(LinkEvent::Initial));
    }
}
