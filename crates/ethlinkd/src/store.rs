//! Persisted per-device configuration records
//!
//! One file per identity, named `{device}-{mac}.conf`, under the record
//! directory. Existence of the file is the "already configured" signal.

use crate::record::{parse_record, render_record};
use crate::types::{DeviceIdentity, NetworkConfig};
use async_trait::async_trait;
use ethlink_common::{EthError, EthResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Identity-keyed record storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// True iff a record exists for the identity
    async fn exists(&self, identity: &DeviceIdentity) -> bool;

    /// Read the record back; `Ok(None)` when there is none
    async fn read(&self, identity: &DeviceIdentity) -> EthResult<Option<NetworkConfig>>;

    /// Replace the record. The new record is staged in full and then renamed
    /// over the old one, so a failed write leaves the previous record intact.
    async fn write(&self, identity: &DeviceIdentity, config: &NetworkConfig) -> EthResult<()>;

    /// Delete the record; deleting a missing record succeeds
    async fn remove(&self, identity: &DeviceIdentity) -> EthResult<()>;
}

/// Record store backed by a directory
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Record path for an identity
    pub fn record_path(&self, identity: &DeviceIdentity) -> PathBuf {
        self.dir.join(identity.record_file_name())
    }

    fn staging_path(&self, identity: &DeviceIdentity) -> PathBuf {
        self.dir.join(format!(".{}.tmp", identity.record_file_name()))
    }

    async fn stage(&self, path: &Path, body: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove staged record");
            }
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn exists(&self, identity: &DeviceIdentity) -> bool {
        tokio::fs::metadata(self.record_path(identity)).await.is_ok()
    }

    async fn read(&self, identity: &DeviceIdentity) -> EthResult<Option<NetworkConfig>> {
        let path = self.record_path(identity);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => parse_record(&body).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EthError::Io(e)),
        }
    }

    async fn write(&self, identity: &DeviceIdentity, config: &NetworkConfig) -> EthResult<()> {
        let path = self.record_path(identity);
        let staging = self.staging_path(identity);
        let body = render_record(&identity.name, config);

        if let Err(e) = self.stage(&staging, &body).await {
            self.discard(&staging).await;
            return Err(EthError::ConfigWriteFailed { path, source: e });
        }

        // rename(2) replaces an existing record in one step; the old record
        // is only removed first when that replacement is refused
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            debug!(path = %path.display(), error = %e, "Rename over record refused");
            if let Err(e) = self.remove(identity).await {
                self.discard(&staging).await;
                return Err(e);
            }
            if let Err(e) = tokio::fs::rename(&staging, &path).await {
                self.discard(&staging).await;
                return Err(EthError::ConfigWriteFailed { path, source: e });
            }
        }

        info!(
            device = %identity.name,
            path = %path.display(),
            kind = config.kind(),
            "Wrote configuration record"
        );
        Ok(())
    }

    async fn remove(&self, identity: &DeviceIdentity) -> EthResult<()> {
        let path = self.record_path(identity);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed configuration record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EthError::ConfigRemoveFailed { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StaticConfig;
    use ethlink_common::MacAddress;
    use std::net::Ipv4Addr;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("eth0", MacAddress::new([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]))
    }

    fn static_config() -> NetworkConfig {
        NetworkConfig::Static(StaticConfig::new(
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(255, 255, 255, 0),
        ))
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());

        assert!(!store.exists(&identity()).await);
        assert_eq!(store.read(&identity()).await.unwrap(), None);

        store.write(&identity(), &static_config()).await.unwrap();
        assert!(store.exists(&identity()).await);
        assert_eq!(store.read(&identity()).await.unwrap(), Some(static_config()));
        assert!(dir.path().join("eth0-525400123456.conf").is_file());
    }

    #[tokio::test]
    async fn test_replace_leaves_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());

        store.write(&identity(), &NetworkConfig::Dhcp).await.unwrap();
        store.write(&identity(), &static_config()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.read(&identity()).await.unwrap(), Some(static_config()));
    }

    #[tokio::test]
    async fn test_write_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested/netcfg"));
        store.write(&identity(), &NetworkConfig::Dhcp).await.unwrap();
        assert!(store.exists(&identity()).await);
    }

    #[tokio::test]
    async fn test_failed_staging_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        store.write(&identity(), &NetworkConfig::Dhcp).await.unwrap();

        // A directory squatting on the staging path makes staging fail
        std::fs::create_dir(dir.path().join(".eth0-525400123456.conf.tmp")).unwrap();

        let err = store.write(&identity(), &static_config()).await.unwrap_err();
        assert!(matches!(err, EthError::ConfigWriteFailed { .. }));
        assert_eq!(store.read(&identity()).await.unwrap(), Some(NetworkConfig::Dhcp));
    }

    #[tokio::test]
    async fn test_refused_replacement_keeps_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());

        // A non-empty directory at the record path can be neither renamed
        // over nor removed as a file
        let record = store.record_path(&identity());
        std::fs::create_dir(&record).unwrap();
        std::fs::write(record.join("keep"), "x").unwrap();

        let err = store.write(&identity(), &static_config()).await.unwrap_err();
        assert!(matches!(err, EthError::ConfigRemoveFailed { .. }));
        assert!(record.join("keep").is_file());
        assert!(!dir.path().join(".eth0-525400123456.conf.tmp").exists());
    }

    #[tokio::test]
    async fn test_replace_updates_content_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        let record = store.record_path(&identity());

        store.write(&identity(), &static_config()).await.unwrap();
        let before = std::fs::read_to_string(&record).unwrap();
        store.write(&identity(), &NetworkConfig::Dhcp).await.unwrap();
        let after = std::fs::read_to_string(&record).unwrap();

        assert!(before.contains("inet static"));
        assert!(after.contains("inet dhcp"));
        assert!(!dir.path().join(".eth0-525400123456.conf.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_record_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        store.remove(&identity()).await.unwrap();

        store.write(&identity(), &NetworkConfig::Dhcp).await.unwrap();
        store.remove(&identity()).await.unwrap();
        assert!(!store.exists(&identity()).await);
    }

    #[tokio::test]
    async fn test_unparseable_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        std::fs::write(store.record_path(&identity()), "garbage\n").unwrap();

        assert!(store.exists(&identity()).await);
        assert!(store.read(&identity()).await.is_err());
    }
}
