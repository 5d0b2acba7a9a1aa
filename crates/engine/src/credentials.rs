//! Credential Store — holds the single API key, persisted through a
//! `KeyValueStore`.
//!
//! Two stores ship here:
//! - `FileKeyValueStore`: a JSON object on disk, rewritten on every mutation
//!   (`~/.contextos/credentials.json` by default)
//! - `InMemoryKeyValueStore`: for tests and throwaway sessions

use async_trait::async_trait;
use contextos_core::error::Error;
use contextos_core::event::{DomainEvent, EventBus};
use contextos_core::storage::KeyValueStore;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The namespaced key the credential is stored under.
pub const CREDENTIAL_KEY: &str = "contextos_preview_api_key";

/// An opaque API key. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key: String,
}

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The raw key, for transmission to the service.
    pub fn expose(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Owns the process-wide credential.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Credential>>,
    events: Arc<EventBus>,
}

impl CredentialStore {
    /// Create an empty store. Call `load` to hydrate from persistence.
    pub fn new(store: Arc<dyn KeyValueStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            events,
        }
    }

    /// Create a store and hydrate it from persistence.
    pub async fn load(store: Arc<dyn KeyValueStore>, events: Arc<EventBus>) -> Result<Self, Error> {
        let this = Self::new(store, events);
        let saved = this
            .store
            .get(CREDENTIAL_KEY)
            .await?
            .filter(|k| !k.trim().is_empty());
        debug!(backend = this.store.name(), found = saved.is_some(), "Credential loaded");
        *this.current.write().await = saved.map(Credential::new);
        Ok(this)
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Set and persist a key. A blank key clears the credential instead.
    /// Returns whether the store is now authenticated.
    pub async fn configure(&self, key: &str) -> Result<bool, Error> {
        let key = key.trim();
        if key.is_empty() {
            self.clear().await?;
            return Ok(false);
        }

        self.store.set(CREDENTIAL_KEY, key).await?;
        *self.current.write().await = Some(Credential::new(key));
        info!("API key configured");
        self.events.publish(DomainEvent::CredentialChanged {
            authenticated: true,
            timestamp: chrono::Utc::now(),
        });
        Ok(true)
    }

    /// Use a key for this process only, without persisting it.
    pub async fn set_transient(&self, key: &str) {
        let key = key.trim();
        if !key.is_empty() {
            *self.current.write().await = Some(Credential::new(key));
        }
    }

    /// Forget the key, in memory and on disk.
    pub async fn clear(&self) -> Result<(), Error> {
        *self.current.write().await = None;
        self.store.remove(CREDENTIAL_KEY).await?;
        self.events.publish(DomainEvent::CredentialChanged {
            authenticated: false,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }
}

/// A file-backed key-value store holding one JSON object.
///
/// Values are loaded on creation and flushed on every mutation.
pub struct FileKeyValueStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open the store at `path`. A missing file starts empty; it is created
    /// on first write.
    pub fn new(path: PathBuf) -> Self {
        let values = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = values.len(), "Key-value store loaded");
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    fn load_from_disk(path: &Path) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };

        match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupted key-value store");
                BTreeMap::new()
            }
        }
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create storage directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::Storage(format!("Failed to restrict permissions: {e}")))?;
        }

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut values = self.values.write().await;
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

/// A key-value store that lives only as long as the process.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::default())
    }

    #[tokio::test]
    async fn configure_persists_and_authenticates() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = CredentialStore::new(kv.clone(), bus());
        assert!(!store.is_configured().await);

        assert!(store.configure("  sk-live-123 ").await.unwrap());
        assert!(store.is_configured().await);
        assert_eq!(store.credential().await.unwrap().expose(), "sk-live-123");
        assert_eq!(
            kv.get(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("sk-live-123")
        );
    }

    #[tokio::test]
    async fn blank_key_is_not_authenticated() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = CredentialStore::new(kv.clone(), bus());
        store.configure("sk-old").await.unwrap();

        assert!(!store.configure("   ").await.unwrap());
        assert!(!store.is_configured().await);
        assert!(kv.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_restores_saved_key() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        kv.set(CREDENTIAL_KEY, "sk-saved").await.unwrap();
        let store = CredentialStore::load(kv, bus()).await.unwrap();
        assert_eq!(store.credential().await.unwrap().expose(), "sk-saved");
    }

    #[tokio::test]
    async fn transient_key_is_not_persisted() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = CredentialStore::new(kv.clone(), bus());
        store.set_transient("sk-env").await;
        assert!(store.is_configured().await);
        assert!(kv.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_publishes_event() {
        let events = bus();
        let mut rx = events.subscribe();
        let store = CredentialStore::new(Arc::new(InMemoryKeyValueStore::new()), events);
        store.clear().await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::CredentialChanged {
                authenticated: false,
                ..
            }
        ));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let debug = format!("{:?}", Credential::new("sk-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let first = FileKeyValueStore::new(path.clone());
        first.set(CREDENTIAL_KEY, "sk-disk").await.unwrap();

        let second = FileKeyValueStore::new(path.clone());
        assert_eq!(
            second.get(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("sk-disk")
        );

        second.remove(CREDENTIAL_KEY).await.unwrap();
        let third = FileKeyValueStore::new(path);
        assert!(third.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileKeyValueStore::new(path);
        assert!(store.get(CREDENTIAL_KEY).await.unwrap().is_none());
        store.set(CREDENTIAL_KEY, "sk-fresh").await.unwrap();
        assert_eq!(
            store.get(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("sk-fresh")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileKeyValueStore::new(path.clone());
        store.set(CREDENTIAL_KEY, "sk").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
