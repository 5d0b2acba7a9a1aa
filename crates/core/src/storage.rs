//! KeyValueStore trait — the local persistence capability used for the
//! credential.

use async_trait::async_trait;
use crate::error::Error;

/// A small string key-value store that survives restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}
