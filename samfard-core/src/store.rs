use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Write precondition failed for {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("Store interaction timed out after {0} ms")]
    Timeout(u64),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Contention and timeouts are transient; backend failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Timeout(_))
    }
}

/// A document snapshot carrying the version an optimistic commit checks against.
#[derive(Debug, Clone)]
pub struct VersionedDoc {
    pub collection: String,
    pub id: String,
    pub data: serde_json::Value,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl VersionedDoc {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            StoreError::Backend(format!("decode {}/{}: {}", self.collection, self.id, e))
        })
    }

    /// Precondition pinning this exact revision.
    pub fn unchanged(&self) -> Precondition {
        Precondition::VersionIs {
            collection: self.collection.clone(),
            id: self.id.clone(),
            version: self.version,
        }
    }
}

/// One write inside a conditional commit.
#[derive(Debug, Clone)]
pub enum Write {
    Put {
        collection: String,
        id: String,
        data: serde_json::Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl Write {
    pub fn put<T: Serialize>(collection: &str, id: &str, value: &T) -> Result<Self, StoreError> {
        let data = serde_json::to_value(value)
            .map_err(|e| StoreError::Backend(format!("encode {}/{}: {}", collection, id, e)))?;
        Ok(Write::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        })
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// What must still hold at commit time for the whole commit to apply.
#[derive(Debug, Clone)]
pub enum Precondition {
    VersionIs {
        collection: String,
        id: String,
        version: u64,
    },
    Missing {
        collection: String,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted on the change feed after every committed write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
    pub data: Option<serde_json::Value>,
}

/// The contract the engine requires from its backing document store.
///
/// Writes that depend on a prior read carry that read's version as a
/// precondition; the store rejects the commit with `Conflict` when any
/// precondition no longer holds. Consumers of `subscribe` get a diff per
/// committed write and nothing during aborted commits.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDoc>, StoreError>;

    async fn list(&self, collection: &str) -> Result<Vec<VersionedDoc>, StoreError>;

    /// Applies every write atomically iff every precondition holds.
    async fn commit(
        &self,
        writes: Vec<Write>,
        preconditions: Vec<Precondition>,
    ) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Caps a store interaction with a caller-visible deadline, mapping the
/// elapsed case onto the retryable `Timeout` variant.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline.as_millis() as u64)),
    }
}
