use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use async_trait::async_trait;
use samfard_core::clock::{Clock, SystemClock};
use samfard_core::store::{
    ChangeEvent, ChangeKind, Precondition, StoreError, TransactionalStore, VersionedDoc, Write,
};

struct StoredDoc {
    data: serde_json::Value,
    version: u64,
    updated_at: DateTime<Utc>,
}

/// Reference `TransactionalStore` backed by process memory.
///
/// Every committed write bumps the document version; commits validate their
/// preconditions under the same write lock that applies the writes, so two
/// racing read-modify-write cycles cannot both land on the same revision.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, StoredDoc>>>,
    change_tx: broadcast::Sender<ChangeEvent>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>, feed_buffer: usize) -> Self {
        let (change_tx, _) = broadcast::channel(feed_buffer);
        Self {
            collections: RwLock::new(HashMap::new()),
            change_tx,
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock), 256)
    }

    pub fn from_config(clock: Arc<dyn Clock>, config: &crate::app_config::Config) -> Self {
        Self::new(clock, config.store.feed_buffer)
    }

    fn check_precondition(
        state: &HashMap<String, HashMap<String, StoredDoc>>,
        precondition: &Precondition,
    ) -> Result<(), StoreError> {
        match precondition {
            Precondition::VersionIs {
                collection,
                id,
                version,
            } => {
                let current = state.get(collection).and_then(|c| c.get(id));
                match current {
                    Some(doc) if doc.version == *version => Ok(()),
                    _ => Err(StoreError::Conflict {
                        collection: collection.clone(),
                        id: id.clone(),
                    }),
                }
            }
            Precondition::Missing { collection, id } => {
                let occupied = state
                    .get(collection)
                    .map(|c| c.contains_key(id))
                    .unwrap_or(false);
                if occupied {
                    Err(StoreError::Conflict {
                        collection: collection.clone(),
                        id: id.clone(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDoc>, StoreError> {
        let state = self.collections.read().await;
        Ok(state.get(collection).and_then(|c| c.get(id)).map(|doc| {
            VersionedDoc {
                collection: collection.to_string(),
                id: id.to_string(),
                data: doc.data.clone(),
                version: doc.version,
                updated_at: doc.updated_at,
            }
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<VersionedDoc>, StoreError> {
        let state = self.collections.read().await;
        let mut docs: Vec<VersionedDoc> = state
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, doc)| VersionedDoc {
                        collection: collection.to_string(),
                        id: id.clone(),
                        data: doc.data.clone(),
                        version: doc.version,
                        updated_at: doc.updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn commit(
        &self,
        writes: Vec<Write>,
        preconditions: Vec<Precondition>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.collections.write().await;

        for precondition in &preconditions {
            if let Err(conflict) = Self::check_precondition(&state, precondition) {
                tracing::debug!("commit rejected: {}", conflict);
                return Err(conflict);
            }
        }

        let mut events = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                Write::Put {
                    collection,
                    id,
                    data,
                } => {
                    let docs = state.entry(collection.clone()).or_default();
                    let (version, kind) = match docs.get(&id) {
                        Some(existing) => (existing.version + 1, ChangeKind::Updated),
                        None => (1, ChangeKind::Created),
                    };
                    docs.insert(
                        id.clone(),
                        StoredDoc {
                            data: data.clone(),
                            version,
                            updated_at: now,
                        },
                    );
                    events.push(ChangeEvent {
                        collection,
                        id,
                        kind,
                        data: Some(data),
                    });
                }
                Write::Delete { collection, id } => {
                    let removed = state
                        .get_mut(&collection)
                        .and_then(|docs| docs.remove(&id))
                        .is_some();
                    if removed {
                        events.push(ChangeEvent {
                            collection,
                            id,
                            kind: ChangeKind::Deleted,
                            data: None,
                        });
                    }
                }
            }
        }
        drop(state);

        for event in events {
            // No subscribers is fine; the feed is an observation channel.
            let _ = self.change_tx.send(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(id: &str, value: serde_json::Value) -> Write {
        Write::Put {
            collection: "bookings".to_string(),
            id: id.to_string(),
            data: value,
        }
    }

    #[tokio::test]
    async fn test_put_creates_version_one() {
        let store = MemoryStore::with_system_clock();
        store
            .commit(vec![put("b-1", json!({"seats": 1}))], vec![])
            .await
            .unwrap();

        let doc = store.get("bookings", "b-1").await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.data["seats"], 1);
    }

    #[tokio::test]
    async fn test_stale_version_precondition_conflicts() {
        let store = MemoryStore::with_system_clock();
        store
            .commit(vec![put("b-1", json!({"n": 0}))], vec![])
            .await
            .unwrap();

        let stale = store.get("bookings", "b-1").await.unwrap().unwrap();

        store
            .commit(vec![put("b-1", json!({"n": 1}))], vec![stale.unchanged()])
            .await
            .unwrap();

        // Second writer still holds version 1.
        let result = store
            .commit(vec![put("b-1", json!({"n": 2}))], vec![stale.unchanged()])
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        let current = store.get("bookings", "b-1").await.unwrap().unwrap();
        assert_eq!(current.data["n"], 1);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn test_missing_precondition_guards_creation() {
        let store = MemoryStore::with_system_clock();
        let guard = Precondition::Missing {
            collection: "bookings".to_string(),
            id: "b-1".to_string(),
        };

        store
            .commit(vec![put("b-1", json!({}))], vec![guard.clone()])
            .await
            .unwrap();

        let result = store.commit(vec![put("b-1", json!({}))], vec![guard]).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_failed_precondition_applies_nothing() {
        let store = MemoryStore::with_system_clock();
        store
            .commit(vec![put("b-1", json!({"n": 0}))], vec![])
            .await
            .unwrap();

        let result = store
            .commit(
                vec![
                    put("b-1", json!({"n": 9})),
                    put("b-2", json!({"n": 9})),
                ],
                vec![Precondition::VersionIs {
                    collection: "bookings".to_string(),
                    id: "b-1".to_string(),
                    version: 99,
                }],
            )
            .await;

        assert!(result.is_err());
        assert!(store.get("bookings", "b-2").await.unwrap().is_none());
        let doc = store.get("bookings", "b-1").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], 0);
    }

    #[tokio::test]
    async fn test_subscription_sees_committed_writes() {
        let store = MemoryStore::with_system_clock();
        let mut feed = store.subscribe();

        store
            .commit(vec![put("b-1", json!({"n": 0}))], vec![])
            .await
            .unwrap();
        store
            .commit(vec![Write::delete("bookings", "b-1")], vec![])
            .await
            .unwrap();

        let created = feed.recv().await.unwrap();
        assert_eq!(created.kind, ChangeKind::Created);
        assert_eq!(created.id, "b-1");

        let deleted = feed.recv().await.unwrap();
        assert_eq!(deleted.kind, ChangeKind::Deleted);
        assert!(deleted.data.is_none());
    }

    #[tokio::test]
    async fn test_delete_of_absent_doc_emits_nothing() {
        let store = MemoryStore::with_system_clock();
        let mut feed = store.subscribe();

        store
            .commit(vec![Write::delete("bookings", "ghost")], vec![])
            .await
            .unwrap();
        store
            .commit(vec![put("b-1", json!({}))], vec![])
            .await
            .unwrap();

        // First event on the feed is the put, not the no-op delete.
        let event = feed.recv().await.unwrap();
        assert_eq!(event.id, "b-1");
    }
}
