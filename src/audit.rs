//! Append-only audit trail of mutating actions

use chrono::Utc;
use log::{error, info};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{Database, Filter, StoreError};
use crate::models::{Actor, ActorSnapshot, AuditId, AuditLog, AuditTarget, EntityKind};

/// Writes audit entries. A failed write is logged and never fails the
/// operation it describes.
#[derive(Clone)]
pub struct AuditRecorder {
    db: Database,
}

impl AuditRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        actor: Option<&Actor>,
        action: &str,
        kind: EntityKind,
        target: Option<Uuid>,
        details: Value,
    ) {
        let entry = AuditLog {
            id: AuditId::new(),
            action: action.to_string(),
            user: ActorSnapshot::of(actor),
            target: AuditTarget { kind, id: target },
            details,
            created_at: Utc::now(),
        };

        match self.db.insert(&entry).await {
            Ok(()) => info!(
                "Audit: {action} on {kind} {} by {}",
                target.map(|id| id.to_string()).unwrap_or_default(),
                entry.user.role
            ),
            Err(e) => error!("Failed to record audit entry {action:?}: {e}"),
        }
    }

    /// Newest entries first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditLog>, StoreError> {
        let mut entries: Vec<AuditLog> = self.db.find(&Filter::All).await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::db::{Document, DocumentStore, JsonFileStore};
    use crate::models::{Role, UserId};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    /// Store whose writes to one collection always fail.
    pub struct BrokenCollection {
        pub inner: JsonFileStore,
        pub broken: &'static str,
    }

    impl BrokenCollection {
        pub fn new(broken: &'static str) -> Self {
            Self {
                inner: JsonFileStore::memory(),
                broken,
            }
        }

        fn check(&self, collection: &str) -> Result<(), StoreError> {
            if collection == self.broken {
                Err(StoreError::Io(std::io::Error::other("disk full")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for BrokenCollection {
        async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError> {
            self.check(collection)?;
            self.inner.insert(collection, id, doc).await
        }

        async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
            self.inner.get(collection, id).await
        }

        async fn replace(&self, collection: &str, id: Uuid, doc: Value) -> Result<bool, StoreError> {
            self.check(collection)?;
            self.inner.replace(collection, id, doc).await
        }

        async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
            self.inner.remove(collection, id).await
        }

        async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
            self.inner.find(collection, filter).await
        }
    }

    #[tokio::test]
    async fn records_actor_snapshot_and_target() {
        let audit = AuditRecorder::new(Database::memory());
        let actor = Actor {
            id: UserId::new(),
            role: Role::Staff,
            patient: None,
        };
        let target = Uuid::new_v4();

        audit
            .record(Some(&actor), "Create Patient", EntityKind::Patient, Some(target), json!({"x": 1}))
            .await;
        audit
            .record(None, "Create Admin", EntityKind::User, None, Value::Null)
            .await;

        let entries = audit.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);

        let staff = entries.iter().find(|e| e.action == "Create Patient").unwrap();
        assert_eq!(staff.user.id, Some(actor.id));
        assert_eq!(staff.user.role, "staff");
        assert_eq!(staff.target.id, Some(target));
        assert_eq!(staff.details, json!({"x": 1}));

        let system = entries.iter().find(|e| e.action == "Create Admin").unwrap();
        assert_eq!(system.user.id, None);
        assert_eq!(system.user.role, "system");
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let audit = AuditRecorder::new(Database::memory());
        for i in 0..5 {
            audit
                .record(None, &format!("Action {i}"), EntityKind::User, None, Value::Null)
                .await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let entries = audit.recent(3).await.unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["Action 4", "Action 3", "Action 2"]);
    }

    #[tokio::test]
    async fn failed_write_is_swallowed() {
        let db = Database::new(Arc::new(BrokenCollection::new(AuditLog::COLLECTION)));
        let audit = AuditRecorder::new(db);

        audit
            .record(None, "Anything", EntityKind::Invoice, None, Value::Null)
            .await;

        assert!(audit.recent(10).await.unwrap().is_empty());
    }
}
