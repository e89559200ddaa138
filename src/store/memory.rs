use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::model::Id;
use crate::store::traits::{Document, Store, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    body: Value,
    unique_keys: Vec<(&'static str, String)>,
}

/// Process-local store used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Documents keyed by collection, then id
    collections: RwLock<HashMap<&'static str, BTreeMap<Id, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// First unique key of `document` already held by a different record.
fn taken_key(
    entries: &BTreeMap<Id, Entry>,
    document: &Document,
) -> Option<(&'static str, String)> {
    document.unique_keys.iter().find_map(|(key, value)| {
        let clash = entries.iter().any(|(id, entry)| {
            *id != document.id
                && entry
                    .unique_keys
                    .iter()
                    .any(|(k, v)| k == key && v == value)
        });
        clash.then(|| (*key, value.clone()))
    })
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let entries = collections.entry(document.collection).or_default();

        if entries.contains_key(&document.id) {
            return Err(document.duplicate("id", document.id.clone()));
        }
        if let Some((key, value)) = taken_key(entries, &document) {
            return Err(document.duplicate(key, value));
        }

        entries.insert(
            document.id,
            Entry {
                body: document.body,
                unique_keys: document.unique_keys,
            },
        );
        Ok(())
    }

    async fn fetch_document(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(id))
            .map(|entry| entry.body.clone()))
    }

    async fn scan_collection(&self, collection: &'static str) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|entries| entries.values().map(|e| e.body.clone()).collect())
            .unwrap_or_default())
    }

    async fn replace_document(&self, document: Document) -> Result<bool, StoreError> {
        let mut collections = self.collections.write();
        let Some(entries) = collections.get_mut(document.collection) else {
            return Ok(false);
        };
        if !entries.contains_key(&document.id) {
            return Ok(false);
        }
        if let Some((key, value)) = taken_key(entries, &document) {
            return Err(document.duplicate(key, value));
        }

        entries.insert(
            document.id,
            Entry {
                body: document.body,
                unique_keys: document.unique_keys,
            },
        );
        Ok(true)
    }

    async fn remove_document(&self, collection: &'static str, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(collection)
            .map_or(false, |entries| entries.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabTechnician, LabTechnicianFilter, NewLabTechnician, Record};
    use crate::store::RecordStore;
    use chrono::Utc;

    fn technician(user_id: &str, employee_id: &str) -> LabTechnician {
        LabTechnician::from_draft(
            NewLabTechnician {
                user_id: Some(user_id.to_string()),
                employee_id: Some(employee_id.to_string()),
            },
            String::new(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unique_keys_are_enforced_across_records() {
        let store = MemoryStore::new();
        store.create_record(technician("T1", "E-1")).await.unwrap();

        let err = store.create_record(technician("T2", "E-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { key: "employee_id", .. }));

        let err = store.create_record(technician("T1", "E-9")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { key: "id", .. }));

        // An update that keeps its own key is not a clash.
        let mut t1: LabTechnician = store.get_record("T1").await.unwrap();
        t1.touch(Utc::now());
        store.update_record(t1).await.unwrap();
    }

    #[tokio::test]
    async fn missing_records_surface_as_not_found() {
        let store = MemoryStore::new();
        let err = store.get_record::<LabTechnician>("nobody").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "Lab Technician", .. }));

        let err = store.delete_record::<LabTechnician>("nobody").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.update_record(technician("T9", "E-9")).await.is_err());
    }

    #[tokio::test]
    async fn list_applies_filter_and_order() {
        let store = MemoryStore::new();
        store.create_record(technician("T2", "E-2")).await.unwrap();
        store.create_record(technician("T1", "E-1")).await.unwrap();

        let all: Vec<LabTechnician> = store
            .list_records(&LabTechnicianFilter::default())
            .await
            .unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.user_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);

        let filter = LabTechnicianFilter {
            employee_id: Some("E-2".to_string()),
        };
        let only: Vec<LabTechnician> = store.list_records(&filter).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].user_id, "T2");
    }
}
