use serde_json::Value;

use crate::model::{Id, Record};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Id },

    #[error("{kind} with {key} '{value}' already exists")]
    DuplicateKey {
        kind: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("stored document could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A record flattened for persistence: its JSON body plus the keys the backend
/// must keep unique within the collection.
#[derive(Debug, Clone)]
pub struct Document {
    pub collection: &'static str,
    pub kind: &'static str,
    pub id: Id,
    pub body: Value,
    pub unique_keys: Vec<(&'static str, String)>,
}

impl Document {
    pub fn from_record<R: Record>(record: &R) -> Result<Self, StoreError> {
        Ok(Self {
            collection: R::COLLECTION,
            kind: R::LABEL,
            id: record.id().to_string(),
            body: serde_json::to_value(record)?,
            unique_keys: record.unique_keys(),
        })
    }

    pub fn duplicate(&self, key: &'static str, value: impl Into<String>) -> StoreError {
        StoreError::DuplicateKey {
            kind: self.kind,
            key,
            value: value.into(),
        }
    }
}

/// Backend seam: untyped documents grouped by collection.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Fails with `DuplicateKey` when the id or any unique key is taken.
    async fn insert_document(&self, document: Document) -> Result<(), StoreError>;
    async fn fetch_document(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError>;
    async fn scan_collection(&self, collection: &'static str) -> Result<Vec<Value>, StoreError>;
    /// Returns false when no document with that id exists.
    async fn replace_document(&self, document: Document) -> Result<bool, StoreError>;
    async fn remove_document(&self, collection: &'static str, id: &str) -> Result<bool, StoreError>;
}

/// Typed record operations layered over any [`Store`].
#[async_trait::async_trait]
pub trait RecordStore: Store {
    async fn create_record<R: Record>(&self, record: R) -> Result<R, StoreError> {
        self.insert_document(Document::from_record(&record)?).await?;
        Ok(record)
    }

    async fn get_record<R: Record>(&self, id: &str) -> Result<R, StoreError> {
        match self.fetch_document(R::COLLECTION, id).await? {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Err(StoreError::NotFound {
                kind: R::LABEL,
                id: id.to_string(),
            }),
        }
    }

    /// Every record matching `filter`, in the kind's listing order.
    async fn list_records<R: Record>(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError> {
        let mut records = Vec::new();
        for body in self.scan_collection(R::COLLECTION).await? {
            let record: R = serde_json::from_value(body)?;
            if record.matches(filter) {
                records.push(record);
            }
        }
        records.sort_by(R::listing_order);
        Ok(records)
    }

    async fn update_record<R: Record>(&self, record: R) -> Result<R, StoreError> {
        if self.replace_document(Document::from_record(&record)?).await? {
            Ok(record)
        } else {
            Err(StoreError::NotFound {
                kind: R::LABEL,
                id: record.id().to_string(),
            })
        }
    }

    async fn delete_record<R: Record>(&self, id: &str) -> Result<(), StoreError> {
        if self.remove_document(R::COLLECTION, id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: R::LABEL,
                id: id.to_string(),
            })
        }
    }
}

impl<T: Store> RecordStore for T {}
