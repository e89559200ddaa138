use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;
use crate::logic::merge::{flatten_identity, nest};
use crate::model::{Id, LabOrder, LocalLink, MergeShape, MergedView, OwnerRef, Record};
use crate::remote::{LookupOutcome, Outcome, RemoteCollections, Snapshot};
use crate::store::{RecordStore, Store, StoreError};

/// Outcomes of the lookups issued for one aggregation, keyed by (collection, id).
#[derive(Debug, Default)]
pub struct LookupCache {
    outcomes: HashMap<(String, Id), LookupOutcome>,
}

impl LookupCache {
    fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Snapshot or failure reason for one owner reference.
    pub fn resolve(&self, owner: &OwnerRef) -> (Option<Snapshot>, Option<String>) {
        match self.outcomes.get(&owner.lookup_key()) {
            Some(outcome) => outcome.clone().into_parts(&owner.collection, &owner.id),
            None => (
                None,
                Some(format!("lookup of {}/{} was not issued", owner.collection, owner.id)),
            ),
        }
    }
}

/// A linked local record reduced to what its parent's view nests.
#[derive(Debug, Clone)]
struct LinkedRecord {
    fields: Map<String, Value>,
    owners: Vec<OwnerRef>,
}

type LinkOutcome = Result<LinkedRecord, String>;

/// Composes local records with the remote snapshots their owner references point to.
///
/// Lookup failures never fail a response: they become annotations on the section
/// that could not be filled. Only a missing primary record is fatal, and that is
/// decided before the aggregator is called.
#[derive(Clone)]
pub struct Aggregator {
    remote: Arc<dyn RemoteCollections>,
    max_concurrency: usize,
}

impl Aggregator {
    pub fn new(remote: Arc<dyn RemoteCollections>, max_concurrency: usize) -> Self {
        Self {
            remote,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteCollections> {
        &self.remote
    }

    /// Issue one lookup per distinct (collection, id), at most `max_concurrency` at a time.
    pub async fn lookup_all<'a>(&self, owners: impl IntoIterator<Item = &'a OwnerRef>) -> LookupCache {
        let keys: Vec<(String, Id)> = owners
            .into_iter()
            .map(OwnerRef::lookup_key)
            .unique()
            .collect();

        let outcomes = stream::iter(keys)
            .map(|(collection, id)| {
                let remote = Arc::clone(&self.remote);
                async move {
                    let outcome = remote.fetch(&collection, &id).await;
                    ((collection, id), outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<HashMap<_, _>>()
            .await;

        LookupCache { outcomes }
    }

    /// Merged view of a single record.
    pub async fn detail<S: Store, R: Record>(&self, store: &S, record: &R) -> Result<MergedView, AppError> {
        let mut views = self.list(store, std::slice::from_ref(record)).await?;
        views
            .pop()
            .ok_or_else(|| AppError::internal("Aggregation produced no view", R::LABEL))
    }

    /// Merged views of many records, sharing one de-duplicated set of lookups.
    pub async fn list<S: Store, R: Record>(&self, store: &S, records: &[R]) -> Result<Vec<MergedView>, AppError> {
        let links = load_links(store, records).await;

        let mut owners: Vec<OwnerRef> = records.iter().flat_map(|r| r.owner_refs()).collect();
        owners.extend(
            links
                .values()
                .filter_map(|linked| linked.as_ref().ok())
                .flat_map(|linked| linked.owners.iter().cloned()),
        );
        let cache = self.lookup_all(&owners).await;
        log::debug!(
            "aggregating {} {} record(s) with {} lookup(s)",
            records.len(),
            R::COLLECTION,
            cache.len()
        );

        records
            .iter()
            .map(|record| compose(record, &cache, &links))
            .collect()
    }
}

fn record_fields<R: Record>(record: &R) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(AppError::internal(
            "Record did not serialize to an object",
            R::LABEL,
        )),
        Err(e) => Err(AppError::internal("Record could not be serialized", e)),
    }
}

fn nested_view(fields: Map<String, Value>, owners: &[OwnerRef], cache: &LookupCache) -> MergedView {
    let mut view = MergedView::from_fields(fields);
    for owner in owners {
        let (snapshot, reason) = cache.resolve(owner);
        nest(&mut view, &owner.role, snapshot.map(Value::Object), reason);
    }
    view
}

fn compose<R: Record>(
    record: &R,
    cache: &LookupCache,
    links: &HashMap<LocalLink, LinkOutcome>,
) -> Result<MergedView, AppError> {
    let fields = record_fields(record)?;
    let owners = record.owner_refs();

    let mut view = match (R::MERGE_SHAPE, owners.first()) {
        (MergeShape::Flattened, Some(identity)) => {
            let (snapshot, reason) = cache.resolve(identity);
            flatten_identity(fields, snapshot, reason)
        }
        _ => nested_view(fields, &owners, cache),
    };

    for link in record.local_links() {
        match links.get(&link) {
            Some(Ok(linked)) => {
                let nested = nested_view(linked.fields.clone(), &linked.owners, cache);
                view.attach_data(link.role, nested.into_value());
            }
            Some(Err(reason)) => view.annotate(link.role, reason.clone()),
            None => view.annotate(link.role, format!("{} {} was not loaded", link.kind, link.id)),
        }
    }
    Ok(view)
}

/// Load every distinct local link of `records` from the store.
async fn load_links<S: Store, R: Record>(store: &S, records: &[R]) -> HashMap<LocalLink, LinkOutcome> {
    let links: Vec<LocalLink> = records
        .iter()
        .flat_map(|r| r.local_links())
        .unique()
        .collect();

    let mut loaded = HashMap::with_capacity(links.len());
    for link in links {
        let outcome = load_link(store, &link).await;
        if let Err(reason) = &outcome {
            log::warn!("{}", reason);
        }
        loaded.insert(link, outcome);
    }
    loaded
}

async fn load_link<S: Store>(store: &S, link: &LocalLink) -> LinkOutcome {
    let result = if link.collection == LabOrder::COLLECTION {
        store.get_record::<LabOrder>(&link.id).await.map(|order| linked(&order))
    } else {
        return Err(format!("{} links are not supported", link.collection));
    };

    match result {
        Ok(Ok(linked)) => Ok(linked),
        Ok(Err(e)) => Err(format!("Error reading {} {}: {}", link.kind, link.id, e)),
        Err(StoreError::NotFound { .. }) => Err(format!(
            "Corresponding {} not found for ID {}",
            link.kind, link.id
        )),
        Err(e) => Err(format!(
            "Error fetching corresponding {} for ID {}: {}",
            link.kind, link.id, e
        )),
    }
}

/// A linked record's fields without its audit timestamps.
fn linked<R: Record>(record: &R) -> Result<LinkedRecord, AppError> {
    let mut fields = record_fields(record)?;
    fields.remove("created_at");
    fields.remove("updated_at");
    Ok(LinkedRecord {
        fields,
        owners: record.owner_refs(),
    })
}

/// Outcome of a remote call that is nested verbatim as a section.
pub fn section_from<T: Into<Value>>(
    outcome: Outcome<T>,
    collection: &str,
    target: &str,
) -> (Option<Value>, Option<String>) {
    let (data, reason) = outcome.into_parts(collection, target);
    (data.map(Into::into), reason)
}
