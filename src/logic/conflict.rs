use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::IntervalResource;

/// Half-open intervals `[start, end)` overlap iff each starts before the other ends.
/// Touching endpoints do not overlap.
pub fn overlaps(a: (DateTime<Utc>, DateTime<Utc>), b: (DateTime<Utc>, DateTime<Utc>)) -> bool {
    a.0 < b.1 && a.1 > b.0
}

/// First active interval of the same owner that overlaps `candidate`, ignoring
/// `candidate` itself so a reschedule does not collide with its old slot.
pub fn find_conflict<'a, R: IntervalResource>(existing: &'a [R], candidate: &R) -> Option<&'a R> {
    existing.iter().find(|other| {
        other.id() != candidate.id()
            && other.is_active()
            && other.schedule_owner() == candidate.schedule_owner()
            && overlaps(other.interval(), candidate.interval())
    })
}

/// Serializes scan-then-write per schedule owner.
///
/// Only guards writers inside this process; two instances sharing one database can
/// still race.
#[derive(Debug, Default)]
pub struct ConflictGuard {
    owners: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConflictGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `owner`'s schedule.
    pub async fn lock_owner(&self, owner: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut owners = self.owners.lock();
            // Drop locks nobody holds or waits on.
            owners.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(owners.entry(owner.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
