use crate::domain::entity::{CanonicalKey, ProviderId};
use crate::domain::observation::{Field, FieldObservation, FieldReading, FieldValue};
use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct ObservationLog {
    next_seq: u64,
    by_field: HashMap<(CanonicalKey, Field), Vec<FieldObservation>>,
}

/// Append-only observation log with per-field freshness queries.
///
/// Nothing is ever removed; `latest` is a pure read.
#[derive(Debug)]
pub struct FreshnessTracker {
    priority: Vec<ProviderId>,
    log: RwLock<ObservationLog>,
}

impl FreshnessTracker {
    /// `priority` breaks timestamp ties: earlier providers win.
    pub fn new(priority: Vec<ProviderId>) -> Self {
        Self {
            priority,
            log: RwLock::new(ObservationLog::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ObservationLog> {
        self.log.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObservationLog> {
        self.log.write().unwrap_or_else(|p| p.into_inner())
    }

    fn rank(&self, provider: &ProviderId) -> usize {
        self.priority
            .iter()
            .position(|p| p == provider)
            .unwrap_or(self.priority.len())
    }

    pub fn record(
        &self,
        entity: &CanonicalKey,
        field: Field,
        value: FieldValue,
        source: &ProviderId,
        fetched_at: DateTime<Utc>,
    ) -> Result<FieldObservation, CoreError> {
        if value.kind() != field.kind() {
            return Err(CoreError::InvalidRequest(format!(
                "{source} sent a {:?} value for {field}, expected {:?}",
                value.kind(),
                field.kind()
            )));
        }
        if let FieldValue::Number(n) = &value {
            if !n.is_finite() {
                return Err(CoreError::InvalidRequest(format!(
                    "{source} sent a non-finite value for {field}"
                )));
            }
        }

        let mut log = self.write();
        let seq = log.next_seq;
        log.next_seq += 1;

        let observation = FieldObservation {
            seq,
            entity: entity.clone(),
            field,
            value,
            source: source.clone(),
            fetched_at,
        };
        log.by_field
            .entry((entity.clone(), field))
            .or_default()
            .push(observation.clone());
        Ok(observation)
    }

    /// Newest observation at or before `as_of`, flagged stale when older than `max_age`.
    ///
    /// Identical timestamps resolve by provider priority, then by recording order.
    pub fn latest(
        &self,
        entity: &CanonicalKey,
        field: Field,
        as_of: DateTime<Utc>,
        max_age: Duration,
    ) -> FieldReading {
        let log = self.read();
        let Some(observations) = log.by_field.get(&(entity.clone(), field)) else {
            return FieldReading::Missing;
        };

        let best = observations
            .iter()
            .filter(|o| o.fetched_at <= as_of)
            .max_by(|a, b| self.compare(a, b));

        match best {
            Some(o) => FieldReading::Observed {
                observation: o.clone(),
                stale: as_of - o.fetched_at > max_age,
            },
            None => FieldReading::Missing,
        }
    }

    fn compare(&self, a: &FieldObservation, b: &FieldObservation) -> Ordering {
        let key = |o: &FieldObservation| {
            (o.fetched_at, Reverse(self.rank(&o.source)), Reverse(o.seq))
        };
        key(a).cmp(&key(b))
    }

    /// Full audit trail for one field, in recording order.
    pub fn history(&self, entity: &CanonicalKey, field: Field) -> Vec<FieldObservation> {
        self.read()
            .by_field
            .get(&(entity.clone(), field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().by_field.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
