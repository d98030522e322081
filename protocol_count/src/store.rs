//! Capabilities consumed by the counting core, and in-memory implementations of them.
//!
//! The persistence layer, the ward reference data and the authentication provider live
//! outside of this crate. The core only talks to them through the traits below.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use log::debug;
use snafu::prelude::*;

use crate::config::*;

/// Keyed access to the protocol records.
pub trait ProtocolStore: Send + Sync {
    /// All the protocols submitted for this ballot, in no particular order.
    fn find_by_ballot(&self, ballot: &Ballot) -> Vec<Protocol>;

    fn find_by_id(&self, id: &ProtocolId) -> Option<Protocol>;

    /// Up to `count` protocols that have not been verified yet, oldest first.
    fn find_not_verified(&self, count: usize) -> Vec<Protocol>;

    /// Stores a new protocol. Fails if the id is already taken.
    fn insert(&self, protocol: Protocol) -> CountingResult<Protocol>;

    /// Replaces a stored protocol if nobody wrote it since `expected_revision` was read.
    ///
    /// Returns the stored record, with its revision bumped.
    fn compare_and_swap(
        &self,
        protocol: Protocol,
        expected_revision: u64,
    ) -> CountingResult<Protocol>;
}

/// Geo-queryable ward reference data.
pub trait WardStore: Send + Sync {
    /// The wards open for the voting held on this date.
    fn wards(&self, voting_date: NaiveDate) -> Vec<Ward>;
}

/// The identity of the caller, as resolved by the authentication provider.
pub trait ActorIdentity {
    /// None if the caller is not authenticated.
    fn actor_id(&self) -> Option<ActorId>;
}

pub struct Anonymous;

impl ActorIdentity for Anonymous {
    fn actor_id(&self) -> Option<ActorId> {
        None
    }
}

pub struct KnownActor(pub ActorId);

impl ActorIdentity for KnownActor {
    fn actor_id(&self) -> Option<ActorId> {
        Some(self.0.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryProtocolStore {
    records: RwLock<HashMap<ProtocolId, Protocol>>,
}

impl MemoryProtocolStore {
    pub fn new() -> MemoryProtocolStore {
        MemoryProtocolStore::default()
    }

    /// Fails if two protocols share an id.
    pub fn from_protocols(protocols: Vec<Protocol>) -> CountingResult<MemoryProtocolStore> {
        let mut records: HashMap<ProtocolId, Protocol> = HashMap::with_capacity(protocols.len());
        for p in protocols {
            ensure!(
                !records.contains_key(&p.id),
                InvalidArgumentSnafu {
                    reason: format!("protocol {} is stored twice", p.id)
                }
            );
            records.insert(p.id, p);
        }
        Ok(MemoryProtocolStore {
            records: RwLock::new(records),
        })
    }

    /// All the records, ordered by creation time then id.
    pub fn snapshot(&self) -> Vec<Protocol> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut res: Vec<Protocol> = records.values().cloned().collect();
        res.sort_by(|a, b| {
            a.creation_time
                .cmp(&b.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        res
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProtocolStore for MemoryProtocolStore {
    fn find_by_ballot(&self, ballot: &Ballot) -> Vec<Protocol> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .values()
            .filter(|p| p.ballot == *ballot)
            .cloned()
            .collect()
    }

    fn find_by_id(&self, id: &ProtocolId) -> Option<Protocol> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(id).cloned()
    }

    fn find_not_verified(&self, count: usize) -> Vec<Protocol> {
        let mut res: Vec<Protocol> = self.snapshot().into_iter().filter(|p| !p.verified).collect();
        res.truncate(count);
        res
    }

    fn insert(&self, protocol: Protocol) -> CountingResult<Protocol> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        ensure!(
            !records.contains_key(&protocol.id),
            InvalidArgumentSnafu {
                reason: format!("protocol {} already exists", protocol.id)
            }
        );
        debug!("insert: protocol {} for ward {}", protocol.id, protocol.ward);
        records.insert(protocol.id, protocol.clone());
        Ok(protocol)
    }

    fn compare_and_swap(
        &self,
        protocol: Protocol,
        expected_revision: u64,
    ) -> CountingResult<Protocol> {
        // The write lock is held for the whole check-then-write.
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let stored = records.get_mut(&protocol.id).context(NotFoundSnafu {
            entity: "protocol",
            key: protocol.id.to_string(),
        })?;
        ensure!(
            stored.revision == expected_revision,
            ConflictSnafu {
                id: protocol.id,
                expected: expected_revision,
                found: stored.revision,
            }
        );
        let mut updated = protocol;
        updated.revision = expected_revision + 1;
        *stored = updated.clone();
        debug!(
            "compare_and_swap: protocol {} now at revision {}",
            updated.id, updated.revision
        );
        Ok(updated)
    }
}

/// Ward reference data held in memory.
///
/// Wards may be registered for a specific voting date. Dates without their own list fall
/// back to the default list.
#[derive(Debug, Default, Clone)]
pub struct MemoryWardStore {
    by_date: HashMap<NaiveDate, Vec<Ward>>,
    default_wards: Vec<Ward>,
}

impl MemoryWardStore {
    pub fn new(default_wards: Vec<Ward>) -> MemoryWardStore {
        MemoryWardStore {
            by_date: HashMap::new(),
            default_wards,
        }
    }

    pub fn with_date(mut self, voting_date: NaiveDate, wards: Vec<Ward>) -> MemoryWardStore {
        self.by_date.insert(voting_date, wards);
        self
    }
}

impl WardStore for MemoryWardStore {
    fn wards(&self, voting_date: NaiveDate) -> Vec<Ward> {
        self.by_date
            .get(&voting_date)
            .unwrap_or(&self.default_wards)
            .clone()
    }
}
