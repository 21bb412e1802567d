#![forbid(unsafe_code)]

//! Dependency snapshots and change evaluation.
//!
//! A [`DependencyMap`] records, per owner identity, the value and value
//! version observed for each key read during one run. It is rebuilt from
//! scratch on every run; keys read on a branch not taken this time must not
//! linger.
//!
//! # Change evaluation
//!
//! For every tracked `(owner, key, snapshot)` the live value is peeked:
//!
//! 1. If the live value is an owner that is itself tracked, and it is the
//!    same owner that was read, its own keys are evaluated instead of its
//!    version. A parent's version moves whenever any descendant changes, so
//!    comparing it would report changes in siblings nobody read.
//! 2. Otherwise the live and snapshot values are compared by identity.
//! 3. Otherwise, if both sides carry a version, the versions are compared.
//!    This catches in-place mutation of an untracked nested container.
//!
//! Evaluation is existential and stops at the first change. Each owner is
//! visited at most once per pass, which bounds the work on cyclic graphs.

use std::fmt;

use ahash::{AHashMap, AHashSet};

use crate::owner::{OwnerId, OwnerRef};
use crate::value::{Key, Value};

/// The value and value version observed for one key.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub value: Value,
    pub version: Option<u64>,
}

impl Snapshot {
    fn capture(value: &Value) -> Self {
        Self {
            value: value.clone(),
            version: value.version(),
        }
    }
}

struct TrackedOwner {
    owner: OwnerRef,
    keys: AHashMap<Key, Snapshot>,
}

/// Per-run record of every `(owner, key)` read.
#[derive(Default)]
pub struct DependencyMap {
    owners: AHashMap<OwnerId, TrackedOwner>,
}

impl DependencyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read. A later read of the same key overwrites the earlier
    /// snapshot.
    pub fn record(&mut self, owner: &OwnerRef, key: &Key, value: &Value) {
        self.owners
            .entry(owner.owner_id())
            .or_insert_with(|| TrackedOwner {
                owner: OwnerRef::clone(owner),
                keys: AHashMap::new(),
            })
            .keys
            .insert(key.clone(), Snapshot::capture(value));
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of distinct owners touched.
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Number of distinct `(owner, key)` pairs touched.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.owners.values().map(|tracked| tracked.keys.len()).sum()
    }

    #[must_use]
    pub fn contains_owner(&self, id: OwnerId) -> bool {
        self.owners.contains_key(&id)
    }

    #[must_use]
    pub fn snapshot(&self, id: OwnerId, key: &Key) -> Option<&Snapshot> {
        self.owners.get(&id)?.keys.get(key)
    }

    /// Touched owners, in no particular order.
    pub fn owners(&self) -> impl Iterator<Item = &OwnerRef> + '_ {
        self.owners.values().map(|tracked| &tracked.owner)
    }

    /// Whether any tracked dependency differs from its snapshot.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        let mut visited = AHashSet::with_capacity(self.owners.len());
        self.owners
            .iter()
            .any(|(id, tracked)| self.owner_changed(*id, tracked, &mut visited))
    }

    fn owner_changed(
        &self,
        id: OwnerId,
        tracked: &TrackedOwner,
        visited: &mut AHashSet<OwnerId>,
    ) -> bool {
        if !visited.insert(id) {
            return false;
        }
        for (key, snapshot) in &tracked.keys {
            let current = tracked.owner.peek(key);
            if !current.same_value(&snapshot.value) {
                return true;
            }
            if let Some(nested) = current.as_owner() {
                let nested_id = nested.owner_id();
                if let Some(nested_tracked) = self.owners.get(&nested_id) {
                    if self.owner_changed(nested_id, nested_tracked, visited) {
                        return true;
                    }
                    continue;
                }
            }
            if let (Some(now), Some(then)) = (current.version(), snapshot.version)
                && now != then
            {
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for DependencyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (id, tracked) in &self.owners {
            map.entry(id, &tracked.keys);
        }
        map.finish()
    }
}
