// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-entity leases serializing mutations.
//!
//! The manager keeps one fair mutex per `(kind, id)` pair. Fair unlocking
//! hands the mutex to the longest-waiting thread, so mutations against one
//! entity apply strictly first-come-first-served. A [`Lease`] releases on
//! drop, which covers every exit path: success, validation failure, and
//! unwinding.
//!
//! Operations touching a customer and an invoice must acquire the customer
//! lease first; the fixed order keeps the lock graph cycle-free.

use crate::error::BillingError;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{FairMutex, RawFairMutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Kinds of lockable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Customer,
    Invoice,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Customer => "customer",
            Self::Invoice => "invoice",
        };
        write!(f, "{name}")
    }
}

/// Exclusive grant on one entity id, held for the duration of one mutating
/// operation. Dropping the lease releases the entity.
pub struct Lease {
    kind: EntityKind,
    id: Uuid,
    _guard: ArcMutexGuard<RawFairMutex, ()>,
}

impl Lease {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        tracing::debug!(kind = %self.kind, id = %self.id, "lease released");
    }
}

/// Registry of per-entity fair mutexes.
///
/// Mutexes are created on first use and kept for the life of the manager;
/// the set of entity ids a process touches is bounded by its working set.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<(EntityKind, Uuid), Arc<FairMutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lease for `(kind, id)`, waiting at most
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::LockTimeout`] when the lease is not granted
    /// within the bound. The wait queue slot is given up on timeout, so an
    /// abandoned caller never blocks later ones.
    pub fn acquire(
        &self,
        kind: EntityKind,
        id: Uuid,
        timeout: Duration,
    ) -> Result<Lease, BillingError> {
        let mutex = self
            .locks
            .entry((kind, id))
            .or_insert_with(|| Arc::new(FairMutex::new(())))
            .clone();
        // The map entry guard is gone by now; only the mutex itself blocks.
        let guard = mutex
            .try_lock_arc_for(timeout)
            .ok_or_else(|| BillingError::LockTimeout(format!("{kind}:{id}")))?;
        tracing::debug!(%kind, %id, "lease acquired");
        Ok(Lease {
            kind,
            id,
            _guard: guard,
        })
    }

    /// Whether the entity currently has an outstanding lease.
    pub fn is_locked(&self, kind: EntityKind, id: Uuid) -> bool {
        self.locks
            .get(&(kind, id))
            .is_some_and(|entry| entry.is_locked())
    }
}
