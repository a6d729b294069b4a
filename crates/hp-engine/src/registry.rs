//! EndpointRegistry - shared map of delivery address to endpoint state
//!
//! The provisioner inserts, a dispatch loop removes its own key, and the
//! supervisor flips `loop_active` once per entry when it launches a loop.
//! Backed by a `DashMap`, so concurrent insert/remove/iterate needs no
//! external locking. Persisting the address list is the one serialized
//! operation, see [`crate::persistence::persist`].

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hp_common::Endpoint;

/// Result of [`EndpointRegistry::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// Address already tracked; existing state kept
    Existing,
}

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    entries: DashMap<String, Endpoint>,
    persist_gate: tokio::sync::Mutex<()>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert when absent. An existing entry keeps its `loop_active` flag;
    /// only its channel is refreshed.
    pub fn upsert(&self, endpoint: Endpoint) -> Upsert {
        match self.entries.entry(endpoint.address.clone()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get_mut();
                if current.channel_id != endpoint.channel_id {
                    current.channel_id = endpoint.channel_id;
                }
                Upsert::Existing
            }
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Upsert::Inserted
            }
        }
    }

    /// Remove an entry. Removing an absent address is a no-op.
    pub fn remove(&self, address: &str) -> Option<Endpoint> {
        self.entries.remove(address).map(|(_, endpoint)| endpoint)
    }

    /// Point-in-time list of addresses. May be stale by the mutations that
    /// race with the iteration.
    pub fn snapshot_addresses(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn entries_without_running_loop(&self) -> Vec<Endpoint> {
        self.entries
            .iter()
            .filter(|e| !e.value().loop_active)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Mark the entry as owned by a loop. Returns false when the entry is
    /// gone or already claimed.
    pub fn try_claim(&self, address: &str) -> bool {
        match self.entries.get_mut(address) {
            Some(mut entry) if !entry.loop_active => {
                entry.loop_active = true;
                true
            }
            _ => false,
        }
    }

    /// Clear `loop_active` if the entry still exists.
    pub fn release(&self, address: &str) -> bool {
        match self.entries.get_mut(address) {
            Some(mut entry) => {
                entry.loop_active = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<Endpoint> {
        self.entries.get(address).map(|e| e.value().clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn count_for_channel(&self, channel_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().channel_id == channel_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Held across snapshot and write, so the last persist to finish always
    /// carries the newest snapshot.
    pub(crate) fn persist_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.persist_gate
    }
}
