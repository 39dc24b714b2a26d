//! Subscriber registry.
//!
//! Maps each room to the set of subscribers currently listening to it. This
//! is the only shared mutable state of the live-update core; sessions add and
//! remove themselves, the broadcaster reads snapshots.
//!
//! Rooms live in a [`DashMap`], so operations on rooms in different shards
//! never contend. Every operation holds its shard guard for the map access
//! alone and never across an await point.

use crate::room::RoomId;
use crate::subscriber::{Subscriber, SubscriberId};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Whether to drop a room's entry as soon as its last subscriber leaves.
    pub prune_empty_rooms: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prune_empty_rooms: true,
        }
    }
}

/// Room to subscriber bookkeeping.
pub struct Registry {
    rooms: DashMap<RoomId, HashMap<SubscriberId, Subscriber>>,
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    /// Add a subscriber to a room.
    ///
    /// Registering an already present subscriber replaces its entry, so a
    /// handle is never listed twice.
    pub fn register(&self, room_id: &RoomId, subscriber: Subscriber) {
        let subscriber_id = subscriber.id();
        let connection_id = *subscriber.connection_id();

        let count = {
            let mut room = self.rooms.entry(*room_id).or_insert_with(|| {
                debug!(room = %room_id, "Creating room entry");
                HashMap::new()
            });
            room.insert(subscriber_id, subscriber);
            room.len()
        };

        debug!(
            room = %room_id,
            subscriber = %subscriber_id,
            connection = %connection_id,
            subscribers = count,
            "Registered subscriber"
        );
    }

    /// Remove a subscriber from a room.
    ///
    /// Returns `true` if the subscriber was registered. Removing an absent
    /// subscriber is a no-op: eviction and a client-initiated close may both
    /// try to remove the same entry.
    pub fn unregister(&self, room_id: &RoomId, subscriber_id: SubscriberId) -> bool {
        let (removed, now_empty) = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                let removed = room.remove(&subscriber_id).is_some();
                (removed, room.is_empty())
            }
            None => (false, false),
        };

        if removed {
            debug!(room = %room_id, subscriber = %subscriber_id, "Unregistered subscriber");
        } else {
            trace!(room = %room_id, subscriber = %subscriber_id, "Subscriber already gone");
        }

        // The guard above is released; re-check emptiness under the shard lock
        // since a register may have slipped in between.
        if now_empty
            && self.config.prune_empty_rooms
            && self
                .rooms
                .remove_if(room_id, |_, room| room.is_empty())
                .is_some()
        {
            debug!(room = %room_id, "Pruned empty room");
        }

        removed
    }

    /// Point-in-time copy of a room's subscribers.
    ///
    /// Unknown and empty rooms yield an empty vector.
    #[must_use]
    pub fn snapshot(&self, room_id: &RoomId) -> Vec<Subscriber> {
        self.rooms
            .get(room_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a subscriber is registered for a room.
    #[must_use]
    pub fn contains(&self, room_id: &RoomId, subscriber_id: SubscriberId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.contains_key(&subscriber_id))
    }

    /// Get the subscriber count for a room.
    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map(|room| room.len()).unwrap_or(0)
    }

    /// Get the IDs of all rooms with an entry.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| *entry.key()).collect()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            subscriber_count: self.rooms.iter().map(|room| room.len()).sum(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of room entries.
    pub room_count: usize,
    /// Number of registered subscribers across all rooms.
    pub subscriber_count: usize,
}
