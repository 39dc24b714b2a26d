//! Shared fixtures for the AMA benchmarks.

use ama_core::{Registry, RoomId, Subscriber};
use ama_transport::{MemoryConnection, MemoryPeer};

/// Register `count` in-memory subscribers to `room`.
///
/// The peers must be kept alive, otherwise every send fails and the
/// subscribers are evicted on the first broadcast.
pub fn populate(registry: &Registry, room: &RoomId, count: usize) -> Vec<MemoryPeer> {
    (0..count)
        .map(|_| {
            let (conn, peer) = MemoryConnection::pair();
            registry.register(room, Subscriber::new(conn));
            peer
        })
        .collect()
}

/// Drop everything the peers have received so far.
pub fn drain(peers: &mut [MemoryPeer]) {
    for peer in peers {
        peer.drain();
    }
}
