//! Best-effort replication between peers.
//!
//! [`engine::GossipEngine`] runs the periodic randomized anti-entropy
//! loop; [`sync::SyncCoordinator`] serves the request-scoped
//! "catch this room up now" path. Both admit received messages through
//! the node's idempotent admission path and both absorb peer failures:
//! an unreachable peer is skipped, never evicted, and never fails a
//! user-facing call.

pub mod client;
pub mod engine;
pub mod sync;

pub use client::PeerClient;
pub use engine::{ExchangeOutcome, GossipConfig, GossipEngine};
pub use sync::{SyncCoordinator, SyncReport};
