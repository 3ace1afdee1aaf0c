//! Run events
//!
//! Ordered per-run event log with live fan-out:
//! - `store`: sequence allocation contract and in-memory backend
//! - `mongo`: MongoDB backend
//! - `broker`: process-local subscriber registry
//! - `log`: append/replay service tying store and broker together
//! - `stream`: SSE framing with backfill and keepalive

pub mod broker;
pub mod log;
pub mod mongo;
pub mod store;
pub mod stream;
pub mod types;

pub use broker::{EventBroker, Subscription};
pub use log::{ReplayPage, RunEventLog};
pub use mongo::MongoEventStore;
pub use store::{EventStore, MemoryEventStore};
pub use stream::{open_stream, StreamSettings};
pub use types::{EventKind, NewRunEvent, RunEvent};
