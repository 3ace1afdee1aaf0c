//! Work items
//!
//! Offer → claim → complete lifecycle with exclusive, time-boxed leases.

pub mod mongo;
pub mod scheduler;
pub mod store;
pub mod types;

pub use mongo::MongoWorkStore;
pub use scheduler::{spawn_promotion_task, WorkItemScheduler, WorkItemView};
pub use store::{MemoryWorkStore, WorkStore};
pub use types::{ClaimedWorkItem, NewWorkItem, WorkItem, WorkItemLease, WorkItemStatus};
