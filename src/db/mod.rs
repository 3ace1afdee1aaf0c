//! Database layer
//!
//! MongoDB connection management and document schemas.

pub mod mongo;
pub mod schemas;

pub use mongo::{is_contention, IntoIndexes, MongoClient};
