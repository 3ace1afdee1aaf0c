//! MongoDB client wrapper
//!
//! Thin layer over the driver: connection with a bounded server-selection
//! timeout, typed collections with schema-declared indexes, and error
//! classification for the unique-constraint and transaction-conflict cases
//! the lease and sequence logic depend on.

use bson::{doc, Document};
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR},
    options::IndexOptions,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::types::AgoraError;

/// Duplicate key on a unique index
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Concurrent transactions touched the same document
pub const WRITE_CONFLICT_CODE: i32 = 112;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Unique index options helper
pub fn unique() -> Option<IndexOptions> {
    Some(IndexOptions::builder().unique(true).build())
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, AgoraError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| AgoraError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AgoraError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying the schema's indexes
    pub async fn collection<T>(&self, name: &str) -> Result<Collection<T>, AgoraError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let collection = self.client.database(&self.db_name).collection::<T>(name);

        let indices: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if !indices.is_empty() {
            collection
                .create_indexes(indices)
                .await
                .map_err(|e| AgoraError::Database(format!("Failed to create indexes on {}: {}", name, e)))?;
        }

        Ok(collection)
    }

    /// Start a session with an open transaction
    pub async fn begin(&self) -> Result<ClientSession, AgoraError> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    /// Liveness check used by the readiness probe
    pub async fn ping(&self) -> bool {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Server error code carried by a driver error, if any
pub fn error_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        ErrorKind::Command(command_error) => Some(command_error.code),
        _ => None,
    }
}

/// Whether the error means another writer got there first.
///
/// Covers both the unique index (lease table) and transaction write
/// conflicts, which is how a second concurrent claim surfaces when both
/// run inside transactions.
pub fn is_contention(err: &MongoError) -> bool {
    matches!(error_code(err), Some(DUPLICATE_KEY_CODE) | Some(WRITE_CONFLICT_CODE))
        || err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

/// Abort a transaction, ignoring failures (the session is discarded anyway)
pub async fn abort(mut session: ClientSession) {
    let _ = session.abort_transaction().await;
}
