//! Storage failure taxonomy (spec.md §4.6: "Read failures fail-open").

/// A failure reading or writing the blacklist/request-log stores.
///
/// Callers in [`crate::quota`] and [`crate::blacklist`] treat every variant
/// as fail-open: a storage outage must never block traffic.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing store could not be reached.
    #[error("storage connection error: {0}")]
    Connection(String),
    /// The store was reached but the query/write failed.
    #[error("storage query error: {0}")]
    Query(String),
    /// Any other unexpected storage failure.
    #[error("internal storage error: {0}")]
    Internal(String),
}
