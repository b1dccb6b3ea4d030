//! Cache store error types

/// Errors from the persistent map index.
///
/// A malformed row is not an error: `MapStore::load` treats it as an
/// absent entry. This type covers the cases where the store itself is
/// unusable, which are fatal for the whole request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite database could not be opened or queried.
    #[error("database error: {0}")]
    Sqlite(#[from] async_sqlite::Error),
}
