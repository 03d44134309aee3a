/// Failure of the persistence layer behind [`NotificationStore`].
///
/// [`NotificationStore`]: crate::store::NotificationStore
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Raised by non-Postgres stores.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A detached sweep task panicked or was aborted.
    #[error("Sweep task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
