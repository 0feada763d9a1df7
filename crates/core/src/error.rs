use thiserror::Error;

/// Storage failures, classified by what the caller should do about them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock or serialization conflict. Safe to retry.
    #[error("storage contention: {0}")]
    Contention(String),

    /// The store cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Contention(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };

        // serialization_failure, deadlock_detected, lock_not_available
        if matches!(code.as_deref(), Some("40001" | "40P01" | "55P03")) {
            return StoreError::Contention(err.to_string());
        }

        match err {
            e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Other(anyhow::Error::new(other)),
        }
    }
}

/// Errors surfaced by the read/trigger surface.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(StoreError::Contention("40001".into()).is_retryable());
        assert!(!StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::Other(anyhow::anyhow!("boom")).is_retryable());
    }

    #[test]
    fn pool_timeout_maps_to_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
