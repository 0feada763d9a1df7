use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

// Two namespaces so the batch-run guard and the per-date score writer never share a key.
const RUN_LOCK_NAMESPACE: i64 = 0x4E45_5753_5059; // "NEWSPY"
const SCORE_LOCK_NAMESPACE: i64 = 0x5343_4F52_4553; // "SCORES"

fn key_for_date(namespace: i64, date: NaiveDate) -> i64 {
    namespace ^ (date.num_days_from_ce() as i64)
}

/// Session-scoped guard against two batch runs for the same target date.
///
/// The advisory lock belongs to one Postgres session, so the guard keeps the pooled connection
/// that took it checked out until `release`. Dropping the guard without releasing closes that
/// connection, which ends the session and frees the lock.
pub struct RunLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl RunLock {
    /// Returns `None` when another session already holds the lock for `target_date`.
    pub async fn try_acquire(pool: &PgPool, target_date: NaiveDate) -> anyhow::Result<Option<Self>> {
        let key = key_for_date(RUN_LOCK_NAMESPACE, target_date);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to check out a connection for the run lock")?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

        Ok(acquired.then(|| Self { conn: Some(conn), key }))
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Unlocks on the session that took the lock. `Ok(false)` means Postgres did not consider
    /// this session the owner.
    pub async fn release(mut self) -> anyhow::Result<bool> {
        let key = self.key;
        let Some(mut conn) = self.conn.take() else {
            return Ok(false);
        };
        let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(released)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Never hand a connection that still holds the lock back to the pool.
            drop(conn.detach());
        }
    }
}

/// Blocks until no other transaction holds the score lock for `date`; released on commit or
/// rollback.
pub async fn lock_score_date(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    date: NaiveDate,
) -> Result<(), sqlx::Error> {
    let key = key_for_date(SCORE_LOCK_NAMESPACE, date);
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
