//! # Mutation Queue Operations
//!
//! Keyed insert, indexed scans, partial update and delete over the
//! `mutation_queue` table.
//!
//! Scans always return records oldest first (`created_at`, then `id`), so
//! order-sensitive payloads such as consecutive chat messages are replayed
//! in the order they were written.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::client::local_db::{LocalDatabase, Result, StoreError};
use crate::shared::{MutationId, MutationType, QueuedMutation, SyncStatus};

const SELECT_COLUMNS: &str = "SELECT id, mutation_type, payload, created_at, sync_status, \
     retry_count, last_attempt_at, last_error FROM mutation_queue";

/// Partial update of a queued mutation. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPatch {
    pub sync_status: Option<SyncStatus>,
    pub retry_count: Option<u32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl MutationPatch {
    /// Patch that only changes the status
    pub fn status(status: SyncStatus) -> Self {
        Self {
            sync_status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_last_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }

    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Per-status record counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub syncing: usize,
    pub synced: usize,
    pub failed: usize,
    /// Failed records at or above the retry cap
    pub stuck: usize,
}

impl QueueStats {
    /// Records whose intent has not reached the server yet
    pub fn unsynced(&self) -> usize {
        self.pending + self.syncing + self.failed
    }
}

/// Result of a retry scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryBatch {
    /// Decoded records to attempt, oldest first
    pub mutations: Vec<QueuedMutation>,
    /// Ids of rows that failed to decode and were parked at the retry cap
    pub quarantined: Vec<String>,
}

/// What `recover_interrupted` repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `syncing` records reset to `pending`
    pub reset_to_pending: u64,
    /// `synced` records whose grace deletion never ran
    pub purged_synced: u64,
}

impl LocalDatabase {
    /// Insert a new record.
    ///
    /// Fails with `StorageFault` if storage is unavailable or the id is
    /// already present.
    pub async fn put(&self, mutation: &QueuedMutation) -> Result<()> {
        let pool = self.pool().await?;
        let payload = serde_json::to_string(&mutation.payload)?;

        sqlx::query(
            "INSERT INTO mutation_queue
                (id, mutation_type, payload, created_at, sync_status, retry_count, last_attempt_at, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(mutation.id.as_str())
        .bind(mutation.mutation_type.as_str())
        .bind(payload)
        .bind(mutation.created_at.timestamp_millis())
        .bind(mutation.sync_status.as_str())
        .bind(i64::from(mutation.retry_count))
        .bind(mutation.last_attempt_at.map(|at| at.timestamp_millis()))
        .bind(mutation.last_error.as_deref())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Fetch a single record by id.
    pub async fn get(&self, id: &MutationId) -> Result<Option<QueuedMutation>> {
        let pool = self.pool().await?;
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;

        row.as_ref().map(row_to_mutation).transpose()
    }

    /// All records in `status`, oldest first.
    pub async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<QueuedMutation>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(&format!(
            "{} WHERE sync_status = ? ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_mutation).collect()
    }

    /// All records of `mutation_type`, oldest first.
    pub async fn list_by_type(&self, mutation_type: MutationType) -> Result<Vec<QueuedMutation>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(&format!(
            "{} WHERE mutation_type = ? ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(mutation_type.as_str())
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_mutation).collect()
    }

    /// Every record, oldest first.
    pub async fn list_all(&self) -> Result<Vec<QueuedMutation>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(&format!("{} ORDER BY created_at ASC, id ASC", SELECT_COLUMNS))
            .fetch_all(pool)
            .await?;

        rows.iter().map(row_to_mutation).collect()
    }

    /// Records a sync pass should attempt: `pending`, plus `failed` records
    /// still under the retry cap. Oldest first.
    ///
    /// Rows that cannot be decoded do not fail the scan. Each one is logged,
    /// parked as `failed` at the retry cap so it counts as stuck, and
    /// reported in [`RetryBatch::quarantined`].
    pub async fn list_retry_eligible(&self, max_retries: u32) -> Result<RetryBatch> {
        let pool = self.pool().await?;
        let rows = sqlx::query(&format!(
            "{} WHERE sync_status = 'pending'
                OR (sync_status = 'failed' AND retry_count < ?)
             ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(i64::from(max_retries))
        .fetch_all(pool)
        .await?;

        let mut batch = RetryBatch::default();
        for row in &rows {
            match row_to_mutation(row) {
                Ok(mutation) => batch.mutations.push(mutation),
                Err(StoreError::Corrupt { id, message }) => {
                    tracing::error!("Quarantining undecodable queue row {}: {}", id, message);
                    self.quarantine(&id, max_retries, &message).await?;
                    batch.quarantined.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(batch)
    }

    /// Park a row as `failed` at the retry cap, keyed by its raw id.
    async fn quarantine(&self, id: &str, max_retries: u32, reason: &str) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query(
            "UPDATE mutation_queue SET
                sync_status = 'failed',
                retry_count = MAX(retry_count, ?),
                last_error = ?
             WHERE id = ?",
        )
        .bind(i64::from(max_retries))
        .bind(format!("undecodable row: {}", reason))
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Apply a partial update. Fails with `NotFound` if the id is absent.
    pub async fn update(&self, id: &MutationId, patch: MutationPatch) -> Result<()> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE mutation_queue SET
                sync_status = COALESCE(?, sync_status),
                retry_count = COALESCE(?, retry_count),
                last_attempt_at = COALESCE(?, last_attempt_at),
                last_error = COALESCE(?, last_error)
             WHERE id = ?",
        )
        .bind(patch.sync_status.map(|s| s.as_str()))
        .bind(patch.retry_count.map(i64::from))
        .bind(patch.last_attempt_at.map(|at| at.timestamp_millis()))
        .bind(patch.last_error.as_deref())
        .bind(id.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        Ok(())
    }

    /// Delete a record. Deleting an absent id is not an error.
    pub async fn delete(&self, id: &MutationId) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM mutation_queue WHERE id = ?")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Remove every record. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM mutation_queue").execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Records that have not been committed remotely yet.
    pub async fn count_unsynced(&self) -> Result<usize> {
        let pool = self.pool().await?;
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mutation_queue WHERE sync_status != 'synced'")
                .fetch_one(pool)
                .await?;
        Ok(count.0 as usize)
    }

    /// Failed records that have used up their retries.
    pub async fn count_stuck(&self, max_retries: u32) -> Result<usize> {
        let pool = self.pool().await?;
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mutation_queue WHERE sync_status = 'failed' AND retry_count >= ?",
        )
        .bind(i64::from(max_retries))
        .fetch_one(pool)
        .await?;
        Ok(count.0 as usize)
    }

    /// Get queue statistics
    pub async fn stats(&self, max_retries: u32) -> Result<QueueStats> {
        let pool = self.pool().await?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sync_status, COUNT(*) FROM mutation_queue GROUP BY sync_status",
        )
        .fetch_all(pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as usize;
            stats.total += count;
            match status.parse::<SyncStatus>() {
                Ok(SyncStatus::Pending) => stats.pending = count,
                Ok(SyncStatus::Syncing) => stats.syncing = count,
                Ok(SyncStatus::Synced) => stats.synced = count,
                Ok(SyncStatus::Failed) => stats.failed = count,
                Err(e) => return Err(StoreError::corrupt("<status>", e.to_string())),
            }
        }
        stats.stuck = self.count_stuck(max_retries).await?;
        Ok(stats)
    }

    /// Repair records left behind by a process that died mid-pass.
    ///
    /// Only safe before any sync pass has started in this process: `syncing`
    /// rows are reset to `pending` and `synced` rows are deleted.
    pub async fn recover_interrupted(&self) -> Result<RecoveryReport> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let reset = sqlx::query(
            "UPDATE mutation_queue SET sync_status = 'pending' WHERE sync_status = 'syncing'",
        )
        .execute(&mut *tx)
        .await?;
        let purged = sqlx::query("DELETE FROM mutation_queue WHERE sync_status = 'synced'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RecoveryReport {
            reset_to_pending: reset.rows_affected(),
            purged_synced: purged.rows_affected(),
        })
    }
}

fn row_to_mutation(row: &SqliteRow) -> Result<QueuedMutation> {
    let id: String = row.try_get("id")?;
    let mutation_type: String = row.try_get("mutation_type")?;
    let payload: String = row.try_get("payload")?;
    let created_at: i64 = row.try_get("created_at")?;
    let sync_status: String = row.try_get("sync_status")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let last_attempt_at: Option<i64> = row.try_get("last_attempt_at")?;
    let last_error: Option<String> = row.try_get("last_error")?;

    let mutation_type = mutation_type
        .parse::<MutationType>()
        .map_err(|e| StoreError::corrupt(&id, e.to_string()))?;
    let sync_status = sync_status
        .parse::<SyncStatus>()
        .map_err(|e| StoreError::corrupt(&id, e.to_string()))?;
    let created_at = DateTime::from_timestamp_millis(created_at)
        .ok_or_else(|| StoreError::corrupt(&id, "created_at out of range"))?;
    let last_attempt_at = match last_attempt_at {
        Some(ms) => Some(
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| StoreError::corrupt(&id, "last_attempt_at out of range"))?,
        ),
        None => None,
    };
    let retry_count = u32::try_from(retry_count)
        .map_err(|_| StoreError::corrupt(&id, "retry_count out of range"))?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| StoreError::corrupt(&id, format!("payload is not JSON: {}", e)))?;

    Ok(QueuedMutation {
        id: MutationId::from(id),
        mutation_type,
        payload,
        created_at,
        sync_status,
        retry_count,
        last_attempt_at,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mutation_at(mutation_type: MutationType, offset_ms: i64) -> QueuedMutation {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap() + Duration::milliseconds(offset_ms);
        QueuedMutation::new_at(mutation_type, json!({"offset": offset_ms}), at)
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let db = LocalDatabase::in_memory();
        let mutation = mutation_at(MutationType::MaintenanceRequest, 0);

        db.put(&mutation).await.unwrap();
        let stored = db.get(&mutation.id).await.unwrap().unwrap();

        assert_eq!(stored, mutation);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_a_storage_fault() {
        let db = LocalDatabase::in_memory();
        let mutation = mutation_at(MutationType::ChatMessage, 0);

        db.put(&mutation).await.unwrap();
        let err = db.put(&mutation).await.unwrap_err();

        assert_matches!(err, StoreError::StorageFault(_));
    }

    #[tokio::test]
    async fn test_list_by_status_is_oldest_first() {
        let db = LocalDatabase::in_memory();
        let newer = mutation_at(MutationType::ChatMessage, 50);
        let older = mutation_at(MutationType::ChatMessage, 10);
        db.put(&newer).await.unwrap();
        db.put(&older).await.unwrap();

        let pending = db.list_by_status(SyncStatus::Pending).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|m| m.id.clone()).collect();

        assert_eq!(ids, vec![older.id, newer.id]);
        assert!(db.list_by_status(SyncStatus::Failed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_type() {
        let db = LocalDatabase::in_memory();
        db.put(&mutation_at(MutationType::PaymentProof, 0)).await.unwrap();
        db.put(&mutation_at(MutationType::ChatMessage, 1)).await.unwrap();
        db.put(&mutation_at(MutationType::PaymentProof, 2)).await.unwrap();

        let proofs = db.list_by_type(MutationType::PaymentProof).await.unwrap();
        assert_eq!(proofs.len(), 2);
        assert!(proofs.iter().all(|m| m.mutation_type == MutationType::PaymentProof));
    }

    #[tokio::test]
    async fn test_list_retry_eligible_includes_failed_under_cap() {
        let db = LocalDatabase::in_memory();
        let pending = mutation_at(MutationType::ChatMessage, 0);
        let retryable = mutation_at(MutationType::ChatMessage, 1);
        let exhausted = mutation_at(MutationType::ChatMessage, 2);
        let in_flight = mutation_at(MutationType::ChatMessage, 3);
        for m in [&pending, &retryable, &exhausted, &in_flight] {
            db.put(m).await.unwrap();
        }
        db.update(&retryable.id, MutationPatch::status(SyncStatus::Failed).with_retry_count(2))
            .await
            .unwrap();
        db.update(&exhausted.id, MutationPatch::status(SyncStatus::Failed).with_retry_count(3))
            .await
            .unwrap();
        db.update(&in_flight.id, MutationPatch::status(SyncStatus::Syncing))
            .await
            .unwrap();

        let batch = db.list_retry_eligible(3).await.unwrap();
        let ids: Vec<_> = batch.mutations.into_iter().map(|m| m.id).collect();

        assert_eq!(ids, vec![pending.id, retryable.id]);
        assert!(batch.quarantined.is_empty());
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let db = LocalDatabase::in_memory();
        let mutation = mutation_at(MutationType::AnnouncementReadReceipt, 0);
        db.put(&mutation).await.unwrap();

        db.update(
            &mutation.id,
            MutationPatch::status(SyncStatus::Failed)
                .with_retry_count(1)
                .with_last_error("HTTP 503"),
        )
        .await
        .unwrap();
        db.update(&mutation.id, MutationPatch::status(SyncStatus::Syncing))
            .await
            .unwrap();

        let stored = db.get(&mutation.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Syncing);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(stored.payload, mutation.payload);
        assert_eq!(stored.created_at, mutation.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_id_is_not_found() {
        let db = LocalDatabase::in_memory();
        let id = MutationId::from("chat-message_1_abc");

        let err = db
            .update(&id, MutationPatch::status(SyncStatus::Synced))
            .await
            .unwrap_err();

        assert_matches!(err, StoreError::NotFound { id: missing } if missing == id);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = LocalDatabase::in_memory();
        let mutation = mutation_at(MutationType::PaymentProof, 0);
        db.put(&mutation).await.unwrap();

        db.delete(&mutation.id).await.unwrap();
        db.delete(&mutation.id).await.unwrap();

        assert!(db.get(&mutation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let db = LocalDatabase::in_memory();
        for offset in 0..3 {
            db.put(&mutation_at(MutationType::ChatMessage, offset)).await.unwrap();
        }

        assert_eq!(db.clear().await.unwrap(), 3);
        assert_eq!(db.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts_and_stats() {
        let db = LocalDatabase::in_memory();
        let a = mutation_at(MutationType::ChatMessage, 0);
        let b = mutation_at(MutationType::ChatMessage, 1);
        let c = mutation_at(MutationType::ChatMessage, 2);
        for m in [&a, &b, &c] {
            db.put(m).await.unwrap();
        }
        db.update(&b.id, MutationPatch::status(SyncStatus::Synced)).await.unwrap();
        db.update(&c.id, MutationPatch::status(SyncStatus::Failed).with_retry_count(3))
            .await
            .unwrap();

        assert_eq!(db.count_unsynced().await.unwrap(), 2);
        assert_eq!(db.count_stuck(3).await.unwrap(), 1);

        let stats = db.stats(3).await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                total: 3,
                pending: 1,
                syncing: 0,
                synced: 1,
                failed: 1,
                stuck: 1,
            }
        );
        assert_eq!(stats.unsynced(), 2);
    }

    #[tokio::test]
    async fn test_recover_interrupted() {
        let db = LocalDatabase::in_memory();
        let interrupted = mutation_at(MutationType::MaintenanceRequest, 0);
        let committed = mutation_at(MutationType::MaintenanceRequest, 1);
        let untouched = mutation_at(MutationType::MaintenanceRequest, 2);
        for m in [&interrupted, &committed, &untouched] {
            db.put(m).await.unwrap();
        }
        db.update(&interrupted.id, MutationPatch::status(SyncStatus::Syncing))
            .await
            .unwrap();
        db.update(&committed.id, MutationPatch::status(SyncStatus::Synced))
            .await
            .unwrap();

        let report = db.recover_interrupted().await.unwrap();

        assert_eq!(
            report,
            RecoveryReport {
                reset_to_pending: 1,
                purged_synced: 1,
            }
        );
        assert_eq!(db.list_by_status(SyncStatus::Pending).await.unwrap().len(), 2);
        assert!(db.get(&committed.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_type_row_is_reported_as_corrupt() {
        let db = LocalDatabase::in_memory();
        let pool = db.pool().await.unwrap();
        sqlx::query(
            "INSERT INTO mutation_queue (id, mutation_type, payload, created_at, sync_status, retry_count)
             VALUES ('lease-renewal_1_abc', 'lease-renewal', '{}', 1, 'pending', 0)",
        )
        .execute(pool)
        .await
        .unwrap();

        let err = db.list_by_status(SyncStatus::Pending).await.unwrap_err();
        assert_matches!(err, StoreError::Corrupt { id, .. } if id == "lease-renewal_1_abc");
    }

    #[tokio::test]
    async fn test_undecodable_rows_are_quarantined_not_fatal() {
        let db = LocalDatabase::in_memory();
        let valid = mutation_at(MutationType::PaymentProof, 10);
        db.put(&valid).await.unwrap();
        let pool = db.pool().await.unwrap();
        sqlx::query(
            "INSERT INTO mutation_queue (id, mutation_type, payload, created_at, sync_status, retry_count)
             VALUES ('lease-renewal_1_abc', 'lease-renewal', '{}', 1, 'pending', 0),
                    ('chat-message_2_abc', 'chat-message', 'not json', 2, 'pending', 0)",
        )
        .execute(pool)
        .await
        .unwrap();

        let batch = db.list_retry_eligible(3).await.unwrap();

        assert_eq!(batch.mutations, vec![valid.clone()]);
        assert_eq!(
            batch.quarantined,
            vec!["lease-renewal_1_abc".to_string(), "chat-message_2_abc".to_string()]
        );
        assert_eq!(db.count_stuck(3).await.unwrap(), 2);

        let again = db.list_retry_eligible(3).await.unwrap();
        assert_eq!(again.mutations, vec![valid]);
        assert!(again.quarantined.is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let mutation = mutation_at(MutationType::PaymentProof, 0);

        let db = LocalDatabase::open(&path);
        db.put(&mutation).await.unwrap();
        db.close().await;

        let reopened = LocalDatabase::open(&path);
        assert_eq!(reopened.get(&mutation.id).await.unwrap(), Some(mutation));
    }
}
