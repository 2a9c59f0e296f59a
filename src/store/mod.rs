use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::controllers::black_start::BlackStartEvent;
use crate::domain::{Action, ControllerDecision, TelemetrySnapshot};
use crate::error::{EdgeError, EdgeResult};

const CREATE_TABLES: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;

CREATE TABLE IF NOT EXISTS telemetry (
    timestamp TEXT PRIMARY KEY,
    soc REAL NOT NULL,
    soh REAL NOT NULL,
    voltage REAL NOT NULL,
    current REAL NOT NULL,
    power_kw REAL NOT NULL,
    temp_min REAL NOT NULL,
    temp_max REAL NOT NULL,
    temp_avg REAL NOT NULL,
    frequency REAL NOT NULL,
    grid_voltage REAL NOT NULL,
    cell_voltage_min REAL NOT NULL,
    cell_voltage_max REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    timestamp TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    power_kw REAL NOT NULL,
    duration_min REAL,
    priority TEXT NOT NULL,
    reason TEXT NOT NULL,
    confidence REAL NOT NULL,
    mode TEXT
);

CREATE TABLE IF NOT EXISTS alarms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    severity TEXT NOT NULL,
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT,
    acknowledged INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    payload TEXT NOT NULL,
    qos INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    sent INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_telemetry_ts ON telemetry(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_decisions_ts ON decisions(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_alarms_ts ON alarms(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_sync_queue_pending ON sync_queue(sent, created_at);
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub alarm_type: String,
    pub message: String,
    pub metadata: Option<String>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueRow {
    pub id: i64,
    pub topic: String,
    pub payload: String,
    pub qos: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub telemetry_hours: i64,
    pub decisions_days: i64,
    pub alarms_days: i64,
    pub sync_queue_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            telemetry_hours: 72,
            decisions_days: 30,
            alarms_days: 30,
            sync_queue_days: 7,
        }
    }
}

/// Append-only, WAL-journaled local store. Every write is a plain
/// insert; retention sweeps are the only deletes.
pub struct DurableStore {
    pool: SqlitePool,
}

impl DurableStore {
    pub async fn connect(path: &str) -> EdgeResult<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        sqlx::query(CREATE_TABLES)
            .execute(&pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn append_telemetry(&self, snap: &TelemetrySnapshot) -> EdgeResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO telemetry \
             (timestamp, soc, soh, voltage, current, power_kw, temp_min, temp_max, temp_avg, \
              frequency, grid_voltage, cell_voltage_min, cell_voltage_max) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snap.timestamp.to_rfc3339())
        .bind(snap.soc_percent)
        .bind(snap.soh_percent)
        .bind(snap.pack_voltage_v)
        .bind(snap.pack_current_a)
        .bind(snap.active_power_kw)
        .bind(snap.cell_temp_min_c)
        .bind(snap.cell_temp_max_c)
        .bind(snap.cell_temp_avg_c)
        .bind(snap.grid_frequency_hz)
        .bind(snap.grid_voltage_v)
        .bind(snap.cell_voltage_min_v)
        .bind(snap.cell_voltage_max_v)
        .execute(&self.pool)
        .await
        .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    pub async fn append_decision(
        &self,
        timestamp: DateTime<Utc>,
        decision: &ControllerDecision,
    ) -> EdgeResult<()> {
        let action = match decision.action {
            Action::Charge => "CHARGE",
            Action::Discharge => "DISCHARGE",
            Action::Idle => "IDLE",
        };
        sqlx::query(
            "INSERT OR REPLACE INTO decisions \
             (timestamp, action, power_kw, priority, reason, confidence) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(timestamp.to_rfc3339())
        .bind(action)
        .bind(decision.power_kw)
        .bind(decision.layer.to_string())
        .bind(&decision.reason)
        .bind(decision.confidence)
        .execute(&self.pool)
        .await
        .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    pub async fn append_alarm(
        &self,
        timestamp: DateTime<Utc>,
        severity: &str,
        alarm_type: &str,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> EdgeResult<()> {
        sqlx::query(
            "INSERT INTO alarms (timestamp, severity, type, message, metadata) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(timestamp.to_rfc3339())
        .bind(severity)
        .bind(alarm_type)
        .bind(message)
        .bind(metadata.map(|m| m.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    pub async fn append_black_start_event(&self, event: &BlackStartEvent) -> EdgeResult<()> {
        self.append_alarm(
            event.timestamp,
            "info",
            &event.kind,
            &event.kind,
            Some(event.detail.clone()),
        )
        .await
    }

    pub async fn enqueue_sync(
        &self,
        topic: &str,
        payload: &str,
        qos: i64,
        created_at: DateTime<Utc>,
    ) -> EdgeResult<()> {
        sqlx::query(
            "INSERT INTO sync_queue (topic, payload, qos, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(topic)
        .bind(payload)
        .bind(qos)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    pub async fn fetch_pending_sync(&self, limit: i64) -> EdgeResult<Vec<SyncQueueRow>> {
        let rows = sqlx::query(
            "SELECT id, topic, payload, qos, created_at FROM sync_queue \
             WHERE sent = 0 ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;

        rows.into_iter()
            .map(|row: SqliteRow| {
                let created_at: String = row.try_get("created_at").map_err(store_err)?;
                Ok(SyncQueueRow {
                    id: row.try_get("id").map_err(store_err)?,
                    topic: row.try_get("topic").map_err(store_err)?,
                    payload: row.try_get("payload").map_err(store_err)?,
                    qos: row.try_get("qos").map_err(store_err)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| EdgeError::SchemaMismatch(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    pub async fn mark_synced(&self, ids: &[i64]) -> EdgeResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!("UPDATE sync_queue SET sent = 1 WHERE id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(id);
        }
        q.execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    /// Deletes rows outside the retention window for each table, then
    /// checkpoints the WAL so disk usage reflects the sweep immediately.
    pub async fn retention_sweep(&self, policy: RetentionPolicy) -> EdgeResult<()> {
        let now = Utc::now();
        let telemetry_cutoff = now - Duration::hours(policy.telemetry_hours);
        let decisions_cutoff = now - Duration::days(policy.decisions_days);
        let alarms_cutoff = now - Duration::days(policy.alarms_days);
        let sync_cutoff = now - Duration::days(policy.sync_queue_days);

        sqlx::query("DELETE FROM telemetry WHERE timestamp < ?")
            .bind(telemetry_cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        sqlx::query("DELETE FROM decisions WHERE timestamp < ?")
            .bind(decisions_cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        sqlx::query("DELETE FROM alarms WHERE timestamp < ? AND acknowledged = 1")
            .bind(alarms_cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        sqlx::query("DELETE FROM sync_queue WHERE sent = 1 AND created_at < ?")
            .bind(sync_cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;

        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await
            .map_err(|e| EdgeError::PersistentStoreFull(e.to_string()))?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn store_err(e: sqlx::Error) -> EdgeError {
    EdgeError::PersistentStoreFull(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;

    async fn memory_store() -> DurableStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(CREATE_TABLES).execute(&pool).await.unwrap();
        DurableStore { pool }
    }

    #[tokio::test]
    async fn append_and_fetch_sync_queue_round_trips() {
        let store = memory_store().await;
        let now = Utc::now();
        store.enqueue_sync("site/alarms", "{}", 1, now).await.unwrap();
        store.enqueue_sync("site/decisions", "{}", 1, now).await.unwrap();

        let pending = store.fetch_pending_sync(10).await.unwrap();
        assert_eq!(pending.len(), 2);

        store.mark_synced(&[pending[0].id]).await.unwrap();
        let remaining = store.fetch_pending_sync(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, pending[1].id);
    }

    #[tokio::test]
    async fn append_telemetry_does_not_error() {
        let store = memory_store().await;
        store.append_telemetry(&nominal_snapshot()).await.unwrap();
    }

    #[tokio::test]
    async fn retention_sweep_runs_without_error_on_empty_store() {
        let store = memory_store().await;
        store.retention_sweep(RetentionPolicy::default()).await.unwrap();
    }
}
