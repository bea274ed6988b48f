//! Durable job queue on SQLite. At-least-once delivery: a claimed job that
//! fails (or whose worker dies) comes back, so handlers must be safe to
//! repeat. Jobs that exhaust their attempts stay in the table as `failed`
//! for ops to look at, never silently dropped.

use crate::error::EngineResult;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Every queue topic in the system. Fraud detection is the one this crate
/// is about; the siblings carry the rest of the platform's background work
/// and share the same delivery guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    FraudDetection,
    ImageProcessing,
    EmailNotification,
    ReportGeneration,
    SettlementProcessing,
    DocumentCleanup,
    EtlAggregation,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::FraudDetection,
        Topic::ImageProcessing,
        Topic::EmailNotification,
        Topic::ReportGeneration,
        Topic::SettlementProcessing,
        Topic::DocumentCleanup,
        Topic::EtlAggregation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::FraudDetection => "fraud-detection",
            Topic::ImageProcessing => "image-processing",
            Topic::EmailNotification => "email-notification",
            Topic::ReportGeneration => "report-generation",
            Topic::SettlementProcessing => "settlement-processing",
            Topic::DocumentCleanup => "document-cleanup",
            Topic::EtlAggregation => "etl-aggregation",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown topic '{s}'"))
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub attempts: i64,
    pub max_attempts: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TopicStats {
    pub queued: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Clone)]
pub struct JobQueue {
    conn: Arc<Mutex<Connection>>,
    /// First-retry delay; doubles on every further attempt.
    backoff_base_secs: i64,
}

impl JobQueue {
    pub fn new(conn: Arc<Mutex<Connection>>, backoff_base_secs: u64) -> anyhow::Result<Self> {
        let queue = JobQueue {
            conn,
            backoff_base_secs: backoff_base_secs as i64,
        };
        queue.init_schema()?;
        Ok(queue)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                state TEXT NOT NULL DEFAULT 'queued',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                run_at TEXT NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(topic, state, run_at);",
        )?;
        Ok(())
    }

    pub fn enqueue(
        &self,
        topic: Topic,
        payload: &serde_json::Value,
        max_attempts: u32,
    ) -> EngineResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (topic, payload, state, max_attempts, run_at, created_at, updated_at)
             VALUES (?, ?, 'queued', ?, ?, ?, ?)",
            params![topic.as_str(), payload.to_string(), max_attempts, now, now, now],
        )?;
        let id = conn.last_insert_rowid();
        log::debug!("Enqueued job {id} on {topic}");
        Ok(id)
    }

    /// Claim the oldest due job on a topic, atomically flipping it
    /// queued -> active. Returns None when nothing is due.
    pub fn claim(&self, topic: Topic) -> EngineResult<Option<Job>> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, payload, attempts, max_attempts FROM jobs
                 WHERE topic = ? AND state = 'queued' AND run_at <= ?
                 ORDER BY id LIMIT 1",
                params![topic.as_str(), now],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, payload, attempts, max_attempts)) = row else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE jobs SET state = 'active', updated_at = ? WHERE id = ?",
            params![now, id],
        )?;
        let payload = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
        Ok(Some(Job {
            id,
            topic,
            payload,
            attempts,
            max_attempts,
        }))
    }

    pub fn complete(&self, job_id: i64) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET state = 'completed', updated_at = ? WHERE id = ?",
            params![Utc::now().to_rfc3339(), job_id],
        )?;
        Ok(())
    }

    /// Record a handler failure. Re-queues with exponential backoff while
    /// attempts remain; otherwise parks the job as `failed` for inspection.
    pub fn fail(&self, job_id: i64, error: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let (attempts, max_attempts): (i64, i64) = conn.query_row(
            "SELECT attempts, max_attempts FROM jobs WHERE id = ?",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let attempts = attempts + 1;
        let now = Utc::now();
        if attempts >= max_attempts {
            conn.execute(
                "UPDATE jobs SET state = 'failed', attempts = ?, last_error = ?, updated_at = ?
                 WHERE id = ?",
                params![attempts, error, now.to_rfc3339(), job_id],
            )?;
            log::error!("Job {job_id} failed permanently after {attempts} attempt(s): {error}");
        } else {
            let delay = self.backoff_base_secs * (1i64 << (attempts - 1).min(16));
            let run_at = now + Duration::seconds(delay);
            conn.execute(
                "UPDATE jobs SET state = 'queued', attempts = ?, last_error = ?, run_at = ?,
                        updated_at = ?
                 WHERE id = ?",
                params![attempts, error, run_at.to_rfc3339(), now.to_rfc3339(), job_id],
            )?;
            log::warn!(
                "Job {job_id} failed (attempt {attempts}/{max_attempts}), retrying in {delay}s: {error}"
            );
        }
        Ok(())
    }

    /// Re-queue jobs stuck in `active` longer than the given age. Covers a
    /// worker process that died mid-job; run at startup and periodically.
    pub fn recover_stale(&self, older_than_secs: i64) -> EngineResult<usize> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::seconds(older_than_secs);
        let conn = self.conn.lock().unwrap();
        let recovered = conn.execute(
            "UPDATE jobs SET state = 'queued', updated_at = ?
             WHERE state = 'active' AND updated_at < ?",
            params![Utc::now().to_rfc3339(), cutoff.to_rfc3339()],
        )?;
        if recovered > 0 {
            log::warn!("Recovered {recovered} stale active job(s)");
        }
        Ok(recovered)
    }

    pub fn stats(&self, topic: Topic) -> EngineResult<TopicStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM jobs WHERE topic = ? GROUP BY state",
        )?;
        let rows = stmt
            .query_map(params![topic.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut stats = TopicStats::default();
        for (state, count) in rows {
            match state.as_str() {
                "queued" => stats.queued = count,
                "active" => stats.active = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                other => log::warn!("Unknown job state '{other}' in queue table"),
            }
        }
        Ok(stats)
    }
}
