// ==============================================================================
// queue.rs - Redis Job Queue Management (Worker Side)
// ==============================================================================
// Description: Consumes file processing jobs and publishes run outcomes
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reputation_processor::models::{FileId, FileStatus};

const QUEUE_KEY: &str = "reputation:file_queue";

/// Job payload pushed by the upload handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub file_id: FileId,
    /// Reprocess a completed file instead of a fresh upload
    #[serde(default)]
    pub rescan: bool,
}

/// Job queue manager
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Dequeue a job (blocking pop with 1 second timeout)
    pub async fn dequeue(&mut self) -> Result<Option<JobPayload>> {
        let result: Option<(String, String)> = self
            .conn
            .brpop(QUEUE_KEY, 1.0)
            .await
            .context("Failed to pop from queue")?;

        match result {
            Some((_, payload_json)) => Ok(Some(parse_payload(&payload_json)?)),
            None => Ok(None),
        }
    }

    /// Announce the terminal status of a run on the file's channel
    pub async fn publish_status(&mut self, file_id: Uuid, status: FileStatus) -> Result<()> {
        let channel = format!("reputation:status:{}", file_id);
        let message = serde_json::json!({
            "file_id": file_id,
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.conn
            .publish::<_, _, ()>(channel, message.to_string())
            .await
            .context("Failed to publish status update")?;
        Ok(())
    }
}

/// Accepts `{"file_id": "<uuid>", "rescan": bool}` or a bare UUID string
pub fn parse_payload(raw: &str) -> Result<JobPayload> {
    if let Ok(file_id) = raw.trim().trim_matches('"').parse::<Uuid>() {
        return Ok(JobPayload { file_id, rescan: false });
    }
    serde_json::from_str(raw).context("Failed to deserialize job payload")
}
