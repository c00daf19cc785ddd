//! Redis adapters for the job store and queue ports.
//!
//! Job states live as JSON strings under `<prefix>:<job_id>` and are
//! iterated with SCAN; the queue is a Redis list driven by RPUSH/BLPOP.
//! Both adapters share one connection manager, cloned per call.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;

use onegraph_domain::entities::{IndexJob, JobState};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{JobQueue, JobStore};

/// Connect to Redis and return a cloneable connection manager.
///
/// # Errors
///
/// Returns [`Error::Storage`] when the URL is invalid or the server is
/// unreachable.
pub async fn connect_redis(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)
        .map_err(|err| Error::storage(format!("invalid redis url: {err}")))?;
    client
        .get_connection_manager()
        .await
        .map_err(|err| Error::storage(format!("redis connection failed: {err}")))
}

/// Durable job state store under a key prefix.
pub struct RedisJobStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisJobStore {
    /// Create a store over a shared connection manager.
    #[must_use]
    pub fn new(manager: ConnectionManager, prefix: String) -> Self {
        Self { manager, prefix }
    }

    fn key(&self, job_id: &str) -> String {
        format!("{}:{job_id}", self.prefix)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn save(&self, state: &mut JobState) -> Result<()> {
        state.touch();
        let payload = serde_json::to_string(state)?;
        let mut connection = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(self.key(&state.job_id))
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(|err| Error::storage(format!("job state save failed: {err}")))?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobState>> {
        let mut connection = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(job_id))
            .query_async(&mut connection)
            .await
            .map_err(|err| Error::storage(format!("job state read failed: {err}")))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<JobState>> {
        let mut connection = self.manager.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut states = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await
                .map_err(|err| Error::storage(format!("job state scan failed: {err}")))?;
            for key in keys {
                let raw: Option<String> = redis::cmd("GET")
                    .arg(&key)
                    .query_async(&mut connection)
                    .await
                    .map_err(|err| Error::storage(format!("job state read failed: {err}")))?;
                let Some(raw) = raw else { continue };
                match serde_json::from_str(&raw) {
                    Ok(state) => states.push(state),
                    Err(err) => {
                        warn!(event = "job_state_corrupt", key = %key, error = %err);
                    }
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(states)
    }
}

/// Durable FIFO of index jobs over a Redis list.
pub struct RedisJobQueue {
    manager: ConnectionManager,
    queue_name: String,
}

impl RedisJobQueue {
    /// Create a queue over a shared connection manager.
    #[must_use]
    pub fn new(manager: ConnectionManager, queue_name: String) -> Self {
        Self {
            manager,
            queue_name,
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &IndexJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut connection = self.manager.clone();
        let _: () = redis::cmd("RPUSH")
            .arg(&self.queue_name)
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(|err| Error::queue(format!("enqueue failed: {err}")))?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<IndexJob>> {
        let mut connection = self.manager.clone();
        let item: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.queue_name)
            .arg(timeout.as_secs_f64())
            .query_async(&mut connection)
            .await
            .map_err(|err| Error::queue(format!("dequeue failed: {err}")))?;
        match item {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn queued_job_ids(&self) -> Result<HashSet<String>> {
        let mut connection = self.manager.clone();
        let payloads: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.queue_name)
            .arg(0)
            .arg(-1)
            .query_async(&mut connection)
            .await
            .map_err(|err| Error::queue(format!("queue listing failed: {err}")))?;
        let mut ids = HashSet::with_capacity(payloads.len());
        for payload in payloads {
            match serde_json::from_str::<IndexJob>(&payload) {
                Ok(job) => {
                    ids.insert(job.job_id);
                }
                Err(err) => {
                    warn!(event = "queue_record_corrupt", error = %err);
                }
            }
        }
        Ok(ids)
    }
}
