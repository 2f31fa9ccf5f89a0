#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Append-only per-job event stream with live subscribers. Entries are
//! strictly ordered within a job; heartbeat entries keep long-lived
//! subscribers alive and are filtered by presentation layers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::diagnostics::redact_sensitive;
use crate::types::{JobId, LogEntry, LogLevel, LogRole};

const CHANNEL_CAPACITY: usize = 256;
const BACKLOG_CAPACITY: usize = 200;

struct JobChannel {
    sender: broadcast::Sender<LogEntry>,
    backlog: Vec<LogEntry>,
    closed: bool,
}

impl JobChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            backlog: Vec::new(),
            closed: false,
        }
    }
}

/// A live subscription: the bounded backlog at subscribe time plus a
/// receiver for every entry appended afterwards.
pub struct LogSubscription {
    pub backlog: Vec<LogEntry>,
    pub receiver: broadcast::Receiver<LogEntry>,
}

/// In-process log stream hub, shared by orchestrator and subscribers
pub struct LogStream {
    channels: RwLock<HashMap<JobId, JobChannel>>,
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Appends an entry to the job's stream. Messages are redacted before
    /// they become visible. Appends after close are dropped.
    pub async fn append(
        &self,
        job_id: &JobId,
        role: LogRole,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let entry = LogEntry::new(role, level, redact_sensitive(&message.into()));

        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(job_id.clone())
            .or_insert_with(JobChannel::new);
        if channel.closed {
            debug!("Dropping log entry for closed job {}", job_id);
            return;
        }

        channel.backlog.push(entry.clone());
        if channel.backlog.len() > BACKLOG_CAPACITY {
            channel.backlog.remove(0);
        }
        // A send error only means nobody is subscribed right now.
        let _ = channel.sender.send(entry);
    }

    /// Subscribes to a job's stream, receiving the bounded backlog plus all
    /// future entries in append order.
    pub async fn subscribe(&self, job_id: &JobId) -> LogSubscription {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(job_id.clone())
            .or_insert_with(JobChannel::new);
        LogSubscription {
            backlog: channel.backlog.clone(),
            receiver: channel.sender.subscribe(),
        }
    }

    /// Closes a job's stream once it reaches a terminal state. Subscribers
    /// observe the end of the channel after draining pending entries.
    pub async fn close(&self, job_id: &JobId) {
        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get_mut(job_id) {
            channel.closed = true;
            // Dropping the only sender ends every receiver.
            let (replacement, _) = broadcast::channel(1);
            channel.sender = replacement;
        }
    }

    pub async fn is_closed(&self, job_id: &JobId) -> bool {
        let channels = self.channels.read().await;
        channels.get(job_id).is_some_and(|channel| channel.closed)
    }

    /// Bounded backlog snapshot, rendered entries only.
    pub async fn backlog(&self, job_id: &JobId) -> Vec<LogEntry> {
        let channels = self.channels.read().await;
        channels.get(job_id).map_or_else(Vec::new, |channel| {
            channel
                .backlog
                .iter()
                .filter(|entry| entry.level.is_rendered())
                .cloned()
                .collect()
        })
    }

    /// Spawns the per-job heartbeat writer. It appends a heartbeat entry on
    /// every interval tick until the stream closes; the orchestrator aborts
    /// the handle on job completion as well.
    #[must_use]
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        job_id: JobId,
        interval: Duration,
    ) -> JoinHandle<()> {
        let stream = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if stream.is_closed(&job_id).await {
                    break;
                }
                stream
                    .append(&job_id, LogRole::System, LogLevel::Heartbeat, "heartbeat")
                    .await;
            }
        })
    }
}
