use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::JobId;

/// Cooperative cancellation flag observed by the round loop at its
/// suspension points.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Registry of cancellation flags for running jobs
#[derive(Default)]
pub struct CancelRegistry {
    signals: Mutex<HashMap<JobId, CancelSignal>>,
}

impl CancelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running job and returns its signal.
    pub async fn register(&self, job_id: &JobId) -> CancelSignal {
        let mut signals = self.signals.lock().await;
        let signal = CancelSignal::new();
        signals.insert(job_id.clone(), signal.clone());
        signal
    }

    /// Requests cancellation. Returns false when the job is not running.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        let signals = self.signals.lock().await;
        signals.get(job_id).map_or(false, |signal| {
            signal.set();
            true
        })
    }

    /// Drops the signal once the job reaches a terminal state.
    pub async fn remove(&self, job_id: &JobId) {
        self.signals.lock().await.remove(job_id);
    }
}
