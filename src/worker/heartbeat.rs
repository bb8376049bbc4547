use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

use crate::proto::worker_message::Message;
use crate::proto::{WorkerHeartbeat, WorkerMessage};
use crate::worker::pool::LoadCounter;

/// Periodically reports this worker's load to the scheduler.
pub struct HeartbeatReporter {
    worker_id: String,
    interval: Duration,
    load: LoadCounter,
}

impl HeartbeatReporter {
    pub fn new(worker_id: impl Into<String>, interval_ms: u64, load: LoadCounter) -> Self {
        Self {
            worker_id: worker_id.into(),
            interval: Duration::from_millis(interval_ms),
            load,
        }
    }

    /// Send a heartbeat every interval, first one after a full interval.
    /// Stops for good on the first failed send.
    pub async fn run(self, tx: mpsc::Sender<WorkerMessage>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        loop {
            ticker.tick().await;
            let running_tasks = self.load.get();
            let message = WorkerMessage {
                message: Some(Message::Heartbeat(WorkerHeartbeat {
                    worker_id: self.worker_id.clone(),
                    running_tasks,
                })),
            };
            if tx.send(message).await.is_err() {
                tracing::warn!(worker_id = %self.worker_id, "Heartbeat failed, reporter stopped");
                break;
            }
            tracing::debug!(worker_id = %self.worker_id, running_tasks, "Heartbeat sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_current_load() {
        let load = LoadCounter::new();
        let _busy = load.track();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(HeartbeatReporter::new("w1", 10, load.clone()).run(tx));

        let message = rx.recv().await.unwrap();
        match message.message {
            Some(Message::Heartbeat(hb)) => {
                assert_eq!(hb.worker_id, "w1");
                assert_eq!(hb.running_tasks, 1);
            }
            other => panic!("expected heartbeat, got {:?}", other),
        }
        handle.abort();
    }

    #[tokio::test]
    async fn stops_when_session_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = tokio::spawn(HeartbeatReporter::new("w1", 5, LoadCounter::new()).run(tx));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}
