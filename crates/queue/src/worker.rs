//! In-process after-job queue and the worker draining it.
//!
//! The host enqueues a pass's after-jobs once the record is saved. The
//! worker runs each job once; a failure goes to the failure recorder and
//! the job is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use engine::{AfterJob, FailureRecorder, RoleOperation};

use crate::gateway::{NotificationGateway, RoleMembershipSync};
use crate::QueueError;

/// Default number of jobs buffered before `enqueue` waits.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A job as held by the queue.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Uuid,
    pub job: AfterJob,
    pub enqueued_at: DateTime<Utc>,
}

/// Sending half of the queue; cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Envelope>,
}

impl JobQueue {
    /// Create a queue and the receiver to hand to a [`Worker`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue every job of a pass, in order.
    pub async fn enqueue_all(&self, jobs: Vec<AfterJob>) -> Result<usize, QueueError> {
        let count = jobs.len();
        for job in jobs {
            let envelope = Envelope {
                id: Uuid::new_v4(),
                job,
                enqueued_at: Utc::now(),
            };
            debug!(job_id = %envelope.id, job = envelope.job.name(), "enqueuing");
            self.tx
                .send(envelope)
                .await
                .map_err(|_| QueueError::Closed)?;
        }
        Ok(count)
    }
}

pub struct Worker {
    notifications: Arc<dyn NotificationGateway>,
    roles: Arc<dyn RoleMembershipSync>,
    recorder: Arc<dyn FailureRecorder>,
}

impl Worker {
    pub fn new(
        notifications: Arc<dyn NotificationGateway>,
        roles: Arc<dyn RoleMembershipSync>,
        recorder: Arc<dyn FailureRecorder>,
    ) -> Self {
        Self {
            notifications,
            roles,
            recorder,
        }
    }

    /// Drain the queue until every [`JobQueue`] handle is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        info!("after-job worker started");
        while let Some(envelope) = rx.recv().await {
            self.handle(&envelope).await;
        }
        info!("after-job worker stopped");
    }

    pub fn spawn(self, rx: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Run one job, recording its failure. Returns whether it succeeded.
    #[instrument(skip_all, fields(job_id = %envelope.id, job = envelope.job.name()))]
    pub async fn handle(&self, envelope: &Envelope) -> bool {
        match self.execute(&envelope.job).await {
            Ok(()) => {
                debug!("job done");
                true
            }
            Err(error) => {
                let job = &envelope.job;
                self.recorder.record(
                    job.site(),
                    job.failure_kind(),
                    &format!("{} failed: {error}", job.name()),
                );
                false
            }
        }
    }

    async fn execute(&self, job: &AfterJob) -> Result<(), QueueError> {
        match job {
            AfterJob::Notify {
                channel,
                recipients,
                body,
                metadata,
                ..
            } => {
                self.notifications
                    .send(*channel, recipients, body, metadata)
                    .await
            }
            AfterJob::SyncRole {
                name_ids,
                role_id,
                operation,
                ..
            } => {
                for name_id in name_ids {
                    match operation {
                        RoleOperation::Add => self.roles.add_member(role_id, name_id).await?,
                        RoleOperation::Remove => self.roles.remove_member(role_id, name_id).await?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine::{FailureKind, FailureSite, InMemoryFailureRecorder};
    use providers::Channel;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingGateway {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn outcome(&self) -> Result<(), QueueError> {
            if self.fail {
                Err(QueueError::Rejected("gateway down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NotificationGateway for RecordingGateway {
        async fn send(
            &self,
            channel: Channel,
            recipients: &[String],
            body: &str,
            _metadata: &Value,
        ) -> Result<(), QueueError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{channel} {} {body}", recipients.join(",")));
            self.outcome()
        }
    }

    #[async_trait]
    impl RoleMembershipSync for RecordingGateway {
        async fn add_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError> {
            self.calls.lock().unwrap().push(format!("add {role_id} {name_id}"));
            self.outcome()
        }

        async fn remove_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError> {
            self.calls.lock().unwrap().push(format!("remove {role_id} {name_id}"));
            self.outcome()
        }
    }

    fn jobs() -> Vec<AfterJob> {
        let site = FailureSite::new("wf").status("s1").action("grant");
        vec![
            AfterJob::SyncRole {
                site: site.clone(),
                user_id: "u-1".into(),
                name_ids: vec!["nid-1".into(), "nid-2".into()],
                role_id: "R1".into(),
                operation: RoleOperation::Add,
            },
            AfterJob::Notify {
                site,
                channel: Channel::Sms,
                recipients: vec!["+100".into()],
                body: "Hi".into(),
                metadata: json!({}),
            },
        ]
    }

    #[tokio::test]
    async fn worker_runs_jobs_in_order() {
        let gateway = Arc::new(RecordingGateway::default());
        let recorder = Arc::new(InMemoryFailureRecorder::new());
        let worker = Worker::new(gateway.clone(), gateway.clone(), recorder.clone());

        let (queue, rx) = JobQueue::new(DEFAULT_QUEUE_CAPACITY);
        assert_eq!(queue.enqueue_all(jobs()).await.unwrap(), 2);
        drop(queue);
        worker.run(rx).await;

        assert_eq!(
            gateway.calls(),
            vec!["add R1 nid-1", "add R1 nid-2", "sms +100 Hi"]
        );
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded_not_retried() {
        let gateway = Arc::new(RecordingGateway {
            fail: true,
            ..RecordingGateway::default()
        });
        let recorder = Arc::new(InMemoryFailureRecorder::new());
        let worker = Worker::new(gateway.clone(), gateway.clone(), recorder.clone());

        let (queue, rx) = JobQueue::new(4);
        queue.enqueue_all(jobs()).await.unwrap();
        drop(queue);
        worker.spawn(rx).await.unwrap();

        // The sync job stops at its first failing member.
        assert_eq!(gateway.calls().len(), 2);
        let mut kinds: Vec<FailureKind> = recorder.list().into_iter().map(|e| e.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![FailureKind::NotifyFailed, FailureKind::RoleSyncFailed]);
    }

    #[tokio::test]
    async fn enqueue_fails_once_the_worker_is_gone() {
        let (queue, rx) = JobQueue::new(1);
        drop(rx);
        assert!(matches!(
            queue.enqueue_all(jobs()).await,
            Err(QueueError::Closed)
        ));
    }
}
