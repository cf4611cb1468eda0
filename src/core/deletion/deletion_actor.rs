// Deletion retry actor.
//
// Suppressed posts are removed from the group in the background. The gate
// pushes jobs into a bounded queue without waiting; a dispatcher pulls them
// off and runs at most `max_concurrency` deletions at a time, each with its
// own retry schedule. Deletion is best effort: the moderation decision has
// already been made by the time a job runs.

use crate::core::retry::{RetryFailure, RetryPolicy, RetryVerdict};
use crate::core::transport::{MessagingTransport, TransportError};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionJob {
    pub group_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeletionOutcome {
    Deleted { attempts: u32 },
    /// Not found or forbidden. Retrying would not help.
    Abandoned { attempts: u32, error: TransportError },
    /// Kept failing transiently until the attempt budget ran out.
    GaveUp { attempts: u32, error: TransportError },
}

pub type DeletionInbox = mpsc::Receiver<DeletionJob>;

/// Producer side of the deletion queue.
#[derive(Clone)]
pub struct DeletionQueue {
    tx: mpsc::Sender<DeletionJob>,
}

impl DeletionQueue {
    pub fn bounded(capacity: usize) -> (Self, DeletionInbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never waits. Returns false if the job was dropped.
    pub fn enqueue(&self, job: DeletionJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    group_id = job.group_id,
                    message_id = job.message_id,
                    "Deletion queue full; leaving message in place"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(
                    group_id = job.group_id,
                    message_id = job.message_id,
                    "Deletion queue closed; leaving message in place"
                );
                false
            }
        }
    }
}

pub struct DeletionActor {
    transport: Arc<dyn MessagingTransport>,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl DeletionActor {
    pub fn new(transport: Arc<dyn MessagingTransport>, retry: RetryPolicy, max_concurrency: usize) -> Self {
        Self {
            transport,
            retry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn delete_with_retry(&self, job: DeletionJob) -> DeletionOutcome {
        let mut attempts = 0;
        let result = self
            .retry
            .run(
                |err: &TransportError| match err {
                    _ if err.is_permanent() => RetryVerdict::Stop,
                    TransportError::RateLimited {
                        retry_after: Some(wait),
                    } => RetryVerdict::RetryAfter(*wait),
                    _ => RetryVerdict::Retry,
                },
                |attempt| {
                    attempts = attempt;
                    self.transport.delete(job.group_id, job.message_id)
                },
            )
            .await;

        let outcome = match result {
            Ok(()) => DeletionOutcome::Deleted { attempts },
            Err(RetryFailure::Permanent { error, attempts }) => {
                DeletionOutcome::Abandoned { attempts, error }
            }
            Err(RetryFailure::Exhausted { error, attempts }) => {
                DeletionOutcome::GaveUp { attempts, error }
            }
        };

        match &outcome {
            DeletionOutcome::Deleted { .. } => {
                tracing::debug!(
                    group_id = job.group_id,
                    message_id = job.message_id,
                    "Deleted blocked message"
                );
            }
            DeletionOutcome::Abandoned { error, .. } => {
                tracing::warn!(
                    group_id = job.group_id,
                    message_id = job.message_id,
                    error = %error,
                    "Cannot delete blocked message"
                );
            }
            DeletionOutcome::GaveUp { attempts, error } => {
                tracing::warn!(
                    group_id = job.group_id,
                    message_id = job.message_id,
                    attempts,
                    error = %error,
                    "Giving up on deleting blocked message"
                );
            }
        }
        outcome
    }

    /// Pull jobs until the queue closes or shutdown is signalled. Jobs already
    /// queued at shutdown are still run, and every started deletion is
    /// awaited before returning.
    pub async fn run(self: Arc<Self>, mut inbox: DeletionInbox, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                job = inbox.recv() => {
                    let Some(job) = job else { break };
                    self.spawn_job(&permits, &mut in_flight, job).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        inbox.close();
        let mut drained = 0usize;
        while let Some(job) = inbox.recv().await {
            self.spawn_job(&permits, &mut in_flight, job).await;
            drained += 1;
        }
        while in_flight.join_next().await.is_some() {}

        tracing::info!(drained, "Deletion actor stopped");
    }

    async fn spawn_job(
        self: &Arc<Self>,
        permits: &Arc<Semaphore>,
        in_flight: &mut JoinSet<DeletionOutcome>,
        job: DeletionJob,
    ) {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };
        let actor = Arc::clone(self);
        in_flight.spawn(async move {
            let _permit = permit;
            actor.delete_with_retry(job).await
        });
    }
}
