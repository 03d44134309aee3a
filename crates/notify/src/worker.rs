//! Delivery worker and retry sweeper.
//!
//! [`DeliveryWorker::sweep`] is one pass over the queue: reclaim stale
//! claims, scan due entries across tenants, then claim, send and transition
//! each one with bounded concurrency. [`RetrySweeper`] runs sweeps on a
//! fixed interval; the manual trigger calls `sweep` directly.
//!
//! A sweep runs on its own task. Dropping the future returned by `sweep`
//! (a timed-out request, a disconnected client) detaches the task instead
//! of cancelling it, so every claim it made still reaches a recorded
//! outcome.

use std::sync::Arc;
use std::time::Duration;

use academy_core::delivery::{RetryPolicy, Transition};
use academy_core::phone::is_valid_recipient;
use academy_core::types::Timestamp;
use academy_db::models::queue::{DeliveryError, DueEntry, QueueEntry};
use chrono::{TimeDelta, Utc};
use tokio::time::Instant;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::NotifyConfig;
use crate::gateway::{MessageGateway, SendRequest, SendResult, ERROR_INVALID_RECIPIENT};
use crate::store::{NotificationStore, StoreResult};

/// Error code recorded when the gateway reports failure without a code.
const ERROR_UNKNOWN: &str = "UNKNOWN_ERROR";

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Entries this sweep claimed and sent to the gateway.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retried: usize,
    /// Due entries another worker claimed first.
    pub skipped: usize,
    /// Stale PROCESSING entries released before the scan.
    pub reclaimed: u64,
    /// Entries abandoned because the store failed mid-delivery.
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryOutcome {
    Sent,
    Retried,
    Failed,
    /// Lost the claim race, or the row moved under us.
    Skipped,
    Errored,
}

impl SweepSummary {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent => {
                self.processed += 1;
                self.succeeded += 1;
            }
            DeliveryOutcome::Retried => {
                self.processed += 1;
                self.retried += 1;
            }
            DeliveryOutcome::Failed => {
                self.processed += 1;
                self.failed += 1;
            }
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::Errored => self.errors += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryWorker
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DeliveryWorker {
    store: Arc<dyn NotificationStore>,
    gateway: Arc<dyn MessageGateway>,
    policy: RetryPolicy,
    batch_size: i64,
    concurrency: usize,
    claim_lease: TimeDelta,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        gateway: Arc<dyn MessageGateway>,
        config: &NotifyConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            policy: config.retry,
            batch_size: config.sweep_batch_size,
            concurrency: config.sweep_concurrency.max(1),
            claim_lease: config.claim_lease,
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// Fails only if the reclaim or the due scan fails, or the sweep task
    /// panics; per-entry store errors are logged and counted in
    /// [`SweepSummary::errors`].
    pub async fn sweep(&self, now: Timestamp) -> StoreResult<SweepSummary> {
        let worker = self.clone();
        tokio::spawn(async move { worker.run_sweep(now).await }).await?
    }

    async fn run_sweep(&self, now: Timestamp) -> StoreResult<SweepSummary> {
        let started = Instant::now();
        let reclaimed = self
            .store
            .reclaim_stale(now - self.claim_lease, self.policy.max_attempts)
            .await?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Released stale notification claims");
        }

        let due = self.store.find_due(now, self.batch_size).await?;
        let mut summary = SweepSummary {
            reclaimed,
            ..SweepSummary::default()
        };

        let outcomes: Vec<DeliveryOutcome> = stream::iter(due)
            .map(|entry| self.deliver(entry, now, started))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }
        Ok(summary)
    }

    async fn deliver(&self, due: DueEntry, now: Timestamp, started: Instant) -> DeliveryOutcome {
        match self.try_deliver(due, now, started).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    tenant_id = due.academy_id,
                    queue_id = due.id,
                    error = %e,
                    "Notification delivery aborted"
                );
                DeliveryOutcome::Errored
            }
        }
    }

    async fn try_deliver(
        &self,
        due: DueEntry,
        now: Timestamp,
        started: Instant,
    ) -> StoreResult<DeliveryOutcome> {
        let tenant = due.tenant();
        // Entries late in a long sweep are claimed well after `now`; the
        // lease has to start when the claim does.
        let claimed_at =
            now + TimeDelta::from_std(started.elapsed()).unwrap_or(TimeDelta::zero());
        let Some(entry) = self.store.claim(tenant, due.id, claimed_at).await? else {
            tracing::debug!(tenant_id = %tenant, queue_id = due.id, "Entry already claimed");
            return Ok(DeliveryOutcome::Skipped);
        };
        let Some(lease) = entry.claimed_at else {
            return Ok(lost_claim(&entry));
        };

        let attempts = entry.attempts + 1;
        let result = self.attempt(&entry).await;

        if result.success {
            let moved = self
                .store
                .mark_sent(
                    tenant,
                    entry.id,
                    lease,
                    attempts,
                    result.provider_message_id.as_deref(),
                    now,
                )
                .await?;
            if !moved {
                return Ok(lost_claim(&entry));
            }
            tracing::info!(
                tenant_id = %tenant,
                queue_id = entry.id,
                attempts,
                provider_message_id = result.provider_message_id.as_deref().unwrap_or(""),
                "Notification sent"
            );
            return Ok(DeliveryOutcome::Sent);
        }

        let error = DeliveryError {
            code: result
                .error_code
                .unwrap_or_else(|| ERROR_UNKNOWN.to_string()),
            message: result.error_message.unwrap_or_default(),
        };

        match self.policy.after_failure(attempts, result.retryable, now) {
            Transition::Retry { next_retry_at } => {
                let moved = self
                    .store
                    .schedule_retry(tenant, entry.id, lease, attempts, next_retry_at, &error)
                    .await?;
                if !moved {
                    return Ok(lost_claim(&entry));
                }
                tracing::warn!(
                    tenant_id = %tenant,
                    queue_id = entry.id,
                    attempts,
                    error_code = %error.code,
                    next_retry_at = %next_retry_at,
                    "Notification send failed, retry scheduled"
                );
                Ok(DeliveryOutcome::Retried)
            }
            Transition::Failed | Transition::Sent => {
                let moved = self
                    .store
                    .mark_failed(tenant, entry.id, lease, attempts, &error)
                    .await?;
                if !moved {
                    return Ok(lost_claim(&entry));
                }
                tracing::error!(
                    tenant_id = %tenant,
                    queue_id = entry.id,
                    attempts,
                    error_code = %error.code,
                    error_message = %error.message,
                    "Notification failed permanently"
                );
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    /// One gateway call, or a permanent failure for an undeliverable number.
    async fn attempt(&self, entry: &QueueEntry) -> SendResult {
        if !is_valid_recipient(&entry.recipient_phone) {
            return SendResult::failure(
                ERROR_INVALID_RECIPIENT,
                format!("'{}' is not a deliverable phone number", entry.recipient_phone),
                false,
            );
        }
        self.gateway
            .send(&SendRequest {
                sender_key: entry.sender_key.clone(),
                template_code: entry.template_code.clone(),
                recipient_phone: entry.recipient_phone.clone(),
                variables: entry.variables.0.clone(),
            })
            .await
    }
}

fn lost_claim(entry: &QueueEntry) -> DeliveryOutcome {
    tracing::warn!(
        tenant_id = entry.academy_id,
        queue_id = entry.id,
        "Claim expired before the outcome was recorded"
    );
    DeliveryOutcome::Skipped
}

// ---------------------------------------------------------------------------
// RetrySweeper
// ---------------------------------------------------------------------------

/// Drives [`DeliveryWorker::sweep`] on a fixed interval.
pub struct RetrySweeper {
    worker: Arc<DeliveryWorker>,
    interval: Duration,
}

impl RetrySweeper {
    pub fn new(worker: Arc<DeliveryWorker>, interval: Duration) -> Self {
        Self { worker, interval }
    }

    /// Sweep every `interval` until `cancel` fires. A sweep in progress
    /// finishes before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Notification retry sweeper started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification retry sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.worker.sweep(Utc::now()).await {
                        Ok(summary) if summary.processed > 0 || summary.reclaimed > 0 => {
                            tracing::info!(
                                processed = summary.processed,
                                succeeded = summary.succeeded,
                                retried = summary.retried,
                                failed = summary.failed,
                                skipped = summary.skipped,
                                reclaimed = summary.reclaimed,
                                "Notification sweep finished"
                            );
                        }
                        Ok(_) => tracing::debug!("Notification sweep: nothing due"),
                        Err(e) => tracing::error!(error = %e, "Notification sweep failed"),
                    }
                }
            }
        }
    }
}
