//! Concurrency Controller.
//!
//! Admission is gated by two independent rules: a global cap on in-flight
//! LLM requests, and at most one active request per agent. Requests that
//! can't be admitted immediately wait in a FIFO queue. This generalizes the
//! raw `tokio::sync::Semaphore` used for subagent fan-out in
//! `other_examples`' `SubagentManager` (global cap only) by adding the
//! per-agent exclusivity rule and an abort/cancel path, using a condvar-style
//! `tokio::sync::Notify` to wake queued waiters instead of a semaphore
//! permit, since admission depends on agent identity and not just a count.

use crate::domain_types::{AgentId, MaxConcurrentRequests, MaxRetries};
use crate::error::ConcurrencyError;
use crate::time_provider::SharedTimeProvider;
use dashmap::DashSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyStats {
    /// Requests currently executing.
    pub active_count: usize,
    /// Requests waiting for admission.
    pub queue_length: usize,
    /// Every request ever submitted.
    pub total_requests: u64,
    /// Requests that ran to completion (success or exhausted retries).
    pub completed_requests: u64,
    /// Requests rejected outright (duplicate in-flight agent).
    pub rejected_requests: u64,
}

struct QueueEntry {
    agent_id: AgentId,
    notify: Arc<Notify>,
}

struct Inner {
    max_concurrent: Mutex<MaxConcurrentRequests>,
    active: DashSet<AgentId>,
    active_count: AtomicUsize,
    queue: Mutex<VecDeque<QueueEntry>>,
    total_requests: AtomicU64,
    completed_requests: AtomicU64,
    rejected_requests: AtomicU64,
    time: SharedTimeProvider,
}

/// Thread-safe handle to the controller, cheap to clone.
#[derive(Clone)]
pub struct ConcurrencyController {
    inner: Arc<Inner>,
}

/// A handle held by the caller while a request is active; aborting it
/// cancels the in-flight LLM call via the returned [`CancellationToken`] and
/// releases the admission slot on drop-equivalent [`Self::release`].
pub struct AdmissionGuard {
    controller: ConcurrencyController,
    agent_id: AgentId,
    /// Cancelled to signal the caller's LLM call should stop.
    pub cancel: CancellationToken,
}

impl ConcurrencyController {
    /// Builds a controller capped at `max_concurrent` simultaneous requests.
    #[must_use]
    pub fn new(max_concurrent: MaxConcurrentRequests, time: SharedTimeProvider) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent: Mutex::new(max_concurrent),
                active: DashSet::new(),
                active_count: AtomicUsize::new(0),
                queue: Mutex::new(VecDeque::new()),
                total_requests: AtomicU64::new(0),
                completed_requests: AtomicU64::new(0),
                rejected_requests: AtomicU64::new(0),
                time,
            }),
        }
    }

    /// Requests admission for `agent_id`, waiting in FIFO order if the
    /// global cap is currently saturated. Returns
    /// [`ConcurrencyError::AgentAlreadyActive`] immediately if this agent
    /// already holds or is queued for a slot, since dispatch requires
    /// at most one in-flight LLM call per agent.
    #[instrument(skip(self))]
    pub async fn admit(&self, agent_id: AgentId) -> Result<AdmissionGuard, ConcurrencyError> {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);

        if !self.inner.active.insert(agent_id) {
            self.inner
                .rejected_requests
                .fetch_add(1, Ordering::Relaxed);
            return Err(ConcurrencyError::AgentAlreadyActive);
        }

        loop {
            let max = self.inner.max_concurrent.lock().unwrap().as_usize();
            if self.inner.active_count.load(Ordering::Acquire) < max {
                self.inner.active_count.fetch_add(1, Ordering::AcqRel);
                break;
            }

            let notify = Arc::new(Notify::new());
            self.inner.queue.lock().unwrap().push_back(QueueEntry {
                agent_id,
                notify: notify.clone(),
            });
            notify.notified().await;
        }

        Ok(AdmissionGuard {
            controller: self.clone(),
            agent_id,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancels a request still sitting in the queue, before it was admitted.
    pub fn cancel_queued(&self, agent_id: AgentId) -> Result<(), ConcurrencyError> {
        let mut queue = self.inner.queue.lock().unwrap();
        let position = queue.iter().position(|e| e.agent_id == agent_id);
        match position {
            Some(idx) => {
                queue.remove(idx);
                drop(queue);
                self.inner.active.remove(&agent_id);
                Err(ConcurrencyError::RequestCancelled)
            }
            None => Err(ConcurrencyError::RequestCancelled),
        }
    }

    /// Raises or lowers the global cap, immediately waking queued waiters if
    /// the cap increased, mirroring `updateMaxConcurrentRequests`.
    pub fn update_max_concurrent(&self, max_concurrent: MaxConcurrentRequests) {
        *self.inner.max_concurrent.lock().unwrap() = max_concurrent;
        self.drain_queue();
    }

    fn drain_queue(&self) {
        loop {
            let max = self.inner.max_concurrent.lock().unwrap().as_usize();
            if self.inner.active_count.load(Ordering::Acquire) >= max {
                break;
            }
            let next = self.inner.queue.lock().unwrap().pop_front();
            match next {
                Some(entry) => {
                    self.inner.active_count.fetch_add(1, Ordering::AcqRel);
                    entry.notify.notify_one();
                }
                None => break,
            }
        }
    }

    fn release(&self, agent_id: AgentId) {
        self.inner.active.remove(&agent_id);
        self.inner.active_count.fetch_sub(1, Ordering::AcqRel);
        self.inner
            .completed_requests
            .fetch_add(1, Ordering::Relaxed);
        self.drain_queue();
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            active_count: self.inner.active_count.load(Ordering::Relaxed),
            queue_length: self.inner.queue.lock().unwrap().len(),
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            completed_requests: self.inner.completed_requests.load(Ordering::Relaxed),
            rejected_requests: self.inner.rejected_requests.load(Ordering::Relaxed),
        }
    }

    /// Runs `retryable` with exponential backoff (`2^attempt * 1000ms`, per
    /// up to `max_retries` extra attempts beyond the first,
    /// sleeping through the injected [`crate::time_provider::TimeProvider`]
    /// so tests don't pay real wall-clock delay.
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        max_retries: MaxRetries,
        mut retryable: F,
    ) -> Result<T, ConcurrencyError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match retryable().await {
                Ok(value) => return Ok(value),
                Err(_) if attempt < max_retries.as_u32() => {
                    let backoff_ms = 1000u64.saturating_mul(1u64 << attempt.min(20));
                    self.inner
                        .time
                        .sleep(std::time::Duration::from_millis(backoff_ms))
                        .await;
                    attempt += 1;
                }
                Err(_) => return Err(ConcurrencyError::LlmCallFailedAfterRetries),
            }
        }
    }
}

impl AdmissionGuard {
    /// Releases this agent's admission slot, allowing queued requests to proceed.
    pub fn release(self) {
        self.controller.release(self.agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::test_time_provider;

    #[tokio::test]
    async fn same_agent_cannot_hold_two_slots() {
        let controller = ConcurrencyController::new(
            MaxConcurrentRequests::try_new(2).unwrap(),
            test_time_provider(),
        );
        let agent = AgentId::generate();
        let guard = controller.admit(agent).await.unwrap();
        let err = controller.admit(agent).await.unwrap_err();
        assert_eq!(err, ConcurrencyError::AgentAlreadyActive);
        guard.release();
    }

    #[tokio::test]
    async fn global_cap_queues_excess_requests() {
        let controller = ConcurrencyController::new(
            MaxConcurrentRequests::try_new(1).unwrap(),
            test_time_provider(),
        );
        let a = AgentId::generate();
        let b = AgentId::generate();
        let guard_a = controller.admit(a).await.unwrap();
        assert_eq!(controller.stats().active_count, 1);

        let controller2 = controller.clone();
        let admit_b = tokio::spawn(async move { controller2.admit(b).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(controller.stats().queue_length, 1);

        guard_a.release();
        let guard_b = admit_b.await.unwrap().unwrap();
        assert_eq!(controller.stats().active_count, 1);
        guard_b.release();
    }

    #[tokio::test]
    async fn retry_exhausts_after_max_attempts() {
        let controller = ConcurrencyController::new(
            MaxConcurrentRequests::default(),
            test_time_provider(),
        );
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), ConcurrencyError> = controller
            .with_retry(MaxRetries::try_new(2).unwrap(), || async {
                attempts.fetch_add(1, Ordering::Relaxed);
                Err::<(), ()>(())
            })
            .await;
        assert_eq!(result, Err(ConcurrencyError::LlmCallFailedAfterRetries));
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }
}
