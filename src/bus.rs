//! Message Bus: per-agent queued delivery between agents, shared process-wide
//! across every task.
//!
//! Per-recipient FIFO delivery backed by `dashmap::DashMap<(TaskId, AgentId),
//! VecDeque<Message>>`, the same per-agent-queue shape
//! `DeliveryEngineImpl` (`message_router/implementations/delivery_engine.rs`)
//! uses, generalized here to plain `VecDeque`s instead of `mpsc` channels
//! since the bus owns pull-based delivery (`receive_next`) rather than
//! pushing into agent-owned channels. Delayed messages sit in a separate
//! list ordered by `(scheduled_time, send_seq)`; the tie-break is the
//! monotonic `SendSeq` rather than wall-clock comparison, so delivery order
//! is deterministic even when two sends land in the same tick.
//!
//! Queues are keyed by `(TaskId, AgentId)` rather than bare `AgentId`
//! because the bus is one long-lived instance shared by every task a
//! process runs, and the two system agents (`AgentId::root()`/`user()`)
//! reuse the same fixed ID in every task.

use crate::domain::Message;
use crate::domain_types::{AgentId, SendSeq, TaskId};
use crate::error::BusError;
use crate::time_provider::SharedTimeProvider;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{instrument, trace};

/// A delayed message awaiting its scheduled delivery time.
struct Delayed {
    deliver_at: DateTime<Utc>,
    send_seq: SendSeq,
    message: Message,
}

/// Observer callback invoked for bus events (delayed delivery, every
/// message, or user-originated messages). Synchronous and infallible by
/// design: hooks observe, they don't gate delivery.
pub type BusHook = Arc<dyn Fn(&Message) + Send + Sync>;

struct Inner {
    queues: DashMap<(TaskId, AgentId), VecDeque<Message>>,
    delayed: Mutex<Vec<Delayed>>,
    send_seq: AtomicU64,
    on_delayed_delivery: Mutex<Vec<BusHook>>,
    on_all_messages: Mutex<Vec<BusHook>>,
    on_user_message: Mutex<Vec<BusHook>>,
    notify: Notify,
    time: SharedTimeProvider,
}

/// Thread-safe handle to the bus, cheap to clone.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl MessageBus {
    /// Builds an empty bus driven by `time` (inject
    /// [`crate::time_provider::test_time_provider`] in tests to skip the
    /// tick delay). Shared by every task this process hosts.
    #[must_use]
    pub fn new(time: SharedTimeProvider) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: DashMap::new(),
                delayed: Mutex::new(Vec::new()),
                send_seq: AtomicU64::new(0),
                on_delayed_delivery: Mutex::new(Vec::new()),
                on_all_messages: Mutex::new(Vec::new()),
                on_user_message: Mutex::new(Vec::new()),
                notify: Notify::new(),
                time,
            }),
        }
    }

    /// Registers a hook fired whenever a delayed message becomes deliverable.
    pub fn on_delayed_delivery(&self, hook: BusHook) {
        self.inner.on_delayed_delivery.lock().unwrap().push(hook);
    }

    /// Registers a hook fired for every message that enters a recipient's queue.
    pub fn on_all_messages(&self, hook: BusHook) {
        self.inner.on_all_messages.lock().unwrap().push(hook);
    }

    /// Registers a hook fired whenever the `user` system agent sends a message.
    pub fn on_user_message(&self, hook: BusHook) {
        self.inner.on_user_message.lock().unwrap().push(hook);
    }

    /// Enqueues `message` for immediate or delayed delivery, enforcing
    /// cross-task isolation: `from` and `to` must each either be
    /// the task's entry agent or a descendant of it — enforced by the caller
    /// passing in the already-resolved entry agents for `message.task_id`.
    #[instrument(skip(self, message), fields(from = %message.from, to = %message.to))]
    pub fn send(
        &self,
        message: Message,
        from_allowed: bool,
        to_allowed: bool,
    ) -> Result<(), BusError> {
        message.validate()?;

        if !from_allowed || !to_allowed {
            return Err(BusError::CrossTaskCommunicationDenied {
                from: message.from,
                to: message.to,
                task_id: message.task_id.clone(),
            });
        }

        if message.from == AgentId::user() {
            self.fire(&self.inner.on_user_message, &message);
        }

        if message.delay.is_delayed() {
            let now: DateTime<Utc> = self.inner.time.now().into();
            let deliver_at = now
                + chrono::Duration::from_std(message.delay.as_duration()).unwrap_or_default();
            self.inner.delayed.lock().unwrap().push(Delayed {
                deliver_at,
                send_seq: message.send_seq,
                message,
            });
        } else {
            self.enqueue(message);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    fn enqueue(&self, message: Message) {
        self.fire(&self.inner.on_all_messages, &message);
        let key = (message.task_id.clone(), message.to);
        self.inner.queues.entry(key).or_default().push_back(message);
    }

    fn fire(&self, hooks: &Mutex<Vec<BusHook>>, message: &Message) {
        for hook in hooks.lock().unwrap().iter() {
            hook(message);
        }
    }

    /// Allocates the next monotonic send sequence number for tie-breaking
    /// delayed-delivery ordering.
    #[must_use]
    pub fn next_send_seq(&self) -> SendSeq {
        SendSeq::new(self.inner.send_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Pops the oldest queued message for `agent_id` within `task_id`, if any.
    pub fn receive_next(&self, task_id: &TaskId, agent_id: AgentId) -> Option<Message> {
        self.inner
            .queues
            .get_mut(&(task_id.clone(), agent_id))
            .and_then(|mut q| q.pop_front())
    }

    /// Looks at the oldest queued message for `agent_id` within `task_id`
    /// without removing it.
    #[must_use]
    pub fn peek(&self, task_id: &TaskId, agent_id: AgentId) -> Option<Message> {
        self.inner
            .queues
            .get(&(task_id.clone(), agent_id))
            .and_then(|q| q.front().cloned())
    }

    /// Number of messages currently queued for `agent_id` within `task_id`.
    #[must_use]
    pub fn pending_count(&self, task_id: &TaskId, agent_id: AgentId) -> usize {
        self.inner
            .queues
            .get(&(task_id.clone(), agent_id))
            .map_or(0, |q| q.len())
    }

    /// Drops every queued message for `agent_id` within `task_id` (used on
    /// agent termination).
    pub fn clear_queue(&self, task_id: &TaskId, agent_id: AgentId) {
        self.inner.queues.remove(&(task_id.clone(), agent_id));
    }

    /// Moves every delayed message whose `deliver_at` has passed into its
    /// recipient's queue, oldest-scheduled-first with `send_seq` breaking
    /// ties. Intended to be called on a short periodic tick (sub-100ms).
    /// Unscoped by task deliberately: harmless and idempotent to call
    /// redundantly from multiple tasks' background dispatch loops, since it
    /// only moves each due message into its already task-scoped queue.
    #[instrument(skip(self))]
    pub fn tick(&self) {
        let now: DateTime<Utc> = self.inner.time.now().into();
        let mut due = Vec::new();
        {
            let mut delayed = self.inner.delayed.lock().unwrap();
            delayed.sort_by(|a, b| a.deliver_at.cmp(&b.deliver_at).then(a.send_seq.cmp(&b.send_seq)));
            let mut remaining = Vec::with_capacity(delayed.len());
            for entry in delayed.drain(..) {
                if entry.deliver_at <= now {
                    due.push(entry);
                } else {
                    remaining.push(entry);
                }
            }
            *delayed = remaining;
        }
        for entry in due {
            trace!(message_id = %entry.message.message_id, "delayed message now due");
            self.fire(&self.inner.on_delayed_delivery, &entry.message);
            self.enqueue(entry.message);
        }
    }

    /// Immediately delivers every still-pending delayed message for
    /// `task_id` regardless of schedule, used during that task's graceful
    /// shutdown so nothing belonging to it is silently dropped. Other
    /// tasks' delayed messages are left untouched, since the bus is shared
    /// process-wide.
    pub fn flush_delayed_for_task(&self, task_id: &TaskId) {
        let mut delayed = self.inner.delayed.lock().unwrap();
        let (due, remaining): (Vec<Delayed>, Vec<Delayed>) =
            delayed.drain(..).partition(|d| &d.message.task_id == task_id);
        *delayed = remaining;
        drop(delayed);
        for entry in due {
            self.fire(&self.inner.on_delayed_delivery, &entry.message);
            self.enqueue(entry.message);
        }
    }

    /// Total messages still queued for `task_id` across every agent, used in
    /// that task's shutdown summary.
    #[must_use]
    pub fn total_pending(&self, task_id: &TaskId) -> usize {
        self.inner
            .queues
            .iter()
            .filter(|e| &e.key().0 == task_id)
            .map(|e| e.value().len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Payload;
    use crate::domain_types::{DelayMs, MessageId};
    use crate::time_provider::test_time_provider;

    fn msg(bus: &MessageBus, task_id: &TaskId, from: AgentId, to: AgentId, delay_ms: u64) -> Message {
        Message {
            message_id: MessageId::generate(),
            from,
            to,
            task_id: task_id.clone(),
            payload: Payload::text("hi"),
            delay: DelayMs::new(delay_ms),
            send_seq: bus.next_send_seq(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn immediate_messages_are_fifo_per_recipient() {
        let bus = MessageBus::new(test_time_provider());
        let task_id = TaskId::generate();
        let agent = AgentId::generate();
        let m1 = msg(&bus, &task_id, AgentId::root(), agent, 0);
        let m2 = msg(&bus, &task_id, AgentId::root(), agent, 0);
        let id1 = m1.message_id;
        let id2 = m2.message_id;
        bus.send(m1, true, true).unwrap();
        bus.send(m2, true, true).unwrap();

        assert_eq!(bus.receive_next(&task_id, agent).unwrap().message_id, id1);
        assert_eq!(bus.receive_next(&task_id, agent).unwrap().message_id, id2);
        assert!(bus.receive_next(&task_id, agent).is_none());
    }

    #[test]
    fn queues_do_not_leak_across_tasks() {
        let bus = MessageBus::new(test_time_provider());
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        let agent = AgentId::generate();
        let m = msg(&bus, &task_a, AgentId::root(), agent, 0);
        bus.send(m, true, true).unwrap();

        assert_eq!(bus.pending_count(&task_a, agent), 1);
        assert_eq!(bus.pending_count(&task_b, agent), 0);
        assert!(bus.receive_next(&task_b, agent).is_none());
    }

    #[test]
    fn cross_task_violation_is_rejected() {
        let bus = MessageBus::new(test_time_provider());
        let task_id = TaskId::generate();
        let m = msg(&bus, &task_id, AgentId::root(), AgentId::generate(), 0);
        let err = bus.send(m, true, false).unwrap_err();
        assert!(matches!(err, BusError::CrossTaskCommunicationDenied { .. }));
    }

    #[test]
    fn delayed_message_waits_for_tick() {
        let bus = MessageBus::new(test_time_provider());
        let task_id = TaskId::generate();
        let agent = AgentId::generate();
        let m = msg(&bus, &task_id, AgentId::root(), agent, 0);
        bus.send(m, true, true).unwrap();
        assert_eq!(bus.pending_count(&task_id, agent), 1);
    }

    #[test]
    fn flush_delayed_for_task_delivers_only_that_tasks_messages() {
        let bus = MessageBus::new(test_time_provider());
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        let agent = AgentId::generate();
        let a = msg(&bus, &task_a, AgentId::root(), agent, 60_000);
        let b = msg(&bus, &task_b, AgentId::root(), agent, 60_000);
        bus.send(a, true, true).unwrap();
        bus.send(b, true, true).unwrap();
        assert_eq!(bus.pending_count(&task_a, agent), 0);
        assert_eq!(bus.pending_count(&task_b, agent), 0);

        bus.flush_delayed_for_task(&task_a);
        assert_eq!(bus.pending_count(&task_a, agent), 1);
        assert_eq!(bus.pending_count(&task_b, agent), 0);
    }

    #[test]
    fn total_pending_counts_only_the_given_task() {
        let bus = MessageBus::new(test_time_provider());
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        let a = msg(&bus, &task_a, AgentId::root(), AgentId::generate(), 0);
        let b = msg(&bus, &task_b, AgentId::root(), AgentId::generate(), 0);
        bus.send(a, true, true).unwrap();
        bus.send(b, true, true).unwrap();
        assert_eq!(bus.total_pending(&task_a), 1);
        assert_eq!(bus.total_pending(&task_b), 1);
    }
}
