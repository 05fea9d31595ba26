//! Message shapes carried over the Message Bus.
//!
//! This replaces the FIPA performative model (`fipa.rs`) with the
//! plain payload/attachment shape this system's agents actually exchange —
//! no performatives are required here, but the validate-before-enqueue idiom
//! (`validate_fipa_message`) carries over as `Message::validate`.

use crate::domain_types::{AgentId, DelayMs, MessageId, SendSeq, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An attachment carried alongside a message's text payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME-ish content type, e.g. `"image/png"`.
    pub content_type: String,
    /// Original filename, if known.
    pub filename: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Raw bytes, present when the attachment has not yet been routed
    /// through the Content Router for a specific recipient.
    pub data: Option<Vec<u8>>,
    /// Opaque reference usable to retrieve the attachment out of band
    /// used as a forwarding suggestion for unsupported content.
    pub reference: Option<String>,
}

/// The body of a message: free text plus optional attachments.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Payload {
    /// Human-readable text content.
    pub text: Option<String>,
    /// Structured data passed verbatim (e.g. tool call arguments).
    pub structured: Option<serde_json::Value>,
    /// Attached binary content.
    pub attachments: Vec<Attachment>,
}

impl Payload {
    /// A payload carrying only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            structured: None,
            attachments: Vec::new(),
        }
    }
}

/// A single message routed through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub message_id: MessageId,
    /// Sending agent.
    pub from: AgentId,
    /// Recipient agent.
    pub to: AgentId,
    /// Task/conversation thread this message is scoped to.
    pub task_id: TaskId,
    /// Body.
    pub payload: Payload,
    /// Delay before the message becomes deliverable. Zero means immediate.
    pub delay: DelayMs,
    /// Monotonic send order, used to break delivery-time ties
    /// deterministically rather than by wall-clock comparison.
    pub send_seq: SendSeq,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Validates the fields that must be non-empty before a message may be
    /// enqueued. `from`/`to` are always present since `AgentId` has no empty
    /// state; cross-task isolation is enforced separately by the bus, which
    /// has the registry context this type doesn't carry.
    pub fn validate(&self) -> Result<(), crate::error::BusError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(task_id: TaskId, seq: u64) -> Message {
        Message {
            message_id: MessageId::generate(),
            from: AgentId::user(),
            to: AgentId::root(),
            task_id,
            payload: Payload::text("hello"),
            delay: DelayMs::zero(),
            send_seq: SendSeq::new(seq),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn validate_accepts_text_payload() {
        let msg = sample(TaskId::generate(), 1);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn send_seq_orders_messages_with_equal_delay() {
        let task = TaskId::generate();
        let a = sample(task.clone(), 1);
        let b = sample(task, 2);
        assert!(a.send_seq < b.send_seq);
    }
}
