//! Domain types for the agent society runtime
//!
//! Strongly-typed identifiers and bounded configuration values, following the
//! newtype-over-primitive style used throughout this crate: illegal values
//! (an empty role name, a retry count of zero) are rejected at construction
//! rather than checked on every use.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an agent.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct AgentId(Uuid);

impl AgentId {
    /// Creates a new random agent ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// The well-known `root` system agent.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Uuid::nil())
    }

    /// The well-known `user` system agent.
    #[must_use]
    pub fn user() -> Self {
        Self::new(Uuid::from_u128(1))
    }

    /// True if this is one of the two system singleton agents.
    #[must_use]
    pub fn is_system(&self) -> bool {
        *self == Self::root() || *self == Self::user()
    }
}

/// Unique identifier for a role.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// The system `root` role.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Uuid::nil())
    }

    /// The system `user` role.
    #[must_use]
    pub fn user() -> Self {
        Self::new(Uuid::from_u128(1))
    }

    /// True if this is one of the two system roles.
    #[must_use]
    pub fn is_system(&self) -> bool {
        *self == Self::root() || *self == Self::user()
    }
}

/// Unique identifier for a message.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier of a logical task/conversation thread, copied between
/// messages to scope cross-agent communication isolation.
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh random task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::try_new(Uuid::new_v4().to_string()).expect("uuid string is always valid")
    }
}

/// A tool call correlation identifier.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct CallId(Uuid);

impl CallId {
    /// Creates a new random call ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Human-readable name of a role.
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct RoleName(String);

/// Name of a registered tool group.
#[nutype(
    validate(len_char_min = 1, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct ToolGroup(String);

/// Name of a registered tool.
#[nutype(
    validate(len_char_min = 1, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct ToolName(String);

/// Identifier of an LLM service entry in the service registry.
#[nutype(
    validate(len_char_min = 1, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct LlmServiceId(String);

/// Maximum number of tool-call rounds per inbound message.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 5
)]
pub struct MaxToolRounds(u8);

impl MaxToolRounds {
    /// Gets the value as usize for loop bounds.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        usize::from(self.into_inner())
    }
}

/// Global cap on concurrent in-flight LLM requests.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct MaxConcurrentRequests(usize);

impl Default for MaxConcurrentRequests {
    fn default() -> Self {
        Self::try_new(2).expect("2 is within bounds")
    }
}

impl MaxConcurrentRequests {
    /// Gets the value as usize.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum retry attempts for a failing LLM call.
#[nutype(
    validate(greater_or_equal = 0, less_or_equal = 20),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 3
)]
pub struct MaxRetries(u32);

impl MaxRetries {
    /// Gets the value as u32.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.into_inner()
    }
}

/// Number of most-recent conversation turns retained by `compress_context`.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct KeepRecentCount(usize);

impl KeepRecentCount {
    /// Gets the value as usize.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Delay, in milliseconds, before a message becomes deliverable.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    Default,
    TryFrom,
    Into
))]
pub struct DelayMs(u64);

impl DelayMs {
    /// Gets the value as a `std::time::Duration`.
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }

    /// Zero delay, meaning "deliver immediately".
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when this delay requires scheduling rather than immediate delivery.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.into_inner() > 0
    }
}

/// A monotonically increasing send sequence number, used to break ties
/// between delayed messages that share a `scheduled_delivery_time`
/// used to order delivery deterministically.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    Default,
    Into
))]
pub struct SendSeq(u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_system_singletons_are_stable() {
        assert_eq!(AgentId::root(), AgentId::root());
        assert_ne!(AgentId::root(), AgentId::user());
        assert!(AgentId::root().is_system());
        assert!(AgentId::user().is_system());
        assert!(!AgentId::generate().is_system());
    }

    #[test]
    fn max_tool_rounds_default_is_five() {
        assert_eq!(MaxToolRounds::default().as_usize(), 5);
    }

    #[test]
    fn max_concurrent_requests_default_is_two() {
        assert_eq!(MaxConcurrentRequests::default().as_usize(), 2);
    }

    #[test]
    fn delay_ms_zero_is_not_delayed() {
        assert!(!DelayMs::zero().is_delayed());
        assert!(DelayMs::new(1).is_delayed());
    }
}
