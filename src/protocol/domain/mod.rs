//! Domain types for the message protocol.
//!
//! Pure types with no infrastructure dependencies. Messages are immutable
//! after construction and serialisable via serde.

mod context;
mod fault;
mod ids;
mod message;
mod payload;

pub use context::{ConversationContext, RECENT_HISTORY_LIMIT};
pub use fault::{AgentFault, ErrorKind};
pub use ids::{AgentId, MessageId, SessionId, ThreadId};
pub use message::{Message, MessageBuilder, MessageType, ParseMessageTypeError, Priority};
pub use payload::{Payload, RequiredField, ResultError, ResultStatus, WorkerResult};
