//! Rendering engine
//!
//! The [`Core`] owns one session task per chat. Inbound events for a chat are
//! processed in arrival order by that task; state changes observed by a
//! committed page queue re-renders on the same task, where bursts collapse
//! into one render. Every commit moves the session's own [`CommitClock`],
//! which is what [`Core::handle_message_update`] waits on for that chat.

mod actor;
mod pipeline;
mod quiet;
mod session;

pub use pipeline::{Core, CoreHandle, UpdateCallback};
pub use quiet::{CommitClock, QuietOutcome};
pub use session::ConversationSession;
