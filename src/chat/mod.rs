//! Real-time workspace chat: wire frames, the transcript reducer, and the
//! supervised connection layer beneath them.

pub mod connection;
pub mod frame;
pub mod message;
pub mod pool;
pub mod reducer;
pub mod retry;
pub mod session;
pub mod status;

pub use connection::{ChatEvent, ChatTarget, ConnectionHandle, spawn_connection};
pub use frame::{ClientFrame, ServerFrame, is_terminal_close};
pub use message::{Message, MessageMetadata, MessageStatus, Role, WorkspaceData};
pub use pool::ChatPool;
pub use reducer::Transcript;
pub use retry::{Backoff, RetryPolicy};
pub use session::ChatSession;
pub use status::{ConnectionStatus, StatusTracker};
