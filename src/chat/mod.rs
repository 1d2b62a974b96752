//! Chat turns and their persisted history.

pub mod history;
pub mod service;
pub mod session;

pub use history::ChatHistory;
pub use service::{ChatReply, ChatRequest, ChatService};
pub use session::{SessionHandle, SessionManager, TurnRecord};
