//! Terminal UI for interactive chat sessions.
//!
//! - [`chat_loop`]: terminal lifecycle, key handling and the draw loop.
//! - [`renderer`]: turns a session snapshot into a frame.
//! - [`history`]: Up/Down recall of previously sent messages.
//!
//! This layer only presents state and captures input; [`crate::core`] owns
//! the conversation.

pub mod chat_loop;
pub mod history;
pub mod renderer;
