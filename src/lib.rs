//! agent-chat is a terminal chat client for a language-model agent that can
//! call external tool servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation: session state, the handoff queue between
//!   the UI and the turn loop, tool-server selection, permission negotiation
//!   and the turn orchestrator itself.
//! - [`backend`] talks to the outside world: the agent CLI that runs each turn
//!   and the routing model used for tool-server selection.
//! - [`mcp`] describes the configured tool servers and tool naming.
//! - [`ui`] renders the terminal interface and forwards key presses.
//! - [`cli`] parses arguments and wires everything together.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod backend;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod ui;
pub mod utils;
