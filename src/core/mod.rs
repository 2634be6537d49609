pub mod config;
pub mod constants;
pub mod controller;
pub mod handoff;
pub mod message;
pub mod orchestrator;
pub mod permission;
pub mod prompt;
pub mod selector;
pub mod session;
