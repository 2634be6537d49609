//! Tool-server catalogue, tool naming, and permission payloads.

pub mod permissions;
pub mod registry;
pub mod tools;
