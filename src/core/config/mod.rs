pub mod data;
pub mod io;

#[cfg(test)]
pub mod tests;

pub use data::{AgentConfig, Config, ToolServerConfig};
pub use io::ConfigError;
