use crate::core::config::data::{path_display, Config};
use crate::core::constants::CONFIG_FILE_NAME;
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// No configuration file exists at any of the searched locations.
    NotFound {
        /// Every path that was checked, in search order.
        searched: Vec<PathBuf>,
    },

    /// Failed to read the configuration file from disk.
    Read {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        /// Path to the configuration file with invalid TOML.
        path: PathBuf,
        /// The TOML deserialization error.
        source: toml::de::Error,
    },

    /// A `prompt_file` referenced by the configuration could not be read.
    PromptFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound { searched } => {
                let paths = searched
                    .iter()
                    .map(|path| path_display(path))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "No configuration file found (searched: {paths})")
            }
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    path_display(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path_display(path),
                    source
                )
            }
            ConfigError::PromptFile { path, source } => {
                write!(
                    f,
                    "Failed to read prompt file {}: {}",
                    path_display(path),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::PromptFile { source, .. } => Some(source),
        }
    }
}

impl Config {
    /// Load the configuration from an explicit path, or the first file found in the search path.
    pub fn discover(explicit: Option<&Path>) -> Result<(Config, PathBuf), ConfigError> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => Self::search_paths(),
        };

        for candidate in &candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Loading configuration");
                let config = Self::load_from_path(candidate)?;
                return Ok((config, candidate.clone()));
            }
        }

        Err(ConfigError::NotFound {
            searched: candidates,
        })
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;

        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_prompt_files(base_dir)?;
        Ok(config)
    }

    /// Inline every `prompt_file` so the rest of the program only deals with `prompt` text.
    /// An inline prompt wins over a file when both are set.
    pub(crate) fn resolve_prompt_files(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        if self.system_prompt.is_none() {
            if let Some(file) = &self.system_prompt_file {
                self.system_prompt = Some(read_prompt(base_dir, file)?);
            }
        }

        for server in self.mcp_servers.values_mut() {
            if server.prompt.is_none() {
                if let Some(file) = &server.prompt_file {
                    server.prompt = Some(read_prompt(base_dir, file)?);
                }
            }
        }

        for agent in self.agents.values_mut() {
            if agent.prompt.is_none() {
                if let Some(file) = &agent.prompt_file {
                    agent.prompt = Some(read_prompt(base_dir, file)?);
                }
            }
        }

        Ok(())
    }

    pub(crate) fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(proj_dirs) = ProjectDirs::from("org", "agent-chat", "agent-chat") {
            paths.push(proj_dirs.config_dir().join("config.toml"));
        }
        paths
    }
}

fn read_prompt(base_dir: &Path, file: &Path) -> Result<String, ConfigError> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        base_dir.join(file)
    };
    fs::read_to_string(&path)
        .map(|text| text.trim().to_string())
        .map_err(|source| ConfigError::PromptFile { path, source })
}
