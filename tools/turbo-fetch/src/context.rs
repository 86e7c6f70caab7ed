//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::config::CliConfig;
use crate::output::Output;

const CONFIG_NAMES: [&str; 3] = ["turbo.toml", ".turbo.toml", "turbo.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// Where the configuration came from, if a file was found.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from an explicit config file, or the nearest one found
    /// walking up from the working directory.
    pub fn load(config_path: Option<&Path>, output: Output) -> Result<Self> {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                find_config(&cwd)
            }
        };

        let config = match &path {
            Some(path) => CliConfig::load(path)?,
            None => CliConfig::default(),
        };

        Ok(Self {
            config,
            config_path: path,
            output,
        })
    }
}

/// Find a config file in the directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}
