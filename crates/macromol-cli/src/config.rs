use crate::cli::ParserFlags;
use crate::error::{CliError, Result};
use macromol::core::io::ParserOptions;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The TOML configuration file understood by the CLI:
///
/// ```toml
/// [parser]
/// permissive = true
/// use_auth_id = false
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub parser: ParserOptions,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!("cannot read '{}': {}", path.display(), error))
        })?;
        toml::from_str(&text).map_err(|error| {
            CliError::Config(format!("cannot parse '{}': {}", path.display(), error))
        })
    }
}

/// Merges the configuration file with command-line flags; flags win.
pub fn resolve_options(config: Option<&Path>, flags: &ParserFlags) -> Result<ParserOptions> {
    let mut options = match config {
        Some(path) => FileConfig::load(path)?.parser,
        None => ParserOptions::default(),
    };
    if flags.permissive {
        options.permissive = true;
    }
    if flags.label_ids {
        options.use_auth_id = false;
    }
    Ok(options)
}
