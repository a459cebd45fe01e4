use std::path::Path;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "convert-qa.toml";

/// Prefix for environment overrides, e.g. `CONVERT_QA__SCRUBBER__CHUNK_SIZE`
pub const ENV_PREFIX: &str = "CONVERT_QA__";

/// Where the artifacts of an archive live, relative to the archive root
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Path of the table index
    pub index_path: String,
    /// Directory holding one `table<N>` folder per table
    pub tables_dir: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            index_path: "Indices/tableIndex.xml".to_string(),
            tables_dir: "tables".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrubberConfig {
    /// Bytes read per chunk while scrubbing
    pub chunk_size: usize,
    /// Length of the prefix inspected by the binary-content guard.
    ///
    /// A value of 0 disables the guard.
    pub binary_probe_len: usize,
}

impl Default for ScrubberConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000_000,
            binary_probe_len: 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default diagnostic level when neither `RUST_LOG` nor a CLI flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Archive layout
    pub archive: ArchiveConfig,
    /// Control-byte scrubber settings
    pub scrubber: ScrubberConfig,
    /// Diagnostic logging
    pub logging: LoggingConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    /// Load defaults, then `convert-qa.toml`, then `CONVERT_QA__*` variables
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Load defaults, then the given TOML file, then `CONVERT_QA__*` variables
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
