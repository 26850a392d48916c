//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! [compose]
//! dedup_application = true
//!
//! [compose.header]
//! description = "Merged assembly"
//! author = "J. Doe"
//!
//! [decompose]
//! create_dirs = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepasm_part21::format_string;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Composition settings.
    pub compose: ComposeConfig,
    /// Decomposition settings.
    pub decompose: DecomposeConfig,
}

/// Settings for merging files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Skip `APPLICATION_*` instances of every file but the root's.
    pub dedup_application: bool,
    /// Write this header instead of the root file's.
    pub header: Option<HeaderConfig>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            dedup_application: true,
            header: None,
        }
    }
}

/// Settings for splitting a merged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeConfig {
    /// Create missing parent directories of output files.
    pub create_dirs: bool,
    /// Write this header instead of the merged file's.
    pub header: Option<HeaderConfig>,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            create_dirs: true,
            header: None,
        }
    }
}

/// Fields of a freshly generated HEADER section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// `FILE_DESCRIPTION` description.
    pub description: String,
    /// `FILE_DESCRIPTION` implementation level.
    pub implementation_level: String,
    /// `FILE_NAME` author.
    pub author: String,
    /// `FILE_NAME` organization.
    pub organization: String,
    /// `FILE_NAME` preprocessor version.
    pub preprocessor: String,
    /// `FILE_NAME` originating system.
    pub originating_system: String,
    /// `FILE_NAME` authorization.
    pub authorization: String,
    /// `FILE_SCHEMA` schema identifier.
    pub schema: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            description: "STEP assembly".into(),
            implementation_level: "2;1".into(),
            author: String::new(),
            organization: String::new(),
            preprocessor: concat!("stepasm ", env!("CARGO_PKG_VERSION")).into(),
            originating_system: "stepasm".into(),
            authorization: String::new(),
            schema: "AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }".into(),
        }
    }
}

impl HeaderConfig {
    /// Render the three header entities for a file named `file_name`.
    pub fn render(&self, file_name: &str) -> String {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        format!(
            "FILE_DESCRIPTION(({}),{});\n\
             FILE_NAME({},{},({}),({}),{},{},{});\n\
             FILE_SCHEMA(({}));",
            format_string(&self.description),
            format_string(&self.implementation_level),
            format_string(file_name),
            format_string(&stamp),
            format_string(&self.author),
            format_string(&self.organization),
            format_string(&self.preprocessor),
            format_string(&self.originating_system),
            format_string(&self.authorization),
            format_string(&self.schema),
        )
    }
}

impl EngineConfig {
    /// Load configuration from a specific file path. A missing file yields
    /// the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for header in [&self.compose.header, &self.decompose.header]
            .into_iter()
            .flatten()
        {
            if header.schema.trim().is_empty() {
                return Err(ConfigError::Invalid("header schema must not be empty".into()));
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config file at {}: {reason}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// The file is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config file at {}: {reason}", path.display())]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// Values are out of range.
    #[error("Configuration validation failed: {0}")]
    Invalid(String),
}
