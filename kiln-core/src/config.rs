//! Configuration parsing and management.

use kiln_types::{IdentifierStyle, Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Main configuration struct matching the kiln.yml schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    #[serde(default = "default_layouts_dir")]
    pub layouts_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Directories whose files count as site code for change detection.
    #[serde(default)]
    pub code_dirs: Vec<PathBuf>,

    /// Extensions treated as textual content; everything else is
    /// binary and fingerprinted by size and mtime.
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,

    #[serde(default)]
    pub identifier_style: IdentifierStyle,

    /// Site-wide fallback attributes, consulted when an item does not
    /// define a key itself.
    #[serde(default)]
    pub defaults: Option<serde_yaml::Value>,

    /// Free-form settings exposed to filters.
    #[serde(default)]
    pub extra: Option<serde_yaml::Value>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_layouts_dir() -> PathBuf {
    PathBuf::from("layouts")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".kiln")
}

fn default_text_extensions() -> Vec<String> {
    ["md", "markdown", "html", "htm", "txt", "xml", "css", "js", "json", "yml", "yaml", "svg"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            content_dir: default_content_dir(),
            layouts_dir: default_layouts_dir(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            code_dirs: Vec::new(),
            text_extensions: default_text_extensions(),
            identifier_style: IdentifierStyle::default(),
            defaults: None,
            extra: None,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.resolve_path(&self.content_dir)
    }

    pub fn layouts_dir(&self) -> PathBuf {
        self.resolve_path(&self.layouts_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.resolve_path(&self.state_dir)
    }

    pub fn code_dirs(&self) -> Vec<PathBuf> {
        self.code_dirs.iter().map(|p| self.resolve_path(p)).collect()
    }

    pub fn dependency_store_path(&self) -> PathBuf {
        self.state_dir().join("dependencies.json")
    }

    pub fn checksum_store_path(&self) -> PathBuf {
        self.state_dir().join("checksums.json")
    }

    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Site-wide fallback attributes as a value map.
    pub fn default_attributes(&self) -> ValueMap {
        self.defaults
            .clone()
            .map(Value::from)
            .and_then(|v| v.as_map().cloned())
            .unwrap_or_default()
    }

    /// Look up a free-form setting under `extra`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let extra = self.extra.clone().map(Value::from)?;
        extra.as_map()?.get(key).cloned()
    }

    /// The whole configuration as a structured value, for
    /// fingerprinting.
    pub fn to_value(&self) -> Value {
        match serde_yaml::to_value(self) {
            Ok(yaml) => Value::from(yaml),
            Err(e) => Value::Opaque(format!("config:{e}")),
        }
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}
