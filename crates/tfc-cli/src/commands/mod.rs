//! Subcommand implementations.

pub mod config;
pub mod graph;
pub mod predict;
pub mod run;
pub mod tensor;
pub mod version;

use std::path::{Path, PathBuf};

use tfc_core::{DemoError, TfcConfig};
use tracing::debug;

/// Options shared by every subcommand.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub library: Option<PathBuf>,
}

impl GlobalOptions {
    /// Path of the config file: `--config` or the platform default.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Load the configuration and apply command-line overrides.
    ///
    /// An explicit `--config` must exist; the default file is optional.
    pub fn load_config(&self) -> Result<TfcConfig, DemoError> {
        let path = self.config_path();
        let mut config = if self.config.is_some() || path.exists() {
            debug!("Loading config from {}", path.display());
            TfcConfig::from_file(&path).map_err(|e| DemoError::Config(e.to_string()))?
        } else {
            TfcConfig::default()
        };

        if let Some(library) = &self.library {
            config.runtime.library_override = Some(library.clone());
        }
        Ok(config)
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tfc")
        .join("config.json")
}

/// Graph path from the command line, falling back to the config.
pub fn graph_path<'a>(arg: Option<&'a Path>, config: &'a TfcConfig) -> &'a Path {
    arg.unwrap_or(&config.graph.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_flag_becomes_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut saved = TfcConfig::default();
        saved.runtime.library = Some(PathBuf::from("/from/config.so"));
        saved.save(&path).unwrap();

        let options = GlobalOptions {
            config: Some(path),
            library: Some(PathBuf::from("/from/flag.so")),
        };
        let config = options.load_config().unwrap();
        assert_eq!(config.runtime.library, Some(PathBuf::from("/from/config.so")));
        assert_eq!(
            config.runtime.library_override,
            Some(PathBuf::from("/from/flag.so"))
        );
        assert_eq!(
            config.runtime.resolve_library(),
            Some(PathBuf::from("/from/flag.so"))
        );
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let options = GlobalOptions {
            config: Some(PathBuf::from("/nonexistent/tfc.json")),
            library: None,
        };
        assert!(matches!(options.load_config(), Err(DemoError::Config(_))));
    }
}
