//! Config loading entry points

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::QuiltConfig;
use crate::error::ApiError;
use config::{File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then `quilt.toml` in `workspace_root`,
    /// then environment overrides
    pub fn load(workspace_root: &Path) -> Result<QuiltConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        let config: QuiltConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Defaults, then `path` in place of the file layers, then environment
    /// overrides
    pub fn load_from_file(path: &Path) -> Result<QuiltConfig, ApiError> {
        if !path.is_file() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
        let builder = environment::add_to_builder(builder);
        let config: QuiltConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Location of the user's global config file
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Built-in defaults only
    pub fn default() -> QuiltConfig {
        QuiltConfig::default()
    }
}
