//! CLI route: single route table and run context. Dispatches to the package
//! API and presentation.

use crate::api::PackageApi;
use crate::cli::parse::{AccessCommands, Commands, TagCommands, VersionCommands};
use crate::cli::presentation;
use crate::config::{ConfigLoader, QuiltConfig};
use crate::error::ApiError;
use crate::resolve::Selector;
use crate::types::parse_hash;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runtime context for CLI execution: loaded config and the package API.
pub struct RunContext {
    api: PackageApi,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        let api = PackageApi::open(config)?;
        Ok(Self {
            api,
            workspace_root,
        })
    }

    /// Wrap an already-built API (used by tests).
    pub fn with_api(api: PackageApi, workspace_root: PathBuf) -> Self {
        Self {
            api,
            workspace_root,
        }
    }

    pub fn api(&self) -> &PackageApi {
        &self.api
    }

    /// Paths on the command line are relative to the workspace.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        debug!(command = ?command, "Executing command");
        match command {
            Commands::Build { package, path } => {
                let output = self.api.build(package, &self.resolve_path(path))?;
                Ok(presentation::format_build_result(package, &output))
            }
            Commands::Generate { directory } => {
                let path = self.api.generate(&self.resolve_path(directory))?;
                Ok(presentation::format_generate_result(&path))
            }
            Commands::Push { package, reupload } => {
                let report = self.api.push(package, *reupload).await?;
                Ok(presentation::format_push_report(package, &report))
            }
            Commands::Install {
                package,
                hash,
                version,
                tag,
                force,
                dest,
            } => {
                let selector =
                    Selector::from_options(hash.as_deref(), version.as_deref(), tag.as_deref())?;
                let destination = match dest {
                    Some(dest) => self.resolve_path(dest),
                    None => self.resolve_path(&self.api.config().install.destination_for(package)),
                };
                let report = self
                    .api
                    .install(package, &selector, Some(&destination), *force)
                    .await?;
                Ok(presentation::format_install_report(
                    package,
                    &destination,
                    &report,
                ))
            }
            Commands::Version { command } => self.handle_version(command).await,
            Commands::Tag { command } => self.handle_tag(command).await,
            Commands::Access { command } => self.handle_access(command).await,
            Commands::Log { package } => {
                let builds = self.api.log(package).await?;
                Ok(presentation::format_log(&builds))
            }
            Commands::Ls { owner } => match owner {
                Some(owner) => {
                    let packages = self.api.list_remote(owner).await?;
                    Ok(presentation::format_packages(owner, &packages))
                }
                None => Ok(presentation::format_local_builds(&self.api.local_builds()?)),
            },
            Commands::Inspect { package, format } => {
                let (build, tree) = self.api.inspect(package)?;
                match format.as_str() {
                    "json" => presentation::format_tree_json(&build, &tree),
                    "text" => Ok(presentation::format_tree_text(&build, &tree)),
                    other => Err(ApiError::ConfigError(format!(
                        "Unknown output format: {} (expected text or json)",
                        other
                    ))),
                }
            }
            Commands::Rm { package } => {
                self.api.remove_local(package)?;
                Ok(format!("Removed local build record for {}", package))
            }
        }
    }

    async fn handle_version(&self, command: &VersionCommands) -> Result<String, ApiError> {
        match command {
            VersionCommands::Add {
                package,
                version,
                hash,
            } => {
                let hash = parse_hash(hash)?;
                self.api.version_add(package, version, &hash).await?;
                Ok(format!("{} version {} -> {}", package, version, hex::encode(hash)))
            }
            VersionCommands::List { package } => {
                Ok(presentation::format_versions(&self.api.version_list(package).await?))
            }
        }
    }

    async fn handle_tag(&self, command: &TagCommands) -> Result<String, ApiError> {
        match command {
            TagCommands::Add { package, tag, hash } => {
                let hash = parse_hash(hash)?;
                self.api.tag_add(package, tag, &hash).await?;
                Ok(format!("{} tag {} -> {}", package, tag, hex::encode(hash)))
            }
            TagCommands::Remove { package, tag } => {
                self.api.tag_remove(package, tag).await?;
                Ok(format!("Removed tag {} from {}", tag, package))
            }
            TagCommands::List { package } => {
                Ok(presentation::format_tags(&self.api.tag_list(package).await?))
            }
        }
    }

    async fn handle_access(&self, command: &AccessCommands) -> Result<String, ApiError> {
        match command {
            AccessCommands::Add { package, user } => {
                self.api.access_add(package, user).await?;
                Ok(format!("Granted {} access to {}", user, package))
            }
            AccessCommands::Remove { package, user } => {
                self.api.access_remove(package, user).await?;
                Ok(format!("Revoked {}'s access to {}", user, package))
            }
            AccessCommands::List { package } => {
                Ok(presentation::format_users(&self.api.access_list(package).await?))
            }
        }
    }
}

/// Load and validate configuration. Uses ConfigLoader only.
pub fn load_config(workspace_root: &Path, config_path: Option<&Path>) -> Result<QuiltConfig, ApiError> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };
    config.validate().map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ApiError::ConfigError(format!(
            "Configuration validation failed:\n{}",
            messages.join("\n")
        ))
    })?;
    Ok(config)
}
