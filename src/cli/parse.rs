//! CLI parse: clap types for quilt. No behavior; definitions only.

use crate::types::PackageRef;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// quilt - build, push, and install content-addressed data packages
#[derive(Parser, Debug)]
#[command(name = "quilt")]
#[command(about = "Build, push, and install content-addressed data packages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (where quilt.toml is looked up)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (replaces the global and workspace files)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build a directory or build file into a package
    Build {
        /// Package name (owner/name)
        package: PackageRef,
        /// Source directory or build file
        path: PathBuf,
    },
    /// Write a build file listing every file in a directory
    Generate {
        directory: PathBuf,
    },
    /// Upload the latest local build of a package
    Push {
        package: PackageRef,
        /// Upload every fragment even if the registry reports it present
        #[arg(long)]
        reupload: bool,
    },
    /// Download a package and write its files
    Install {
        package: PackageRef,
        /// Install an exact package hash
        #[arg(short = 'x', long)]
        hash: Option<String>,
        /// Install a version
        #[arg(short = 'v', long)]
        version: Option<String>,
        /// Install a tag (default: latest)
        #[arg(short = 't', long)]
        tag: Option<String>,
        /// Overwrite files that differ from the package
        #[arg(short = 'f', long)]
        force: bool,
        /// Destination directory (default: {install.root}/{owner}/{name})
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Manage versions
    Version {
        #[command(subcommand)]
        command: VersionCommands,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Manage who can read a package
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },
    /// Show the build history of a package
    Log {
        package: PackageRef,
    },
    /// List local builds, or an owner's packages on the registry
    Ls {
        /// List packages published by this user instead
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show the contents of the latest local build
    Inspect {
        package: PackageRef,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Forget the local build record of a package
    Rm {
        package: PackageRef,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum VersionCommands {
    /// Point a new version at a package hash
    Add {
        package: PackageRef,
        version: String,
        hash: String,
    },
    /// List versions
    List {
        package: PackageRef,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommands {
    /// Point a tag at a package hash, replacing any previous target
    Add {
        package: PackageRef,
        tag: String,
        hash: String,
    },
    /// Remove a tag
    Remove {
        package: PackageRef,
        tag: String,
    },
    /// List tags
    List {
        package: PackageRef,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccessCommands {
    /// Grant a user read access
    Add {
        package: PackageRef,
        user: String,
    },
    /// Revoke a user's access
    Remove {
        package: PackageRef,
        user: String,
    },
    /// List users with access
    List {
        package: PackageRef,
    },
}
