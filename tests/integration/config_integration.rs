//! Integration tests for layered configuration

use crate::integration::test_utils::with_xdg_env;
use quilt::config::{ConfigLoader, DEFAULT_REGISTRY_URL};
use std::fs;
use tempfile::TempDir;

fn write_global(xdg: &TempDir, contents: &str) {
    let dir = xdg.path().join("quilt");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), contents).unwrap();
}

/// With no files and no environment, the built-in defaults apply
#[test]
fn test_defaults_without_files() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let config = with_xdg_env(&xdg, || ConfigLoader::load(workspace.path()).unwrap());
    assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
    assert!(config.validate().is_ok());
}

/// The global file lives under XDG_CONFIG_HOME
#[test]
fn test_global_file_location() {
    let xdg = TempDir::new().unwrap();
    let path = with_xdg_env(&xdg, ConfigLoader::xdg_config_path).unwrap();
    assert_eq!(path, xdg.path().join("quilt").join("config.toml"));
}

/// Workspace settings override the global file
#[test]
fn test_workspace_overrides_global() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_global(
        &xdg,
        "[registry]\nurl = \"https://global.example\"\nconcurrency = 2\n",
    );
    fs::write(
        workspace.path().join("quilt.toml"),
        "[registry]\nurl = \"https://workspace.example\"\n",
    )
    .unwrap();

    let config = with_xdg_env(&xdg, || ConfigLoader::load(workspace.path()).unwrap());
    assert_eq!(config.registry.url, "https://workspace.example");
    assert_eq!(config.registry.concurrency, 2);
}

/// Environment variables override every file
#[test]
fn test_environment_overrides_files() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("quilt.toml"),
        "[registry]\nurl = \"https://workspace.example\"\n",
    )
    .unwrap();

    let config = with_xdg_env(&xdg, || {
        std::env::set_var("QUILT__REGISTRY__URL", "https://env.example");
        ConfigLoader::load(workspace.path()).unwrap()
    });
    assert_eq!(config.registry.url, "https://env.example");
}

/// An explicit config file replaces the global and workspace files
#[test]
fn test_explicit_file_replaces_layers() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_global(&xdg, "[build]\nchunk_size = 1024\n");
    let explicit = workspace.path().join("ci.toml");
    fs::write(&explicit, "[registry]\nbatch_size = 16\n").unwrap();

    let config = with_xdg_env(&xdg, || ConfigLoader::load_from_file(&explicit).unwrap());
    assert_eq!(config.registry.batch_size, 16);
    assert_eq!(config.build.chunk_size, ConfigLoader::default().build.chunk_size);
}
