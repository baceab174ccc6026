//! Build files
//!
//! A build file describes package contents instead of mirroring a directory.
//! YAML (`build.yml`) and TOML (`build.toml`) are accepted:
//!
//! ```yaml
//! contents:
//!   weather:
//!     stations:
//!       file: raw/stations.csv
//!       transform: text
//!     readings:
//!       file: raw/readings.bin
//! ```
//!
//! A mapping with a string `file` key is a leaf; any other mapping is a
//! group. Logical paths are the group keys joined with `/`. Leaf files are
//! relative to the build file's directory.

use crate::error::ApiError;
use crate::tree::path;
use crate::tree::walker::{Walker, WalkerConfig};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name written by `generate`
pub const DEFAULT_BUILD_FILE: &str = "build.yml";

const KEY_CONTENTS: &str = "contents";
const KEY_FILE: &str = "file";
const KEY_TRANSFORM: &str = "transform";

/// How a source file is turned into package bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Bytes are used unchanged
    Raw,
    /// UTF-8 text with line endings normalized to `\n`
    Text,
}

impl Transform {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "raw" | "id" => Some(Transform::Raw),
            "text" => Some(Transform::Text),
            _ => None,
        }
    }

    pub fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>, String> {
        match self {
            Transform::Raw => Ok(bytes),
            Transform::Text => {
                let text = String::from_utf8(bytes).map_err(|e| format!("not UTF-8: {}", e))?;
                Ok(text.replace("\r\n", "\n").into_bytes())
            }
        }
    }
}

/// One leaf of a build file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEntry {
    pub logical: String,
    pub source: PathBuf,
    pub transform: Transform,
}

/// Parsed build file, entries sorted by logical path
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub path: PathBuf,
    pub entries: Vec<BuildEntry>,
}

impl BuildFile {
    /// Read and parse a build file
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::SourceNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(parse_error(path, format!("unreadable: {}", e))),
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(path, &text, base)
    }

    /// Parse build file text; `base` is where leaf files are resolved from
    pub fn parse(path: &Path, text: &str, base: &Path) -> Result<Self, ApiError> {
        let document: Value = if is_toml(path) {
            toml::from_str(text).map_err(|e| parse_error(path, e.to_string()))?
        } else {
            serde_yaml::from_str(text).map_err(|e| parse_error(path, e.to_string()))?
        };

        let contents = document
            .as_object()
            .and_then(|doc| doc.get(KEY_CONTENTS))
            .ok_or_else(|| parse_error(path, "missing top-level `contents`".to_string()))?;
        let contents = contents
            .as_object()
            .ok_or_else(|| parse_error(path, "`contents` must be a mapping".to_string()))?;

        let mut entries = Vec::new();
        collect_group(path, base, contents, &[], &mut entries)?;
        entries.sort_by(|a, b| a.logical.cmp(&b.logical));
        if let Some(pair) = entries.windows(2).find(|w| w[0].logical == w[1].logical) {
            return Err(parse_error(
                path,
                format!(
                    "{} and {} both map to node {:?}",
                    pair[0].source.display(),
                    pair[1].source.display(),
                    pair[1].logical
                ),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn parse_error(path: &Path, message: String) -> ApiError {
    ApiError::ManifestParseError {
        path: path.to_path_buf(),
        message,
    }
}

fn collect_group(
    path: &Path,
    base: &Path,
    group: &Map<String, Value>,
    prefix: &[String],
    out: &mut Vec<BuildEntry>,
) -> Result<(), ApiError> {
    for (key, node) in group {
        let component = path::normalize_logical(key)
            .ok()
            .filter(|c| !c.contains('/'))
            .ok_or_else(|| parse_error(path, format!("invalid node name {:?}", key)))?;

        let mut parts = prefix.to_vec();
        parts.push(component);
        let logical = parts.join("/");

        let node = node
            .as_object()
            .ok_or_else(|| parse_error(path, format!("node {:?} must be a mapping", logical)))?;

        match node.get(KEY_FILE) {
            Some(Value::String(file)) => out.push(leaf(path, base, &logical, file, node)?),
            _ => collect_group(path, base, node, &parts, out)?,
        }
    }
    Ok(())
}

fn leaf(
    path: &Path,
    base: &Path,
    logical: &str,
    file: &str,
    node: &Map<String, Value>,
) -> Result<BuildEntry, ApiError> {
    if let Some(unknown) = node
        .keys()
        .find(|k| k.as_str() != KEY_FILE && k.as_str() != KEY_TRANSFORM)
    {
        return Err(parse_error(
            path,
            format!("unknown key {:?} in node {:?}", unknown, logical),
        ));
    }

    let transform = match node.get(KEY_TRANSFORM) {
        None => Transform::Raw,
        Some(Value::String(name)) => Transform::parse(name).ok_or_else(|| {
            parse_error(path, format!("unknown transform {:?} in node {:?}", name, logical))
        })?,
        Some(_) => {
            return Err(parse_error(
                path,
                format!("transform of node {:?} must be a string", logical),
            ))
        }
    };

    Ok(BuildEntry {
        logical: logical.to_string(),
        source: base.join(file),
        transform,
    })
}

/// Write a build file listing every file under `directory`
///
/// Each file becomes a `raw` leaf; subdirectories become groups.
pub fn generate(directory: &Path, walker_config: WalkerConfig) -> Result<PathBuf, ApiError> {
    if !directory.is_dir() {
        return Err(ApiError::SourceNotFound(directory.to_path_buf()));
    }
    let target = directory.join(DEFAULT_BUILD_FILE);
    if target.exists() {
        return Err(ApiError::WouldOverwrite(target));
    }

    let root = path::canonicalize_path(directory)?;
    let files = Walker::with_config(root, walker_config).walk()?;

    let mut contents = Map::new();
    for file in &files {
        let parts: Vec<&str> = file.logical.split('/').collect();
        let (name, groups) = match parts.split_last() {
            Some(split) => split,
            None => continue,
        };
        let mut group = &mut contents;
        for part in groups {
            group = group
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| parse_error(&target, format!("conflicting node {:?}", part)))?;
        }
        let mut leaf = Map::new();
        leaf.insert(KEY_FILE.to_string(), Value::String(file.logical.clone()));
        group.insert(name.to_string(), Value::Object(leaf));
    }

    let mut document = Map::new();
    document.insert(KEY_CONTENTS.to_string(), Value::Object(contents));
    let text = serde_yaml::to_string(&Value::Object(document))
        .map_err(|e| ApiError::Serialization(format!("Failed to render build file: {}", e)))?;

    fs::write(&target, text).map_err(|e| {
        ApiError::StorageError(crate::error::StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {:?}: {}", target, e),
        )))
    })?;

    info!(path = %target.display(), files = files.len(), "Generated build file");
    Ok(target)
}
