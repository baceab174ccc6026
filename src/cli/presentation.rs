//! CLI presentation: text and json formatters per command family.

use crate::error::ApiError;
use crate::registry::{BuildRecord, TagEntry, VersionEntry};
use crate::store::LocalBuild;
use crate::sync::{InstallReport, PushReport};
use crate::tree::{BuildOutput, FragmentTree};
use crate::types::{hash_to_hex, short_hex, PackageRef};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::Path;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

pub fn format_build_result(package: &PackageRef, output: &BuildOutput) -> String {
    format!(
        "Built {} ({} files, {} bytes)\n{}",
        package.bold(),
        output.tree.entries.len(),
        output.tree.total_size(),
        hash_to_hex(&output.root_hash)
    )
}

pub fn format_generate_result(path: &Path) -> String {
    format!("Generated {}", path.display())
}

pub fn format_push_report(package: &PackageRef, report: &PushReport) -> String {
    format!(
        "Pushed {} {}\nFragments: {} uploaded, {} already present",
        package.bold(),
        short_hex(&report.root_hash).green(),
        report.uploaded,
        report.skipped
    )
}

pub fn format_install_report(package: &PackageRef, destination: &Path, report: &InstallReport) -> String {
    format!(
        "Installed {} {} into {}\nFiles: {} written, {} unchanged\nFragments: {} downloaded, {} reused",
        package.bold(),
        short_hex(&report.root_hash).green(),
        destination.display(),
        report.files_written,
        report.files_unchanged,
        report.downloaded,
        report.reused
    )
}

pub fn format_versions(versions: &[VersionEntry]) -> String {
    if versions.is_empty() {
        return "No versions".to_string();
    }
    let mut t = table(vec!["Version", "Hash"]);
    for v in versions {
        t.add_row(vec![v.version.clone(), hash_to_hex(&v.hash)]);
    }
    t.to_string()
}

pub fn format_tags(tags: &[TagEntry]) -> String {
    if tags.is_empty() {
        return "No tags".to_string();
    }
    let mut t = table(vec!["Tag", "Hash"]);
    for tag in tags {
        t.add_row(vec![tag.tag.clone(), hash_to_hex(&tag.hash)]);
    }
    t.to_string()
}

pub fn format_log(builds: &[BuildRecord]) -> String {
    if builds.is_empty() {
        return "No builds".to_string();
    }
    let mut t = table(vec!["Hash", "Created", "Author"]);
    for b in builds {
        t.add_row(vec![
            hash_to_hex(&b.hash),
            b.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            b.author.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    t.to_string()
}

pub fn format_local_builds(builds: &[LocalBuild]) -> String {
    if builds.is_empty() {
        return "No local builds".to_string();
    }
    let mut t = table(vec!["Package", "Hash", "Built", "Source"]);
    for b in builds {
        t.add_row(vec![
            b.package.to_string(),
            short_hex(&b.root_hash),
            b.built_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            b.source.clone(),
        ]);
    }
    t.to_string()
}

pub fn format_packages(owner: &str, packages: &[PackageRef]) -> String {
    if packages.is_empty() {
        return format!("No packages published by {}", owner);
    }
    packages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_users(users: &[String]) -> String {
    users.join("\n")
}

pub fn format_tree_text(build: &LocalBuild, tree: &FragmentTree) -> String {
    let mut out = format!(
        "{} {}\nSource: {}\n",
        build.package.bold(),
        hash_to_hex(&build.root_hash),
        build.source
    );
    for (key, value) in &tree.metadata {
        out.push_str(&format!("{}: {}\n", key.dimmed(), value));
    }
    let mut t = table(vec!["Path", "Size", "Mode", "Fragments"]);
    for (logical, entry) in &tree.entries {
        t.add_row(vec![
            logical.clone(),
            entry.size.to_string(),
            format!("{:o}", entry.mode),
            entry.fragments.len().to_string(),
        ]);
    }
    out.push_str(&t.to_string());
    out
}

pub fn format_tree_json(build: &LocalBuild, tree: &FragmentTree) -> Result<String, ApiError> {
    let value = serde_json::json!({
        "package": build.package.to_string(),
        "hash": hash_to_hex(&build.root_hash),
        "source": build.source,
        "built_at": build.built_at,
        "manifest": tree,
    });
    serde_json::to_string_pretty(&value).map_err(|e| ApiError::Serialization(e.to_string()))
}
