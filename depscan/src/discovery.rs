//! Descriptor lookup on disk

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::model::PackageType;
use crate::tree::factory::DescriptorMap;

/// Directories never descended into
const PRUNED_DIRS: &[&str] = &["node_modules", ".git", "target", "vendor", "venv", ".venv"];

fn should_prune(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && PRUNED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

/// Rank of a Python descriptor; lower wins within one directory
fn python_rank(file_name: &str) -> Option<u8> {
    if file_name.starts_with("requirements") && file_name.ends_with(".txt") {
        Some(0)
    } else if file_name == "setup.py" {
        Some(1)
    } else if file_name == "pyproject.toml" {
        Some(2)
    } else {
        None
    }
}

fn node_package_type(dir: &Path) -> PackageType {
    if dir.join("yarn.lock").is_file() {
        PackageType::Yarn
    } else if dir.join("pnpm-lock.yaml").is_file() {
        PackageType::Pnpm
    } else {
        PackageType::Npm
    }
}

/// Drop every pom.xml that sits below the directory of another one
///
/// Modules are built as part of their parent reactor.
fn outermost_poms(mut poms: Vec<PathBuf>) -> Vec<PathBuf> {
    poms.sort_by_key(|p| p.components().count());
    let mut roots: Vec<PathBuf> = Vec::new();
    for pom in poms {
        let Some(dir) = pom.parent() else {
            continue;
        };
        if roots.iter().any(|root| dir.starts_with(root)) {
            tracing::debug!(pom = %pom.display(), "Skipping Maven module descriptor");
            continue;
        }
        roots.push(dir.to_path_buf());
    }
    roots.sort();
    roots.into_iter().map(|dir| dir.join("pom.xml")).collect()
}

/// Find every project descriptor below `workspace`
///
/// Paths matching one of the configured exclude patterns (relative to the
/// workspace) are skipped.
pub fn discover(workspace: &Path, config: &Config) -> DescriptorMap {
    let mut found = DescriptorMap::new();
    let mut poms: Vec<PathBuf> = Vec::new();
    let mut python: BTreeMap<PathBuf, (u8, PathBuf)> = BTreeMap::new();
    let mut errors = 0usize;

    let walker = WalkDir::new(workspace)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !should_prune(e));

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable path: {}", e);
                errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(workspace).unwrap_or(path);
        if config.is_excluded(relative) {
            tracing::debug!(path = %relative.display(), "Descriptor excluded by configuration");
            continue;
        }
        let Some(dir) = path.parent() else {
            continue;
        };
        let file_name = entry.file_name().to_string_lossy();

        let package_type = match file_name.as_ref() {
            "go.mod" => PackageType::Go,
            "pom.xml" => {
                poms.push(path.to_path_buf());
                continue;
            }
            "package.json" => node_package_type(dir),
            name if name.ends_with(".sln") => PackageType::Nuget,
            name => {
                if let Some(rank) = python_rank(name) {
                    let candidate = (rank, path.to_path_buf());
                    python
                        .entry(dir.to_path_buf())
                        .and_modify(|current| {
                            if candidate.0 < current.0 {
                                *current = candidate.clone();
                            }
                        })
                        .or_insert(candidate);
                }
                continue;
            }
        };
        found
            .entry(package_type)
            .or_default()
            .push(path.to_path_buf());
    }

    let poms = outermost_poms(poms);
    if !poms.is_empty() {
        found.entry(PackageType::Maven).or_default().extend(poms);
    }
    if !python.is_empty() {
        found
            .entry(PackageType::Python)
            .or_default()
            .extend(python.into_values().map(|(_, path)| path));
    }
    if errors > 0 {
        tracing::warn!("Encountered {} errors while walking {}", errors, workspace.display());
    }

    let total: usize = found.values().map(Vec::len).sum();
    tracing::info!(workspace = %workspace.display(), descriptors = total, "Discovered descriptors");
    found
}
