//! npm: `npm ls --json --all`

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{
    NOT_INSTALLED_SUFFIX, RawOutput, ToolCommand, ToolOutput, TreeBuilder, failed_project,
    log_partial, new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

const PROD: &str = "prod";
const DEV: &str = "dev";

/// Entry of an `npm ls` / `pnpm ls` dependency map
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageEntry {
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, PackageEntry>,
}

/// Top-level `npm ls --json` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NpmList {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, PackageEntry>,
}

/// Name and version from a package.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
}

impl PackageJson {
    pub fn parse(content: Option<&str>) -> Self {
        content
            .and_then(|c| serde_json::from_str(c).ok())
            .unwrap_or_default()
    }
}

/// Scope labels of a node: the global scope plus the npm `@scope`, if any
pub fn npm_scopes(name: &str, global: &str) -> Vec<String> {
    let mut scopes = vec![global.to_string()];
    if let Some(scope) = name
        .strip_prefix('@')
        .and_then(|rest| rest.split_once('/'))
        .map(|(scope, _)| scope)
    {
        scopes.push(scope.to_string());
    }
    scopes
}

/// Add a nested dependency map below `parent`
///
/// Entries without a version (missing or unmet packages) are skipped.
pub(crate) fn add_package_map(
    tree: &mut DependencyTree,
    parent: NodeId,
    dependencies: &BTreeMap<String, PackageEntry>,
    package_type: PackageType,
    global_scope: &str,
) {
    let mut stack: Vec<(NodeId, &String, &PackageEntry)> = dependencies
        .iter()
        .rev()
        .map(|(name, entry)| (parent, name, entry))
        .collect();

    while let Some((parent, name, entry)) = stack.pop() {
        let Some(version) = entry.version.as_deref().filter(|v| !v.is_empty()) else {
            tracing::debug!(package = %name, "Skipping dependency without a version");
            continue;
        };
        let info = GeneralInfo::new(name.as_str(), version, package_type)
            .with_scopes(npm_scopes(name, global_scope));
        let node = tree.add_child(parent, info);
        stack.extend(
            entry
                .dependencies
                .iter()
                .rev()
                .map(|(name, entry)| (node, name, entry)),
        );
    }
}

#[derive(Debug, Default)]
pub struct NpmBuilder;

impl NpmBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for NpmBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Npm
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.npm
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![
            ToolCommand::new(PROD, ["ls", "--json", "--all", "--only=prod"]),
            ToolCommand::new(DEV, ["ls", "--json", "--all", "--only=dev"]),
        ]
    }

    fn reads_manifest(&self) -> bool {
        true
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let manifest = PackageJson::parse(raw.manifest.as_deref());
        let mut lists: Vec<(&str, NpmList)> = Vec::new();
        let mut partial = false;
        let mut last_error: Option<BuildError> = None;

        for scope in [PROD, DEV] {
            let text = match raw.output(scope) {
                Some(ToolOutput::Complete(text)) => text,
                Some(ToolOutput::Partial(text, error)) => {
                    log_partial(
                        descriptor,
                        error,
                        "Run 'npm install' to install missing dependencies.",
                    );
                    partial = true;
                    text
                }
                Some(ToolOutput::Failed(error)) => {
                    last_error = Some(BuildError::NotInstalled(error.to_string()));
                    continue;
                }
                None => continue,
            };
            match serde_json::from_str::<NpmList>(text) {
                Ok(list) => lists.push((scope, list)),
                Err(e) => last_error = Some(BuildError::ParseError(e.to_string())),
            }
        }

        if lists.is_empty() {
            let error = last_error
                .unwrap_or_else(|| BuildError::NotInstalled("no output from npm ls".to_string()));
            return failed_project(descriptor, PackageType::Npm, manifest.name, error);
        }

        let name = lists
            .iter()
            .find_map(|(_, l)| l.name.clone())
            .or(manifest.name)
            .unwrap_or_else(|| super::dir_name(descriptor));
        let version = lists
            .iter()
            .find_map(|(_, l)| l.version.clone())
            .or(manifest.version)
            .unwrap_or_default();
        let label = if partial {
            format!("{name}{NOT_INSTALLED_SUFFIX}")
        } else {
            name.clone()
        };

        let (mut tree, root) = new_project(
            descriptor,
            GeneralInfo::new(name, version, PackageType::Npm),
            label,
        );
        for (scope, list) in &lists {
            add_package_map(&mut tree, root, &list.dependencies, PackageType::Npm, scope);
        }
        tree
    }
}
