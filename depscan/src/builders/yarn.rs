//! Yarn classic: `yarn list --json`

use std::path::Path;

use serde::Deserialize;

use super::npm::PackageJson;
use super::{
    RawOutput, ToolCommand, ToolOutput, TreeBuilder, failed_project, log_partial, new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

const LIST: &str = "list";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YarnTreeEntry {
    /// `name@version`
    pub name: String,
    #[serde(default)]
    pub children: Vec<YarnTreeEntry>,
    /// Hoisted placeholder without an exact version
    #[serde(default)]
    pub shadow: bool,
}

#[derive(Debug, Deserialize)]
struct YarnMessage {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct YarnTreeData {
    #[serde(default)]
    trees: Vec<YarnTreeEntry>,
}

/// Find the `tree` message among yarn's JSON lines
pub fn parse_trees(output: &str) -> Option<Vec<YarnTreeEntry>> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<YarnMessage>(line).ok())
        .find(|msg| msg.kind == "tree")
        .and_then(|msg| serde_json::from_value::<YarnTreeData>(msg.data).ok())
        .map(|data| data.trees)
}

/// Split `name@version`, keeping a leading `@` of scoped packages
pub fn split_name_version(value: &str) -> (&str, &str) {
    match value.rfind('@') {
        Some(0) | None => (value, ""),
        Some(idx) => (&value[..idx], &value[idx + 1..]),
    }
}

fn add_entries(tree: &mut DependencyTree, parent: NodeId, entries: &[YarnTreeEntry]) {
    let mut stack: Vec<(NodeId, &YarnTreeEntry)> =
        entries.iter().rev().map(|e| (parent, e)).collect();
    while let Some((parent, entry)) = stack.pop() {
        if entry.shadow {
            continue;
        }
        let (name, version) = split_name_version(&entry.name);
        if version.is_empty() {
            continue;
        }
        let node = tree.add_child(parent, GeneralInfo::new(name, version, PackageType::Yarn));
        stack.extend(entry.children.iter().rev().map(|c| (node, c)));
    }
}

#[derive(Debug, Default)]
pub struct YarnBuilder;

impl YarnBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for YarnBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Yarn
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.yarn
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![ToolCommand::new(LIST, ["list", "--json", "--no-progress"])]
    }

    fn reads_manifest(&self) -> bool {
        true
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let manifest = PackageJson::parse(raw.manifest.as_deref());
        let text = match raw.output(LIST) {
            Some(ToolOutput::Complete(text)) => text,
            Some(ToolOutput::Partial(text, error)) => {
                log_partial(descriptor, error, "Run 'yarn install' to install dependencies.");
                text
            }
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Yarn,
                    manifest.name,
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => "",
        };

        let Some(trees) = parse_trees(text) else {
            return failed_project(
                descriptor,
                PackageType::Yarn,
                manifest.name,
                BuildError::ParseError("no tree in yarn list output".to_string()),
            );
        };

        let name = manifest
            .name
            .unwrap_or_else(|| super::dir_name(descriptor));
        let (mut tree, root) = new_project(
            descriptor,
            GeneralInfo::new(name.clone(), manifest.version.unwrap_or_default(), PackageType::Yarn),
            name,
        );
        add_entries(&mut tree, root, &trees);
        tree
    }
}
