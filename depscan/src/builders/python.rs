//! Python: `pipdeptree --json-tree` in the active interpreter

use std::path::Path;

use serde::Deserialize;

use super::{
    RawOutput, ToolCommand, ToolOutput, TreeBuilder, add_acyclic, failed_project, log_partial,
    new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

const TREE: &str = "tree";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipPackage {
    pub key: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub installed_version: String,
    #[serde(default)]
    pub dependencies: Vec<PipPackage>,
}

impl PipPackage {
    fn name(&self) -> &str {
        if self.package_name.is_empty() {
            &self.key
        } else {
            &self.package_name
        }
    }
}

fn add_packages(tree: &mut DependencyTree, parent: NodeId, packages: &[PipPackage]) {
    let mut stack: Vec<(NodeId, &PipPackage)> =
        packages.iter().rev().map(|p| (parent, p)).collect();
    while let Some((parent, package)) = stack.pop() {
        // `?` marks a requirement that is not installed
        if package.installed_version.is_empty() || package.installed_version == "?" {
            tracing::debug!(package = %package.key, "Skipping package that is not installed");
            continue;
        }
        let info = GeneralInfo::new(
            package.name().to_lowercase(),
            package.installed_version.as_str(),
            PackageType::Python,
        );
        let Some(node) = add_acyclic(tree, parent, info) else {
            continue;
        };
        stack.extend(package.dependencies.iter().rev().map(|d| (node, d)));
    }
}

#[derive(Debug, Default)]
pub struct PythonBuilder;

impl PythonBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for PythonBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Python
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.python
    }

    fn probe_args(&self) -> &'static [&'static str] {
        &["-m", "pipdeptree", "--version"]
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![ToolCommand::new(TREE, ["-m", "pipdeptree", "--json-tree"])]
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let text = match raw.output(TREE) {
            Some(ToolOutput::Complete(text)) => text,
            Some(ToolOutput::Partial(text, error)) => {
                log_partial(descriptor, error, "Check the active virtual environment.");
                text
            }
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Python,
                    Some(super::dir_name(descriptor)),
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => "[]",
        };

        let packages: Vec<PipPackage> = match serde_json::from_str(text) {
            Ok(packages) => packages,
            Err(e) => {
                return failed_project(
                    descriptor,
                    PackageType::Python,
                    Some(super::dir_name(descriptor)),
                    BuildError::ParseError(e.to_string()),
                );
            }
        };

        let name = super::dir_name(descriptor);
        let (mut tree, root) = new_project(
            descriptor,
            GeneralInfo::new(name.clone(), "", PackageType::Python),
            name,
        );
        add_packages(&mut tree, root, &packages);
        tree
    }
}
