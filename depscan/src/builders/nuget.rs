//! NuGet: `nuget-deps-tree --solution <sln>`

use std::path::Path;

use serde::Deserialize;

use super::{
    RawOutput, ToolCommand, ToolOutput, TreeBuilder, failed_project, log_partial, new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

const TREE: &str = "tree";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NugetDependency {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<NugetDependency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NugetProject {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<NugetDependency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NugetSolution {
    #[serde(default)]
    pub projects: Vec<NugetProject>,
}

fn add_dependencies(tree: &mut DependencyTree, parent: NodeId, deps: &[NugetDependency]) {
    let mut stack: Vec<(NodeId, &NugetDependency)> = deps.iter().rev().map(|d| (parent, d)).collect();
    while let Some((parent, dep)) = stack.pop() {
        let node = tree.add_child(
            parent,
            GeneralInfo::new(dep.id.as_str(), dep.version.as_str(), PackageType::Nuget),
        );
        stack.extend(dep.dependencies.iter().rev().map(|d| (node, d)));
    }
}

#[derive(Debug, Default)]
pub struct NugetBuilder;

impl NugetBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for NugetBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Nuget
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.nuget_deps_tree
    }

    fn commands(&self, descriptor: &Path) -> Vec<ToolCommand> {
        vec![ToolCommand::new(
            TREE,
            ["--solution".to_string(), descriptor.display().to_string()],
        )]
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let text = match raw.output(TREE) {
            Some(ToolOutput::Complete(text)) => text,
            Some(ToolOutput::Partial(text, error)) => {
                log_partial(descriptor, error, "Try running 'dotnet restore'.");
                text
            }
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Nuget,
                    None,
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => "{}",
        };

        let solution: NugetSolution = match serde_json::from_str(text) {
            Ok(solution) => solution,
            Err(e) => {
                return failed_project(
                    descriptor,
                    PackageType::Nuget,
                    None,
                    BuildError::ParseError(e.to_string()),
                );
            }
        };

        if solution.projects.is_empty() {
            let name = super::dir_name(descriptor);
            let (tree, _) = new_project(
                descriptor,
                GeneralInfo::new(name.clone(), "", PackageType::Nuget),
                name,
            );
            return tree;
        }

        let mut tree = DependencyTree::new();
        for project in &solution.projects {
            let info = GeneralInfo::new(project.name.as_str(), "", PackageType::Nuget)
                .with_path(super::project_dir(descriptor));
            let root = tree.add_root(tree.top(), info, project.name.as_str());
            add_dependencies(&mut tree, root, &project.dependencies);
        }
        tree
    }
}
