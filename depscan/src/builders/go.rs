//! Go modules: `go mod graph`

use std::path::Path;

use hashbrown::HashMap;

use super::{
    RawOutput, ToolCommand, ToolOutput, TreeBuilder, add_acyclic, failed_project, log_partial,
    new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

const GRAPH: &str = "graph";
const MODULE: &str = "module";

/// Parsed `go mod graph` output
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// Requirements of the main module, as `name@version` tokens
    pub direct: Vec<String>,
    /// `name@version` -> requirements
    pub edges: HashMap<String, Vec<String>>,
}

impl ModuleGraph {
    /// Parse whitespace separated `from to` pairs
    ///
    /// Edges whose source has no `@` belong to the main module.
    pub fn parse(text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut graph = ModuleGraph::default();
        for pair in tokens.chunks_exact(2) {
            let (from, to) = (pair[0], pair[1]);
            if from.contains('@') {
                graph
                    .edges
                    .entry(from.to_string())
                    .or_default()
                    .push(to.to_string());
            } else {
                graph.direct.push(to.to_string());
            }
        }
        graph
    }
}

/// Split `name@v1.2.3` into `("name", "1.2.3")`
pub fn split_module(token: &str) -> (&str, &str) {
    token.split_once("@v").unwrap_or((token, ""))
}

#[derive(Debug, Default)]
pub struct GoBuilder;

impl GoBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Main module name from `go list -m`, falling back to the go.mod `module` line
    fn module_name(raw: &RawOutput, descriptor: &Path) -> String {
        if let Some(ToolOutput::Complete(out)) = raw.output(MODULE)
            && let Some(line) = out.lines().map(str::trim).find(|l| !l.is_empty())
        {
            return line.to_string();
        }
        raw.manifest
            .as_deref()
            .and_then(|m| {
                m.lines()
                    .filter_map(|l| l.trim().strip_prefix("module "))
                    .map(|name| name.trim().trim_matches('"').to_string())
                    .next()
            })
            .unwrap_or_else(|| super::dir_name(descriptor))
    }

    /// Expand the module graph below `root`
    pub fn populate(tree: &mut DependencyTree, root: NodeId, graph: &ModuleGraph) {
        let mut stack: Vec<(NodeId, &str)> = graph
            .direct
            .iter()
            .rev()
            .map(|token| (root, token.as_str()))
            .collect();

        while let Some((parent, token)) = stack.pop() {
            let (name, version) = split_module(token);
            let info = GeneralInfo::new(name, version, PackageType::Go);
            let Some(node) = add_acyclic(tree, parent, info) else {
                continue;
            };
            if let Some(children) = graph.edges.get(token) {
                stack.extend(children.iter().rev().map(|c| (node, c.as_str())));
            }
        }
    }
}

impl TreeBuilder for GoBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Go
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.go
    }

    fn probe_args(&self) -> &'static [&'static str] {
        &["version"]
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![
            ToolCommand::new(GRAPH, ["mod", "graph"]),
            ToolCommand::new(MODULE, ["list", "-m"]),
        ]
    }

    fn reads_manifest(&self) -> bool {
        true
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let text = match raw.output(GRAPH) {
            Some(ToolOutput::Complete(text)) => text,
            Some(ToolOutput::Partial(text, error)) => {
                log_partial(descriptor, error, "Try running 'go mod download'.");
                text
            }
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Go,
                    None,
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => {
                return failed_project(
                    descriptor,
                    PackageType::Go,
                    None,
                    BuildError::NotInstalled("no output from go mod graph".to_string()),
                );
            }
        };

        let name = Self::module_name(raw, descriptor);
        let (mut tree, root) = new_project(
            descriptor,
            GeneralInfo::new(name.clone(), "", PackageType::Go),
            name,
        );
        let graph = ModuleGraph::parse(text);
        Self::populate(&mut tree, root, &graph);
        tree
    }
}
