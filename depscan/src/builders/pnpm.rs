//! pnpm: `pnpm ls --json`

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::npm::{PackageEntry, PackageJson, add_package_map};
use super::{
    RawOutput, ToolCommand, ToolOutput, TreeBuilder, failed_project, log_partial, new_project,
};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::{GeneralInfo, PackageType};
use crate::tree::DependencyTree;

const LIST: &str = "list";

/// One project of the `pnpm ls` array
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnpmProject {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, PackageEntry>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, PackageEntry>,
}

#[derive(Debug, Default)]
pub struct PnpmBuilder;

impl PnpmBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for PnpmBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Pnpm
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.pnpm
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![ToolCommand::new(LIST, ["ls", "--json", "--depth", "Infinity"])]
    }

    fn reads_manifest(&self) -> bool {
        true
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let manifest = PackageJson::parse(raw.manifest.as_deref());
        let text = match raw.output(LIST) {
            Some(ToolOutput::Complete(text)) => text,
            Some(ToolOutput::Partial(text, error)) => {
                log_partial(descriptor, error, "Run 'pnpm install' to install dependencies.");
                text
            }
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Pnpm,
                    manifest.name,
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => "[]",
        };

        let projects: Vec<PnpmProject> = match serde_json::from_str(text) {
            Ok(projects) => projects,
            Err(e) => {
                return failed_project(
                    descriptor,
                    PackageType::Pnpm,
                    manifest.name,
                    BuildError::ParseError(e.to_string()),
                );
            }
        };

        let project = projects.into_iter().next().unwrap_or_default();
        let name = project
            .name
            .or(manifest.name)
            .unwrap_or_else(|| super::dir_name(descriptor));
        let version = project.version.or(manifest.version).unwrap_or_default();
        let (mut tree, root) = new_project(
            descriptor,
            GeneralInfo::new(name.clone(), version, PackageType::Pnpm),
            name,
        );
        add_package_map(&mut tree, root, &project.dependencies, PackageType::Pnpm, "prod");
        add_package_map(&mut tree, root, &project.dev_dependencies, PackageType::Pnpm, "dev");
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests::child_ids;

    #[test]
    fn test_build_prod_and_dev() {
        let output = r#"[{
            "name": "site",
            "version": "1.2.0",
            "path": "/ws/site",
            "dependencies": {
                "react": {"from": "react", "version": "18.2.0", "dependencies": {
                    "loose-envify": {"from": "loose-envify", "version": "1.4.0"}
                }}
            },
            "devDependencies": {
                "vite": {"from": "vite", "version": "5.1.4"}
            }
        }]"#;
        let raw = RawOutput::default().with_output(LIST, output);
        let tree = PnpmBuilder::new().build(Path::new("/ws/site/package.json"), &raw);

        let root = tree.roots()[0];
        assert_eq!(tree.node(root).label, "site");
        assert_eq!(child_ids(&tree, root), vec!["react:18.2.0", "vite:5.1.4"]);
        let react = tree.children(root)[0];
        assert_eq!(child_ids(&tree, react), vec!["loose-envify:1.4.0"]);
        assert_eq!(tree.node(tree.children(root)[1]).info.scopes, vec!["dev"]);
        assert_eq!(tree.node(react).info.package_type, PackageType::Pnpm);
    }

    #[test]
    fn test_empty_array_yields_empty_root() {
        let raw = RawOutput::default()
            .with_output(LIST, "[]")
            .with_manifest(r#"{"name":"site"}"#);
        let tree = PnpmBuilder::new().build(Path::new("/ws/site/package.json"), &raw);
        let root = tree.roots()[0];
        assert_eq!(tree.node(root).label, "site");
        assert!(tree.children(root).is_empty());
        assert!(tree.node(root).project().unwrap().build_error.is_none());
    }
}
