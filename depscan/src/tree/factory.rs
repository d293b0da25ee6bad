//! Fans descriptors out to the ecosystem builders and assembles the workspace tree

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use super::{DependencyTree, NodeId};
use crate::builders::{TreeBuilder, builder_for, collect};
use crate::command::CommandRunner;
use crate::config::ToolsConfig;
use crate::error::ScanError;
use crate::model::PackageType;

/// Descriptor paths grouped by ecosystem
pub type DescriptorMap = BTreeMap<PackageType, Vec<PathBuf>>;

pub struct TreeFactory {
    runner: Arc<dyn CommandRunner>,
    tools: ToolsConfig,
}

impl TreeFactory {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: ToolsConfig) -> Self {
        Self { runner, tools }
    }

    /// Build one tree holding every project root found in `descriptors`
    ///
    /// Ecosystems whose tool is not installed are skipped with a warning.
    /// Builders run concurrently; cancellation is checked before each of
    /// them starts and once all of them are done.
    pub async fn build(
        &self,
        descriptors: &DescriptorMap,
        cancel: &CancellationToken,
    ) -> Result<DependencyTree, ScanError> {
        let mut planned: Vec<(&'static dyn TreeBuilder, &PathBuf)> = Vec::new();
        for (package_type, paths) in descriptors {
            if paths.is_empty() {
                continue;
            }
            let Some(builder) = builder_for(*package_type) else {
                continue;
            };
            let program = builder.program(&self.tools);
            if !self.runner.probe(program, builder.probe_args()).await {
                tracing::warn!(
                    ecosystem = %package_type,
                    program = %program,
                    "Build tool is not installed, skipping {} project(s)",
                    paths.len()
                );
                continue;
            }
            planned.extend(paths.iter().map(|p| (builder, p)));
        }

        let jobs = planned.iter().map(|(builder, descriptor)| async move {
            if cancel.is_cancelled() {
                return None;
            }
            tracing::info!(descriptor = %descriptor.display(), "Building dependency tree");
            let raw = collect(*builder, self.runner.as_ref(), &self.tools, descriptor).await;
            Some(builder.build(descriptor, &raw))
        });
        let fragments = join_all(jobs).await;

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let mut tree = DependencyTree::new();
        let top = tree.top();
        for ((_, descriptor), fragment) in planned.iter().zip(fragments) {
            let Some(fragment) = fragment else {
                continue;
            };
            if fragment.is_empty() {
                tracing::debug!(descriptor = %descriptor.display(), "Descriptor produced no tree");
                continue;
            }
            tree.graft(top, fragment);
        }
        flatten_sub_roots(&mut tree);
        Ok(tree)
    }
}

/// List nested project roots directly under the top node as well
///
/// The nested structure is kept; only references are added. Returns the
/// number of references added.
pub fn flatten_sub_roots(tree: &mut DependencyTree) -> usize {
    let top = tree.top();
    let nested: Vec<NodeId> = tree
        .roots()
        .into_iter()
        .flat_map(|root| tree.descendants(root).into_iter().skip(1))
        .filter(|id| tree.node(*id).is_tree_root())
        .collect();

    nested
        .into_iter()
        .filter(|id| tree.add_child_ref(top, *id))
        .count()
}
