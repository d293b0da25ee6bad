//! Graph scan request model

use serde::{Deserialize, Serialize};

use crate::tree::{DependencyTree, NodeId};

/// Flattened dependency graph sent to the graph scan endpoint
///
/// Only the top request carries `nodes`; each node is a bare component id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRequestModel {
    pub component_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<GraphRequestModel>>,
}

impl GraphRequestModel {
    pub fn leaf(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            nodes: None,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.as_ref().map_or(0, Vec::len)
    }

    /// Prefixed component ids of the nodes
    pub fn component_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .flatten()
            .map(|n| n.component_id.clone())
            .collect()
    }
}

/// Flatten the project below `root` into a graph request
///
/// Nodes are deduplicated and filtered with `include`, which receives the
/// short component id. Returns `None` when no node is left, so an empty
/// graph is never sent.
pub fn graph_request(
    tree: &DependencyTree,
    root: NodeId,
    include: impl Fn(&str) -> bool,
) -> Option<GraphRequestModel> {
    let mut seen = hashbrown::HashSet::new();
    let mut nodes = Vec::new();
    for id in tree.descendants(root).into_iter().skip(1) {
        let node = tree.node(id);
        if node.is_tree_root() {
            continue;
        }
        let short = node.component_id();
        if !include(&short) || !seen.insert(short.clone()) {
            continue;
        }
        nodes.push(GraphRequestModel::leaf(format!(
            "{}{}",
            node.info.package_type.component_prefix(),
            short
        )));
    }
    if nodes.is_empty() {
        return None;
    }

    let root_node = tree.node(root);
    let component_id = root_node
        .project()
        .map(|p| p.path.display().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| root_node.component_id());
    Some(GraphRequestModel {
        component_id,
        nodes: Some(nodes),
    })
}
