//! Arena-backed dependency tree
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`]. Parent and
//! child links are plain indices, so removing a node only detaches it from
//! its parent's child list.
//!
//! The tree always has a synthetic top node. Project roots (one per
//! discovered descriptor) hang below it and carry a [`ProjectDetails`]
//! payload with the set of every component found under them.

use std::collections::BTreeSet;
use std::path::PathBuf;

use hashbrown::HashSet;

use crate::error::BuildError;
use crate::model::{
    ComponentIdentity, GeneralInfo, IssueKey, LicenseKey, NodeInfo, PackageType, Severity,
};

pub mod aggregate;
pub mod factory;

pub use aggregate::process_tree_issues;
pub use factory::TreeFactory;

/// Stable index of a node inside a [`DependencyTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a project root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDetails {
    pub path: PathBuf,
    pub package_type: PackageType,
    /// Every component found below this root, stored once
    pub dependencies: BTreeSet<ComponentIdentity>,
    pub build_error: Option<BuildError>,
}

/// A single node of the tree
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub info: GeneralInfo,
    pub label: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    own_issues: Vec<IssueKey>,
    issues: Vec<IssueKey>,
    licenses: HashSet<LicenseKey>,
    own_severity: Severity,
    top_severity: Severity,
    project: Option<ProjectDetails>,
    detached: bool,
}

impl Node {
    fn new(info: GeneralInfo, label: String, parent: Option<NodeId>) -> Self {
        Self {
            info,
            label,
            parent,
            ..Default::default()
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Issues raised by this exact component
    pub fn own_issues(&self) -> &[IssueKey] {
        &self.own_issues
    }

    /// Own issues plus every issue found below this node
    pub fn issues(&self) -> &[IssueKey] {
        &self.issues
    }

    pub fn licenses(&self) -> &HashSet<LicenseKey> {
        &self.licenses
    }

    pub fn own_severity(&self) -> Severity {
        self.own_severity
    }

    pub fn top_severity(&self) -> Severity {
        self.top_severity
    }

    pub fn project(&self) -> Option<&ProjectDetails> {
        self.project.as_ref()
    }

    /// Project roots carry a source path; dependency nodes do not
    pub fn is_tree_root(&self) -> bool {
        self.project.is_some()
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn component_id(&self) -> String {
        self.info.component_id()
    }
}

/// Dependency forest for one workspace
#[derive(Debug, Clone)]
pub struct DependencyTree {
    nodes: Vec<Node>,
}

impl Default for DependencyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    /// The synthetic node every project root hangs from
    pub fn top(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Add a project root under `parent`
    pub fn add_root(
        &mut self,
        parent: NodeId,
        info: GeneralInfo,
        label: impl Into<String>,
    ) -> NodeId {
        let project = ProjectDetails {
            path: info.path.clone().unwrap_or_default(),
            package_type: info.package_type,
            ..Default::default()
        };
        let id = self.push(parent, info, label.into());
        self.nodes[id.0].project = Some(project);
        id
    }

    /// Add a dependency node under `parent`
    ///
    /// The component is also recorded in the dependency set of the
    /// closest enclosing project root.
    pub fn add_child(&mut self, parent: NodeId, info: GeneralInfo) -> NodeId {
        let identity = info.identity();
        let label = info.name();
        let id = self.push(parent, info, label);
        if let Some(root) = self.enclosing_root(parent)
            && let Some(project) = self.nodes[root.0].project.as_mut()
        {
            project.dependencies.insert(identity);
        }
        id
    }

    fn push(&mut self, parent: NodeId, info: GeneralInfo, label: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(info, label, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// List `child` under `parent` without changing its owner
    ///
    /// Returns false when `parent` already lists the child.
    pub fn add_child_ref(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.nodes[parent.0].children.contains(&child) {
            return false;
        }
        self.nodes[parent.0].children.push(child);
        true
    }

    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) {
        self.nodes[id.0].label = label.into();
    }

    pub fn update_info(&mut self, id: NodeId, info: &GeneralInfo) {
        self.nodes[id.0].info.update(info);
        if let (Some(path), Some(project)) = (&info.path, self.nodes[id.0].project.as_mut()) {
            project.path = path.clone();
        }
    }

    /// Mark a project root as (partially) unusable
    pub fn set_build_error(&mut self, root: NodeId, error: BuildError) {
        if let Some(project) = self.nodes[root.0].project.as_mut() {
            project.build_error = Some(error);
        }
    }

    /// Closest ancestor-or-self that is a project root
    pub fn enclosing_root(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.nodes[node.0].project.is_some() {
                return Some(node);
            }
            current = self.nodes[node.0].parent;
        }
        None
    }

    /// Owning ancestors of `id`, closest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, |p| self.nodes[p.0].parent)
    }

    /// True if a proper ancestor of `id` has the given component id
    pub fn has_ancestor_with_id(&self, id: NodeId, component_id: &str) -> bool {
        self.ancestors(id)
            .any(|a| self.nodes[a.0].component_id() == component_id)
    }

    /// Project roots listed directly under the top node
    pub fn roots(&self) -> Vec<NodeId> {
        self.children(self.top())
            .iter()
            .copied()
            .filter(|id| self.nodes[id.0].is_tree_root())
            .collect()
    }

    /// Project roots owned by the top node, without flattened sub-roots
    pub fn top_level_roots(&self) -> Vec<NodeId> {
        self.roots()
            .into_iter()
            .filter(|id| self.nodes[id.0].parent == Some(self.top()))
            .collect()
    }

    /// Nodes reachable from `from` in pre-order, each visited once
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        order
    }

    /// Nodes owned by the project `root` in pre-order, each visited once
    ///
    /// Nested project roots (Maven modules) and everything below them
    /// belong to their own project and are left out.
    pub fn project_nodes(&self, root: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            if id != root && self.nodes[id.0].is_tree_root() {
                continue;
            }
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        order
    }

    /// Move every child of `fragment`'s top node under `parent`
    ///
    /// Returns the new ids of the moved top-level nodes. References inside
    /// the fragment are not carried over.
    pub fn graft(&mut self, parent: NodeId, fragment: DependencyTree) -> Vec<NodeId> {
        let mut fragment_nodes: Vec<Option<Node>> = fragment.nodes.into_iter().map(Some).collect();
        let mut grafted = Vec::new();
        let tops: Vec<NodeId> = fragment_nodes[0]
            .as_ref()
            .map(|n| n.children.clone())
            .unwrap_or_default();

        let mut stack: Vec<(NodeId, NodeId)> = tops.into_iter().rev().map(|c| (c, parent)).collect();
        while let Some((old, new_parent)) = stack.pop() {
            let Some(mut node) = fragment_nodes[old.0].take() else {
                continue;
            };
            let new_id = NodeId(self.nodes.len());
            let old_children = std::mem::take(&mut node.children);
            node.parent = Some(new_parent);
            self.nodes.push(node);
            self.nodes[new_parent.0].children.push(new_id);
            if new_parent == parent {
                grafted.push(new_id);
            }
            for child in old_children.into_iter().rev() {
                // owned edges only
                if fragment_nodes[child.0]
                    .as_ref()
                    .is_some_and(|c| c.parent == Some(old))
                {
                    stack.push((child, new_id));
                }
            }
        }
        grafted
    }

    /// Detach a node from its parent's child list
    ///
    /// Flattened references listed under the top node are dropped as well.
    /// The node stays in the arena and keeps its own subtree.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if id == self.top() || id.0 >= self.nodes.len() || self.nodes[id.0].detached {
            return false;
        }
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        self.nodes[0].children.retain(|c| *c != id);
        self.nodes[id.0].detached = true;
        true
    }

    /// Apply a scan result to a dependency node
    pub fn set_node_info(&mut self, id: NodeId, info: &NodeInfo) {
        let component = self.nodes[id.0].component_id();
        let node = &mut self.nodes[id.0];
        node.own_issues = info
            .issues
            .iter()
            .map(|k| IssueKey::new(k.issue_id.clone(), component.clone()))
            .collect();
        node.licenses = info.licenses.iter().cloned().collect();
        node.own_severity = info.top_severity;
    }

    /// Mark a node as not scanned yet
    pub fn set_pending(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        node.own_issues.clear();
        node.licenses.clear();
        node.own_severity = Severity::Pending;
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn npm(name: &str, version: &str) -> GeneralInfo {
        GeneralInfo::new(name, version, PackageType::Npm)
    }

    pub(crate) fn root_info(name: &str, version: &str) -> GeneralInfo {
        npm(name, version).with_path(format!("/ws/{name}"))
    }

    #[test]
    fn test_add_child_records_dependency() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let a = tree.add_child(root, npm("a", "1.0.0"));
        tree.add_child(a, npm("b", "2.0.0"));
        tree.add_child(root, npm("b", "2.0.0"));

        let project = tree.node(root).project().unwrap();
        assert_eq!(project.dependencies.len(), 2);
        assert!(
            project
                .dependencies
                .contains(&ComponentIdentity::new("b", "2.0.0"))
        );
        assert_eq!(project.path, PathBuf::from("/ws/app"));
        assert!(tree.node(root).is_tree_root());
        assert!(!tree.node(a).is_tree_root());
    }

    #[test]
    fn test_ancestors() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let a = tree.add_child(root, npm("a", "1.0.0"));
        let b = tree.add_child(a, npm("b", "1.0.0"));

        let ancestors: Vec<NodeId> = tree.ancestors(b).collect();
        assert_eq!(ancestors, vec![a, root, tree.top()]);
        assert!(tree.has_ancestor_with_id(b, "a:1.0.0"));
        assert!(!tree.has_ancestor_with_id(b, "b:1.0.0"));
        assert_eq!(tree.enclosing_root(b), Some(root));
    }

    #[test]
    fn test_graft_preserves_shape() {
        let mut fragment = DependencyTree::new();
        let root = fragment.add_root(fragment.top(), root_info("app", "1.0.0"), "app");
        let a = fragment.add_child(root, npm("a", "1.0.0"));
        fragment.add_child(a, npm("b", "1.0.0"));
        fragment.add_child(root, npm("c", "1.0.0"));

        let mut tree = DependencyTree::new();
        tree.add_root(tree.top(), root_info("other", "0.1.0"), "other");
        let grafted = tree.graft(tree.top(), fragment);

        assert_eq!(grafted.len(), 1);
        let new_root = grafted[0];
        assert_eq!(tree.node(new_root).label, "app");
        let children: Vec<String> = tree
            .children(new_root)
            .iter()
            .map(|c| tree.node(*c).component_id())
            .collect();
        assert_eq!(children, vec!["a:1.0.0", "c:1.0.0"]);
        let a = tree.children(new_root)[0];
        assert_eq!(tree.node(tree.children(a)[0]).component_id(), "b:1.0.0");
        assert_eq!(tree.node(a).parent(), Some(new_root));
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.node(new_root).project().unwrap().dependencies.len(), 3);
    }

    #[test]
    fn test_remove_node_only_detaches() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let a = tree.add_child(root, npm("a", "1.0.0"));
        let b = tree.add_child(a, npm("b", "1.0.0"));

        assert!(tree.remove_node(a));
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.children(a), &[b]);
        assert!(tree.node(a).is_detached());
        assert!(!tree.remove_node(a));
        assert!(!tree.remove_node(tree.top()));
        // the root still remembers the component
        assert_eq!(tree.node(root).project().unwrap().dependencies.len(), 2);
    }

    #[test]
    fn test_add_child_ref_guards_duplicates() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("parent", "1.0.0"), "parent");
        let module = tree.add_root(root, root_info("module", "1.0.0"), "module");

        assert!(tree.add_child_ref(tree.top(), module));
        assert!(!tree.add_child_ref(tree.top(), module));
        assert_eq!(tree.node(module).parent(), Some(root));
        assert_eq!(tree.roots(), vec![root, module]);
        assert_eq!(tree.top_level_roots(), vec![root]);
    }

    #[test]
    fn test_descendants_visits_references_once() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("parent", "1.0.0"), "parent");
        let module = tree.add_root(root, root_info("module", "1.0.0"), "module");
        tree.add_child(module, npm("a", "1.0.0"));
        tree.add_child_ref(tree.top(), module);

        let all = tree.descendants(tree.top());
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_project_nodes_stop_at_nested_roots() {
        let mut tree = DependencyTree::new();
        let parent = tree.add_root(tree.top(), root_info("parent", "1.0.0"), "parent");
        let junit = tree.add_child(parent, npm("junit", "4.13.2"));
        let core = tree.add_root(parent, root_info("core", "1.0.0"), "core");
        let slf4j = tree.add_child(core, npm("slf4j-api", "2.0.9"));

        assert_eq!(tree.project_nodes(parent), vec![parent, junit]);
        assert_eq!(tree.project_nodes(core), vec![core, slf4j]);
        assert_eq!(tree.descendants(parent).len(), 4);
    }

    #[test]
    fn test_set_node_info_stamps_component() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let a = tree.add_child(root, npm("a", "1.0.0"));
        let mut info = NodeInfo::default();
        info.add_issue(IssueKey::new("XRAY-1", ""), Severity::High);
        info.add_license(LicenseKey::new("MIT", false));
        tree.set_node_info(a, &info);

        let node = tree.node(a);
        assert_eq!(node.own_issues()[0].component, "a:1.0.0");
        assert_eq!(node.own_severity(), Severity::High);
        assert!(node.licenses().contains(&LicenseKey::new("MIT", false)));
    }
}
