//! Impact paths
//!
//! Maps a flat scan response back onto a project's dependency tree: for
//! every `(issue, component)` pair, which chains of dependencies lead from
//! the project root to the affected component, and whether the component
//! is a direct dependency.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::issues::extend_unique;
use crate::model::{PackageType, Severity, short_component_id};
use crate::scan::{ComponentImpact, Finding, ScanResponse};
use crate::tree::{DependencyTree, NodeId};

/// `(issue_id, short component id)`
pub type ImpactKey = (String, String);

/// One chain of component ids, project root first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactedPath {
    pub nodes: Vec<String>,
}

impl ImpactedPath {
    /// The dependency declared by the project, if any
    pub fn direct(&self) -> Option<&str> {
        self.nodes.get(1).map(String::as_str)
    }
}

/// All recorded paths for one `(issue, component)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactGraph {
    pub paths: Vec<ImpactedPath>,
    /// Every path found, including the ones over the limit
    pub paths_count: usize,
    pub paths_limit: usize,
}

impl ImpactGraph {
    pub fn new(paths_limit: usize) -> Self {
        Self {
            paths: Vec::new(),
            paths_count: 0,
            paths_limit,
        }
    }

    /// Record a path, keeping only the first `paths_limit`
    pub fn absorb(&mut self, path: ImpactedPath) {
        self.paths_count += 1;
        if self.paths.len() < self.paths_limit {
            self.paths.push(path);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.paths_count > self.paths.len()
    }

    /// Merge the recorded paths into one tree
    ///
    /// Paths sharing a prefix share the corresponding nodes.
    pub fn to_tree(&self) -> Option<ImpactTreeNode> {
        let root_name = self.paths.first()?.nodes.first()?;
        let mut root = ImpactTreeNode::new(root_name.clone());
        for path in &self.paths {
            let mut current = &mut root;
            for name in path.nodes.iter().skip(1) {
                let index = match current.children.iter().position(|c| &c.name == name) {
                    Some(index) => index,
                    None => {
                        current.children.push(ImpactTreeNode::new(name.clone()));
                        current.children.len() - 1
                    }
                };
                current = &mut current.children[index];
            }
        }
        Some(root)
    }
}

/// Rendered impact tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactTreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ImpactTreeNode>,
}

impl ImpactTreeNode {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }
}

/// Name of the project root as shown at the top of every path
fn graph_name(tree: &DependencyTree, root: NodeId) -> String {
    let id = tree.node(root).component_id();
    match id.strip_suffix(':') {
        Some(trimmed) => trimmed.to_string(),
        None => id,
    }
}

fn matches(component_id: &str, short: &str, impact: &ComponentImpact) -> bool {
    if !impact.package_name.is_empty() {
        let expected = format!("{}:{}", impact.package_name, impact.package_version);
        if component_id == expected {
            return true;
        }
    }
    component_id == short
}

/// Every path from `root` to a node matching the affected component
///
/// The search stops descending at a match, so a component nested below
/// another occurrence of itself is reported once.
fn find_paths(
    tree: &DependencyTree,
    root: NodeId,
    root_name: &str,
    short: &str,
    impact: &ComponentImpact,
    graph: &mut ImpactGraph,
) {
    let mut chain = vec![root_name.to_string()];
    // (node, depth of its parent in `chain`)
    let mut stack: Vec<(NodeId, usize)> =
        tree.children(root).iter().rev().map(|c| (*c, 1)).collect();
    while let Some((id, depth)) = stack.pop() {
        chain.truncate(depth);
        let node = tree.node(id);
        // modules are projects of their own
        if node.is_detached() || node.is_tree_root() {
            continue;
        }
        let component_id = node.component_id();
        if matches(&component_id, short, impact) {
            let mut nodes = chain.clone();
            nodes.push(component_id);
            graph.absorb(ImpactedPath { nodes });
            continue;
        }
        chain.push(component_id);
        let next = chain.len();
        stack.extend(tree.children(id).iter().rev().map(|c| (*c, next)));
    }
}

/// Impact graphs for every finding of `response` within the project `root`
///
/// Pairs with no matching node in the tree get no entry.
pub fn create_impacted_paths(
    tree: &DependencyTree,
    root: NodeId,
    response: &ScanResponse,
    paths_limit: usize,
) -> BTreeMap<ImpactKey, ImpactGraph> {
    let root_name = graph_name(tree, root);
    let mut graphs = BTreeMap::new();
    for finding in response.findings() {
        for (component_id, impact) in &finding.components {
            let short = short_component_id(component_id);
            let key = (finding.issue_id.clone(), short.to_string());
            if graphs.contains_key(&key) {
                continue;
            }
            let mut graph = ImpactGraph::new(paths_limit);
            find_paths(tree, root, &root_name, short, impact, &mut graph);
            if graph.paths_count > 0 {
                graphs.insert(key, graph);
            } else {
                tracing::debug!(issue = %finding.issue_id, component = %short, "No impact path found");
            }
        }
    }
    graphs
}

/// Components that appear right below the project root in some path
pub fn direct_components(graphs: &BTreeMap<ImpactKey, ImpactGraph>) -> BTreeSet<String> {
    graphs
        .values()
        .flat_map(|g| g.paths.iter())
        .filter_map(|p| p.direct())
        .map(str::to_string)
        .collect()
}

/// One issue raised on a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEntry {
    pub issue_id: String,
    pub severity: Severity,
    pub summary: String,
    pub cves: Vec<String>,
    pub fixed_versions: Vec<String>,
    pub watch_names: Vec<String>,
}

/// License found on a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseEntry {
    pub name: String,
    pub violated: bool,
}

/// A dependency with at least one issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyIssues {
    /// Short component id
    pub component: String,
    pub package_type: PackageType,
    pub indirect: bool,
    pub issues: Vec<IssueEntry>,
    pub licenses: Vec<LicenseEntry>,
}

impl DependencyIssues {
    pub fn top_severity(&self) -> Severity {
        self.issues
            .iter()
            .map(|i| i.severity)
            .max()
            .unwrap_or_default()
    }
}

fn issue_entry(finding: &Finding, impact: &ComponentImpact) -> IssueEntry {
    IssueEntry {
        issue_id: finding.issue_id.clone(),
        severity: Severity::from_str_loose(&finding.severity),
        summary: finding.summary.clone(),
        cves: finding.cves.clone(),
        fixed_versions: impact.fixed_versions.clone(),
        watch_names: finding.watch_name.iter().cloned().collect(),
    }
}

/// Group the findings of one project by affected dependency
///
/// Only pairs with an impact graph are reported. The same issue raised by
/// several watches on one dependency is kept once with every watch name.
/// License violations are listed as violated licenses of the dependency,
/// plain licenses are attached to dependencies that already have an entry.
pub fn populate_dependency_issues(
    response: &ScanResponse,
    graphs: &BTreeMap<ImpactKey, ImpactGraph>,
    package_type: PackageType,
) -> Vec<DependencyIssues> {
    let direct = direct_components(graphs);
    let mut order: Vec<String> = Vec::new();
    let mut dependencies: BTreeMap<String, DependencyIssues> = BTreeMap::new();

    for finding in response.findings() {
        for (component_id, impact) in &finding.components {
            let short = short_component_id(component_id).to_string();
            if !graphs.contains_key(&(finding.issue_id.clone(), short.clone())) {
                continue;
            }
            let dependency = dependencies.entry(short.clone()).or_insert_with(|| {
                order.push(short.clone());
                let matched = if impact.package_name.is_empty() {
                    short.clone()
                } else {
                    format!("{}:{}", impact.package_name, impact.package_version)
                };
                DependencyIssues {
                    component: short.clone(),
                    package_type,
                    indirect: !direct.contains(&matched) && !direct.contains(&short),
                    issues: Vec::new(),
                    licenses: Vec::new(),
                }
            });

            if finding.is_license_violation() {
                let name = finding.license_key.clone().unwrap_or_default();
                if !dependency.licenses.iter().any(|l| l.name == name) {
                    dependency.licenses.push(LicenseEntry { name, violated: true });
                }
                continue;
            }
            match dependency
                .issues
                .iter_mut()
                .find(|i| i.issue_id == finding.issue_id)
            {
                Some(existing) => {
                    extend_unique(&mut existing.watch_names, finding.watch_name.as_slice());
                }
                None => dependency.issues.push(issue_entry(finding, impact)),
            }
        }
    }

    for license in &response.licenses {
        for component_id in license.components.keys() {
            let Some(dependency) = dependencies.get_mut(short_component_id(component_id)) else {
                continue;
            };
            if !dependency.licenses.iter().any(|l| l.name == license.license_key) {
                dependency.licenses.push(LicenseEntry {
                    name: license.license_key.clone(),
                    violated: false,
                });
            }
        }
    }

    order
        .into_iter()
        .filter_map(|component| dependencies.remove(&component))
        .collect()
}
