//! Issue roll-up and display ordering

use std::cmp::Ordering;

use hashbrown::HashSet;

use super::{DependencyTree, NodeId};

/// Merge issues bottom-up and sort every child list
///
/// Post-order over the whole forest. A node's effective issues are its
/// own issues followed by those of its children, deduplicated by issue
/// id with the first occurrence kept. Children are merged in arena order,
/// not display order, so a second pass picks the same owner for every
/// issue. `top_severity` becomes the max of the node's own severity and
/// its children's.
///
/// Running it twice yields the same issues, severities and ordering.
pub fn process_tree_issues(tree: &mut DependencyTree) {
    for id in post_order(tree, tree.top()) {
        merge_node(tree, id);
    }
}

fn post_order(tree: &DependencyTree, from: NodeId) -> Vec<NodeId> {
    let mut seen = vec![false; tree.len()];
    let mut order = Vec::with_capacity(tree.len());
    let mut stack = vec![(from, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if std::mem::replace(&mut seen[id.index()], true) {
            continue;
        }
        stack.push((id, true));
        for child in tree.children(id).iter().rev() {
            if !seen[child.index()] {
                stack.push((*child, false));
            }
        }
    }
    order
}

fn merge_node(tree: &mut DependencyTree, id: NodeId) {
    let mut children = tree.children(id).to_vec();
    children.sort_unstable();

    let node = tree.node(id);
    let component = node.component_id();
    let mut seen: HashSet<String> = HashSet::new();
    let mut issues = Vec::with_capacity(node.own_issues.len());
    for issue in &node.own_issues {
        if seen.insert(issue.issue_id.clone()) {
            let mut issue = issue.clone();
            if issue.component.is_empty() {
                issue.component = component.clone();
            }
            issues.push(issue);
        }
    }

    let mut top = node.own_severity;
    for child in &children {
        let child = tree.node(*child);
        top = top.max(child.top_severity);
        for issue in &child.issues {
            if seen.insert(issue.issue_id.clone()) {
                issues.push(issue.clone());
            }
        }
    }

    let mut ordered = tree.children(id).to_vec();
    ordered.sort_by(|a, b| display_order(tree, *a, *b));

    let node = tree.node_mut(id);
    node.issues = issues;
    node.top_severity = top;
    node.children = ordered;
}

/// Severity descending, then child count descending, then issue count ascending
fn display_order(tree: &DependencyTree, a: NodeId, b: NodeId) -> Ordering {
    let (a, b) = (tree.node(a), tree.node(b));
    b.top_severity
        .cmp(&a.top_severity)
        .then_with(|| b.children.len().cmp(&a.children.len()))
        .then_with(|| a.issues.len().cmp(&b.issues.len()))
}
