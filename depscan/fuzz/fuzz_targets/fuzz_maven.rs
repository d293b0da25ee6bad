#![no_main]

use depscan::builders::maven;
use depscan::model::GeneralInfo;
use depscan::tree::DependencyTree;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let sections = maven::parse_sections(content);
        let mut tree = DependencyTree::new();
        let mut previous: Option<Vec<String>> = None;

        for section in &sections {
            let (group, artifact, version) = maven::project_info(&section.project);
            let root = tree.add_root(
                tree.top(),
                GeneralInfo::gav(group, artifact, version).with_path("/fuzz"),
                section.project.clone(),
            );
            let lines = match &previous {
                Some(parent) => maven::filter_parent_dependencies(&section.lines, parent),
                None => section.lines.clone(),
            };
            maven::populate(&mut tree, root, &lines);
            previous = Some(section.lines.clone());
        }

        for root in tree.roots() {
            assert!(tree.node(root).is_tree_root(), "section roots must stay project roots");
        }
    }
});
