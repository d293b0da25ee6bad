#![no_main]

use depscan::builders::go::{GoBuilder, ModuleGraph};
use depscan::model::{GeneralInfo, PackageType};
use depscan::tree::DependencyTree;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let graph = ModuleGraph::parse(content);
        let mut tree = DependencyTree::new();
        let root = tree.add_root(
            tree.top(),
            GeneralInfo::new("example.com/fuzz", "", PackageType::Go).with_path("/fuzz"),
            "example.com/fuzz",
        );
        GoBuilder::populate(&mut tree, root, &graph);

        for id in tree.descendants(root).into_iter().skip(1) {
            let component = tree.node(id).component_id();
            assert!(
                !tree.has_ancestor_with_id(id, &component),
                "a module must never be its own ancestor"
            );
        }
    }
});
