#![no_main]

use depscan::builders::npm::NpmBuilder;
use depscan::builders::{RawOutput, TreeBuilder};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let raw = RawOutput::default()
            .with_output("prod", content)
            .with_manifest(content);
        let tree = NpmBuilder::new().build(Path::new("/fuzz/package.json"), &raw);

        assert_eq!(tree.roots().len(), 1, "every build yields one project root");
    }
});
