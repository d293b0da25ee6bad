//! Benchmark suite for depscan
//!
//! Run with: `cargo bench --bench benchmarks`
//! View report: `open target/criterion/report/index.html`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use depscan::builders::go::{GoBuilder, ModuleGraph};
use depscan::builders::maven;
use depscan::cache::{MemoryCache, ReadCache, SqliteCache, WriteCache};
use depscan::impact::create_impacted_paths;
use depscan::model::{GeneralInfo, IssueKey, NodeInfo, PackageType, Severity};
use depscan::scan::{ComponentImpact, Finding, ScanResponse};
use depscan::tree::{DependencyTree, NodeId, process_tree_issues};
use depscan::workspace::fill_from_cache;

// =============================================================================
// Test Data Generation
// =============================================================================

/// `mvn dependency:tree` lines: `width` direct dependencies, each `depth` deep
fn generate_maven_lines(width: usize, depth: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(width * depth);
    for i in 0..width {
        for d in 0..depth {
            let glyph = if d == 0 { "+- " } else { "|  \\- " };
            lines.push(format!(
                "{}{glyph}org.bench:lib-{i}-{d}:jar:1.{d}.0:compile",
                "   ".repeat(d)
            ));
        }
    }
    lines
}

/// `go mod graph` output where every module requires the next `fan_out` ones
fn generate_go_graph(modules: usize, fan_out: usize) -> String {
    let mut out = String::new();
    for i in 0..modules.min(5) {
        out.push_str(&format!("example.com/app github.com/m/mod{i}@v1.0.{i}\n"));
    }
    for i in 0..modules {
        for j in 1..=fan_out {
            let k = (i + j) % modules;
            out.push_str(&format!(
                "github.com/m/mod{i}@v1.0.{i} github.com/m/mod{k}@v1.0.{k}\n"
            ));
        }
    }
    out
}

/// npm tree with `width` direct dependencies sharing a common transitive one
fn generate_tree(width: usize, depth: usize) -> (DependencyTree, NodeId) {
    let mut tree = DependencyTree::new();
    let root = tree.add_root(
        tree.top(),
        GeneralInfo::new("app", "1.0.0", PackageType::Npm).with_path("/ws/app"),
        "app",
    );
    for i in 0..width {
        let mut parent = root;
        for d in 0..depth {
            parent = tree.add_child(
                parent,
                GeneralInfo::new(format!("pkg-{i}-{d}"), "1.0.0", PackageType::Npm),
            );
        }
        tree.add_child(parent, GeneralInfo::new("shared", "0.1.0", PackageType::Npm));
    }
    (tree, root)
}

fn vulnerable_info(issue_id: &str, component: &str) -> NodeInfo {
    let mut info = NodeInfo::default();
    info.add_issue(IssueKey::new(issue_id, component), Severity::High);
    info
}

fn shared_response() -> ScanResponse {
    ScanResponse {
        vulnerabilities: vec![Finding {
            issue_id: "XRAY-1".to_string(),
            severity: "High".to_string(),
            components: [(
                "npm://shared:0.1.0".to_string(),
                ComponentImpact {
                    package_name: "shared".to_string(),
                    package_version: "0.1.0".to_string(),
                    fixed_versions: vec!["0.2.0".to_string()],
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

// =============================================================================
// Builder Benchmarks
// =============================================================================

fn bench_builders(c: &mut Criterion) {
    let mut group = c.benchmark_group("builders");

    for width in [10, 100, 500] {
        let lines = generate_maven_lines(width, 4);
        group.bench_with_input(
            BenchmarkId::new("maven_populate", width),
            &lines,
            |b, lines| {
                b.iter(|| {
                    let mut tree = DependencyTree::new();
                    let root = tree.add_root(
                        tree.top(),
                        GeneralInfo::gav("org.bench", "root", "1.0"),
                        "org.bench:root",
                    );
                    maven::populate(&mut tree, root, black_box(lines));
                    black_box(tree.len())
                });
            },
        );
    }

    for modules in [20, 50, 100] {
        let output = generate_go_graph(modules, 3);
        group.bench_with_input(
            BenchmarkId::new("go_graph", modules),
            &output,
            |b, output| {
                b.iter(|| {
                    let graph = ModuleGraph::parse(black_box(output));
                    let mut tree = DependencyTree::new();
                    let root = tree.add_root(
                        tree.top(),
                        GeneralInfo::new("example.com/app", "", PackageType::Go),
                        "example.com/app",
                    );
                    GoBuilder::populate(&mut tree, root, &graph);
                    black_box(tree.len())
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Tree Benchmarks
// =============================================================================

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");

    for width in [100, 1000] {
        let (tree, root) = generate_tree(width, 5);
        let cache = MemoryCache::new();
        cache.put("shared:0.1.0".to_string(), vulnerable_info("XRAY-1", "shared:0.1.0"));
        for i in 0..width {
            cache.put(format!("pkg-{i}-0:1.0.0"), NodeInfo::default());
        }

        group.bench_with_input(
            BenchmarkId::new("process_tree_issues", width),
            &tree,
            |b, tree| {
                b.iter(|| {
                    let mut tree = tree.clone();
                    fill_from_cache(&mut tree, &cache);
                    process_tree_issues(&mut tree);
                    black_box(tree.node(root).top_severity())
                });
            },
        );

        let response = shared_response();
        group.bench_with_input(
            BenchmarkId::new("create_impacted_paths", width),
            &tree,
            |b, tree| {
                b.iter(|| black_box(create_impacted_paths(tree, root, &response, 50)));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Cache Benchmarks
// =============================================================================

fn bench_memory_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache/memory");

    for entry_count in [100, 1000, 10000] {
        let cache = MemoryCache::new();

        // Pre-populate cache
        for i in 0..entry_count {
            cache.put(format!("package_{i}:1.0.0"), NodeInfo::default());
        }

        group.bench_with_input(
            BenchmarkId::new("get_hit", entry_count),
            &cache,
            |b, cache| {
                b.iter(|| {
                    black_box(cache.get("package_50:1.0.0"));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("get_miss", entry_count),
            &cache,
            |b, cache| {
                b.iter(|| {
                    black_box(cache.get("nonexistent:0.0.0"));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("put", entry_count),
            &cache,
            |b, cache| {
                let mut i = entry_count;
                b.iter(|| {
                    cache.put(format!("new_package_{i}:1.0.0"), NodeInfo::default());
                    i += 1;
                });
            },
        );
    }

    group.finish();
}

fn bench_sqlite_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache/sqlite");

    let Ok(cache) = SqliteCache::in_memory() else {
        eprintln!("Skipping SQLite benchmarks: could not open database");
        return;
    };

    for entry_count in [100, 1000] {
        cache.clear();
        for i in 0..entry_count {
            cache.put(
                format!("package_{i}:1.0.0"),
                vulnerable_info("XRAY-1", &format!("package_{i}:1.0.0")),
            );
        }

        group.bench_with_input(
            BenchmarkId::new("get_hit", entry_count),
            &entry_count,
            |b, _| {
                b.iter(|| {
                    black_box(cache.get("package_50:1.0.0"));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("get_miss", entry_count),
            &entry_count,
            |b, _| {
                b.iter(|| {
                    black_box(cache.get("nonexistent:0.0.0"));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_builders,
    bench_tree,
    bench_memory_cache,
    bench_sqlite_cache,
);
criterion_main!(benches);
