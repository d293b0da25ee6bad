//! Integration tests for depscan

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use depscan::builders::go::{GoBuilder, ModuleGraph};
use depscan::builders::maven::populate;
use depscan::builders::npm::NpmBuilder;
use depscan::builders::{RawOutput, TreeBuilder};
use depscan::cache::{MemoryCache, ReadCache};
use depscan::command::CommandRunner;
use depscan::config::Config;
use depscan::error::CommandError;
use depscan::impact::{create_impacted_paths, direct_components};
use depscan::model::{GeneralInfo, PackageType, Severity};
use depscan::scan::{ComponentImpact, Finding, GraphRequestModel, ScanResponse, ScanService};
use depscan::tree::{DependencyTree, NodeId, process_tree_issues};
use depscan::workspace::Workspace;

/// Runner answering from a table of `program args` command lines
struct TableRunner {
    outputs: HashMap<String, String>,
}

impl TableRunner {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            outputs: entries
                .iter()
                .map(|(cmd, out)| (cmd.to_string(), out.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl CommandRunner for TableRunner {
    async fn run(&self, program: &str, args: &[&str], _cwd: &Path) -> Result<String, CommandError> {
        let command = format!("{program} {}", args.join(" "));
        self.outputs
            .get(&command)
            .cloned()
            .ok_or(CommandError::Failed {
                command,
                code: Some(1),
                stdout: String::new(),
                stderr: "unknown command".to_string(),
            })
    }

    async fn probe(&self, _program: &str, _args: &[&str]) -> bool {
        true
    }
}

/// Service returning the same response to every request
struct StaticService {
    response: ScanResponse,
    calls: AtomicUsize,
}

#[async_trait]
impl ScanService for StaticService {
    async fn scan_components(&self, _component_ids: &[String]) -> anyhow::Result<ScanResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    async fn scan_graph(&self, _graph: &GraphRequestModel) -> anyhow::Result<ScanResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

fn affected(id: &str, name: &str, version: &str, fixed: &[&str]) -> (String, ComponentImpact) {
    (
        id.to_string(),
        ComponentImpact {
            package_name: name.to_string(),
            package_version: version.to_string(),
            fixed_versions: fixed.iter().map(|v| v.to_string()).collect(),
        },
    )
}

fn labels(tree: &DependencyTree, parent: NodeId) -> Vec<String> {
    tree.children(parent)
        .iter()
        .map(|c| tree.node(*c).component_id())
        .collect()
}

#[test]
fn test_npm_list_end_to_end() {
    let raw = RawOutput::default()
        .with_output(
            "prod",
            r#"{"name":"app","version":"1.0.0","dependencies":{"left-pad":{"version":"1.3.0"}}}"#,
        )
        .with_output("dev", r#"{"name":"app","version":"1.0.0"}"#);
    let mut tree = NpmBuilder::new().build(Path::new("/ws/app/package.json"), &raw);
    process_tree_issues(&mut tree);

    let root = tree.roots()[0];
    assert_eq!(tree.node(root).label, "app");
    assert_eq!(labels(&tree, root), vec!["left-pad:1.3.0"]);
    let left_pad = tree.node(tree.children(root)[0]);
    assert!(left_pad.issues().is_empty());
    assert!(left_pad.licenses().is_empty());
    assert_eq!(tree.node(root).top_severity(), Severity::Normal);
}

#[test]
fn test_maven_levels_nest_by_indentation() {
    let mut tree = DependencyTree::new();
    let root = tree.add_root(
        tree.top(),
        GeneralInfo::gav("org.example", "root", "1.0").with_path("/ws"),
        "org.example:root",
    );
    let lines: Vec<String> = [0usize, 1, 1, 2, 1]
        .iter()
        .enumerate()
        .map(|(i, level)| format!("{}g:c{i}:jar:1.{i}:compile", " ".repeat(*level)))
        .collect();
    populate(&mut tree, root, &lines);

    assert_eq!(labels(&tree, root), vec!["g:c0:1.0"]);
    let child0 = tree.children(root)[0];
    assert_eq!(labels(&tree, child0), vec!["g:c1:1.1", "g:c2:1.2", "g:c4:1.4"]);
    let child2 = tree.children(child0)[1];
    assert_eq!(labels(&tree, child2), vec!["g:c3:1.3"]);
}

#[test]
fn test_go_cycle_terminates() {
    let graph = ModuleGraph::parse(
        "example.com/app a.io/x@v1.0.0\n\
         a.io/x@v1.0.0 b.io/y@v1.0.0\n\
         b.io/y@v1.0.0 a.io/x@v1.0.0\n",
    );
    let mut tree = DependencyTree::new();
    let root = tree.add_root(
        tree.top(),
        GeneralInfo::new("example.com/app", "", PackageType::Go).with_path("/ws/app"),
        "example.com/app",
    );
    GoBuilder::populate(&mut tree, root, &graph);

    for id in tree.descendants(root) {
        let component = tree.node(id).component_id();
        assert!(
            !tree.has_ancestor_with_id(id, &component),
            "{component} is its own ancestor"
        );
    }
    assert_eq!(tree.descendants(root).len(), 3);
}

#[test]
fn test_impact_paths_on_shared_dependency() {
    let mut tree = DependencyTree::new();
    let root = tree.add_root(
        tree.top(),
        GeneralInfo::new("root", "1.0.0", PackageType::Npm).with_path("/ws/root"),
        "root",
    );
    let info = |name: &str, version: &str| GeneralInfo::new(name, version, PackageType::Npm);
    tree.add_child(root, info("A", "1.0.0"));
    let b = tree.add_child(root, info("B", "1.0.0"));
    tree.add_child(b, info("A", "1.0.1"));
    let c = tree.add_child(root, info("C", "2.0.0"));
    tree.add_child(c, info("D", "3.0.0"));
    tree.add_child(c, info("A", "1.0.0"));

    let response = ScanResponse {
        vulnerabilities: vec![Finding {
            issue_id: "XRAY-191882".to_string(),
            severity: "High".to_string(),
            components: [affected("npm://A:1.0.0", "A", "1.0.0", &[])].into_iter().collect(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let graphs = create_impacted_paths(&tree, root, &response, 50);
    let graph = &graphs[&("XRAY-191882".to_string(), "A:1.0.0".to_string())];

    let paths: Vec<Vec<&str>> = graph
        .paths
        .iter()
        .map(|p| p.nodes.iter().map(String::as_str).collect())
        .collect();
    assert_eq!(
        paths,
        vec![
            vec!["root:1.0.0", "A:1.0.0"],
            vec!["root:1.0.0", "C:2.0.0", "A:1.0.0"],
        ]
    );
    let direct: Vec<String> = direct_components(&graphs).into_iter().collect();
    assert_eq!(direct, vec!["A:1.0.0", "C:2.0.0"]);
}

fn write_workspace(dir: &Path) {
    fs::create_dir_all(dir.join("app")).unwrap();
    fs::write(
        dir.join("app/package.json"),
        r#"{"name":"app","version":"1.0.0"}"#,
    )
    .unwrap();
    fs::create_dir_all(dir.join("svc")).unwrap();
    fs::write(dir.join("svc/go.mod"), "module example.com/svc\n\ngo 1.22\n").unwrap();
    // never descended into
    fs::create_dir_all(dir.join("app/node_modules/dep")).unwrap();
    fs::write(dir.join("app/node_modules/dep/package.json"), "{}").unwrap();
}

fn runner() -> TableRunner {
    TableRunner::new(&[
        (
            "npm ls --json --all --only=prod",
            r#"{"name":"app","version":"1.0.0","dependencies":{
                "express":{"version":"4.17.0","dependencies":{"qs":{"version":"6.5.0"}}},
                "lodash":{"version":"4.17.20"}}}"#,
        ),
        ("npm ls --json --all --only=dev", r#"{"name":"app","version":"1.0.0"}"#),
        (
            "go mod graph",
            "example.com/svc github.com/a/lib@v1.2.0\n\
             github.com/a/lib@v1.2.0 golang.org/x/text@v0.3.0\n",
        ),
        ("go list -m", "example.com/svc\n"),
    ])
}

fn service() -> StaticService {
    let text: BTreeMap<String, ComponentImpact> = [affected(
        "go://golang.org/x/text:0.3.0",
        "golang.org/x/text",
        "0.3.0",
        &["0.3.8"],
    )]
    .into_iter()
    .collect();
    let violation = |watch: &str| Finding {
        issue_id: "XRAY-2".to_string(),
        severity: "Critical".to_string(),
        summary: "Out-of-bounds read".to_string(),
        components: text.clone(),
        cves: vec!["CVE-2022-32149".to_string()],
        watch_name: Some(watch.to_string()),
        ..Default::default()
    };
    StaticService {
        response: ScanResponse {
            vulnerabilities: vec![Finding {
                issue_id: "XRAY-1".to_string(),
                severity: "High".to_string(),
                components: [affected("npm://qs:6.5.0", "qs", "6.5.0", &["6.5.3"])]
                    .into_iter()
                    .collect(),
                ..Default::default()
            }],
            violations: vec![violation("security"), violation("release")],
            licenses: Vec::new(),
            scanned: vec![
                "npm://express:4.17.0".to_string(),
                "go://github.com/a/lib:1.2.0".to_string(),
            ],
        },
        calls: AtomicUsize::new(0),
    }
}

#[tokio::test]
async fn test_workspace_refresh_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_workspace(dir.path());
    let service = Arc::new(service());
    let cache = Arc::new(MemoryCache::new());
    let workspace = Workspace::new(
        dir.path(),
        Config::default(),
        Arc::new(runner()),
        service.clone(),
        cache.clone(),
    );

    let report = workspace.refresh(false).await.unwrap();
    assert_eq!(report.descriptors, 2);
    assert_eq!(report.projects, 2);
    assert_eq!(report.scan.missing, 1);

    let snapshot = workspace.get_tree();
    let tree = &snapshot.tree;
    let labels: Vec<&str> = tree.roots().iter().map(|r| tree.node(*r).label.as_str()).collect();
    assert_eq!(labels, vec!["example.com/svc", "app"]);

    // lodash is unknown to the service
    let lodash = cache.get("lodash:4.17.20").unwrap();
    assert!(lodash.is_missing());
    let app = tree.roots()[1];
    assert_eq!(tree.node(app).top_severity(), Severity::High);

    let paths = workspace.get_impacted_paths("XRAY-2", "go://golang.org/x/text:0.3.0");
    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0].nodes,
        vec!["example.com/svc", "github.com/a/lib:1.2.0", "golang.org/x/text:0.3.0"]
    );

    let svc = tree.roots()[0];
    let dependencies = &snapshot.projects[&svc].dependencies;
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].indirect);
    assert_eq!(dependencies[0].issues.len(), 1);
    assert_eq!(dependencies[0].issues[0].watch_names, vec!["release", "security"]);

    let upgradable = workspace.upgradable_dependencies(app);
    assert_eq!(upgradable.len(), 1);
    assert_eq!(upgradable[0].component, "express:4.17.0");
    assert_eq!(upgradable[0].fixed_versions, vec!["6.5.3"]);

    // a quick refresh is served from the cache
    workspace.refresh(true).await.unwrap();
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        workspace
            .get_impacted_paths("XRAY-1", "qs:6.5.0")
            .first()
            .map(|p| p.nodes.len()),
        Some(3)
    );
}

#[tokio::test]
async fn test_issue_merge_is_idempotent_and_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    write_workspace(dir.path());
    let workspace = Workspace::new(
        dir.path(),
        Config::default(),
        Arc::new(runner()),
        Arc::new(service()),
        Arc::new(MemoryCache::new()),
    );
    workspace.refresh(false).await.unwrap();

    let mut tree = workspace.get_tree().tree.clone();
    let state = |tree: &DependencyTree| -> Vec<(Severity, Vec<NodeId>, Vec<String>)> {
        tree.descendants(tree.top())
            .into_iter()
            .map(|id| {
                let node = tree.node(id);
                (
                    node.top_severity(),
                    node.children().to_vec(),
                    node.issues().iter().map(|i| i.issue_id.clone()).collect(),
                )
            })
            .collect()
    };
    let before = state(&tree);
    process_tree_issues(&mut tree);
    assert_eq!(state(&tree), before);

    for id in tree.descendants(tree.top()) {
        let node = tree.node(id);
        assert!(node.top_severity() >= node.own_severity());
        for child in node.children() {
            assert!(node.top_severity() >= tree.node(*child).top_severity());
        }
    }
}

fn write_reactor(dir: &Path) {
    let pom = |artifact: &str| {
        format!(
            "<project><groupId>com.example</groupId><artifactId>{artifact}</artifactId>\
             <version>1.0.0</version></project>"
        )
    };
    fs::create_dir_all(dir.join("parent/core")).unwrap();
    fs::write(dir.join("parent/pom.xml"), pom("parent")).unwrap();
    fs::write(dir.join("parent/core/pom.xml"), pom("core")).unwrap();
}

#[tokio::test]
async fn test_workspace_refresh_maven_module() {
    let dir = tempfile::tempdir().unwrap();
    write_reactor(dir.path());
    let runner = TableRunner::new(&[(
        "mvn dependency:tree -B",
        "[INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ parent ---\n\
         [INFO] com.example:parent:pom:1.0.0\n\
         [INFO] \\- junit:junit:jar:4.13.2:test\n\
         [INFO]\n\
         [INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ core ---\n\
         [INFO] com.example:core:jar:1.0.0\n\
         [INFO] +- org.slf4j:slf4j-api:jar:2.0.9:compile\n\
         [INFO] \\- junit:junit:jar:4.13.2:test\n",
    )]);
    let service = StaticService {
        response: ScanResponse {
            vulnerabilities: vec![Finding {
                issue_id: "XRAY-3".to_string(),
                severity: "High".to_string(),
                components: [affected(
                    "gav://org.slf4j:slf4j-api:2.0.9",
                    "org.slf4j:slf4j-api",
                    "2.0.9",
                    &["2.0.10"],
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }],
            ..Default::default()
        },
        calls: AtomicUsize::new(0),
    };
    let workspace = Workspace::new(
        dir.path(),
        Config::default(),
        Arc::new(runner),
        Arc::new(service),
        Arc::new(MemoryCache::new()),
    );

    let report = workspace.refresh(false).await.unwrap();
    // the module pom is built by its parent
    assert_eq!(report.descriptors, 1);
    assert_eq!(report.projects, 2);

    let snapshot = workspace.get_tree();
    let tree = &snapshot.tree;
    let labels: Vec<&str> = tree.roots().iter().map(|r| tree.node(*r).label.as_str()).collect();
    assert_eq!(labels, vec!["com.example:parent", "com.example:core"]);
    let (parent, core) = (tree.roots()[0], tree.roots()[1]);
    assert_eq!(tree.node(core).parent(), Some(parent));

    let paths = workspace.get_impacted_paths("XRAY-3", "gav://org.slf4j:slf4j-api:2.0.9");
    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0].nodes,
        vec!["com.example:core:1.0.0", "org.slf4j:slf4j-api:2.0.9"]
    );

    let dependencies = &snapshot.projects[&core].dependencies;
    assert_eq!(dependencies.len(), 1);
    assert_eq!(dependencies[0].component, "org.slf4j:slf4j-api:2.0.9");
    assert!(!dependencies[0].indirect);
    assert!(snapshot.projects[&parent].dependencies.is_empty());
}
