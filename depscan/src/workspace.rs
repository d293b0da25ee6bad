//! Workspace state and the refresh pipeline
//!
//! A refresh discovers descriptors, builds a fresh tree, scans it, fills
//! every node from the cache, aggregates issues and computes impact paths.
//! The result replaces the current [`Snapshot`] in one swap. A cancelled or
//! failed refresh leaves the previous snapshot in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;

use crate::cache::{HybridCache, ReadCache, WriteCache};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Config;
use crate::discovery::discover;
use crate::error::ScanError;
use crate::impact::{
    DependencyIssues, ImpactGraph, ImpactKey, ImpactedPath, create_impacted_paths,
    populate_dependency_issues,
};
use crate::model::{NodeInfo, short_component_id};
use crate::scan::scheduler::ProgressFn;
use crate::scan::{
    HttpScanClient, ScanProgress, ScanScheduler, ScanService, ScanSummary, response_from_cache,
};
use crate::tree::{DependencyTree, NodeId, TreeFactory, process_tree_issues};

/// Results of one project root
#[derive(Debug, Clone, Default)]
pub struct ProjectResults {
    pub impact: BTreeMap<ImpactKey, ImpactGraph>,
    pub dependencies: Vec<DependencyIssues>,
}

/// Everything a refresh produces, swapped in as a whole
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tree: DependencyTree,
    /// Keyed by project root, Maven modules included
    pub projects: BTreeMap<NodeId, ProjectResults>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful refresh
#[derive(Debug)]
pub struct RefreshReport {
    pub descriptors: usize,
    pub projects: usize,
    pub scan: ScanSummary,
}

/// Direct dependency with at least one fixable issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradableDependency {
    pub node: NodeId,
    pub component: String,
    pub fixed_versions: Vec<String>,
}

/// Clears the in-progress flag when the refresh ends, however it ends
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ScanError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ScanError::AlreadyInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Workspace {
    root: PathBuf,
    config: Config,
    factory: TreeFactory,
    scheduler: ScanScheduler,
    cache: Arc<dyn WriteCache>,
    snapshot: RwLock<Arc<Snapshot>>,
    scanning: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl Workspace {
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        runner: Arc<dyn CommandRunner>,
        service: Arc<dyn ScanService>,
        cache: Arc<dyn WriteCache>,
    ) -> Self {
        let factory = TreeFactory::new(runner, config.tools.clone());
        let scheduler = ScanScheduler::new(
            service,
            Arc::clone(&cache),
            config.scan.page_size,
            config.scan.mode,
        );
        Self {
            root: root.into(),
            config,
            factory,
            scheduler,
            cache,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            scanning: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Workspace backed by real build tools, the HTTP scan client and the
    /// hybrid cache
    pub fn from_config(root: impl Into<PathBuf>, config: Config) -> anyhow::Result<Self> {
        let service = HttpScanClient::new(&config.server, &config.scan)?;
        let cache = HybridCache::new(&config.cache);
        Ok(Self::new(
            root,
            config,
            Arc::new(SystemCommandRunner::new()),
            Arc::new(service),
            Arc::new(cache),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Cancel the refresh in progress, if any
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// The current snapshot
    pub fn get_tree(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Detach a node from its parent
    ///
    /// Issues are not re-aggregated and the cache is left alone.
    pub fn remove_node(&self, id: NodeId) -> bool {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if guard.tree.get(id).is_none() {
            return false;
        }
        Arc::make_mut(&mut *guard).tree.remove_node(id)
    }

    /// Impact graphs for an issue on a component, one per project
    ///
    /// `component_id` may carry a `<type>://` prefix.
    pub fn get_impact_graphs(&self, issue_id: &str, component_id: &str) -> Vec<ImpactGraph> {
        let key = (
            issue_id.to_string(),
            short_component_id(component_id).to_string(),
        );
        self.get_tree()
            .projects
            .values()
            .filter_map(|p| p.impact.get(&key).cloned())
            .collect()
    }

    pub fn get_impacted_paths(&self, issue_id: &str, component_id: &str) -> Vec<ImpactedPath> {
        self.get_impact_graphs(issue_id, component_id)
            .into_iter()
            .flat_map(|g| g.paths)
            .collect()
    }

    /// Direct dependencies of `root` carrying an issue with a fixed version
    pub fn upgradable_dependencies(&self, root: NodeId) -> Vec<UpgradableDependency> {
        let snapshot = self.get_tree();
        let tree = &snapshot.tree;
        if tree.get(root).is_none_or(|n| !n.is_tree_root()) {
            return Vec::new();
        }
        let mut upgradable = Vec::new();
        for child in tree.children(root) {
            let node = tree.node(*child);
            if node.is_tree_root() {
                continue;
            }
            let mut fixed_versions = Vec::new();
            for key in node.issues() {
                if let Some(record) = self.cache.get_issue(&key.issue_id) {
                    for version in record.fixed_versions {
                        if !fixed_versions.contains(&version) {
                            fixed_versions.push(version);
                        }
                    }
                }
            }
            if !fixed_versions.is_empty() {
                upgradable.push(UpgradableDependency {
                    node: *child,
                    component: node.component_id(),
                    fixed_versions,
                });
            }
        }
        upgradable
    }

    pub async fn refresh(&self, quick: bool) -> Result<RefreshReport, ScanError> {
        self.refresh_with_progress(quick, &|_: ScanProgress| {}).await
    }

    /// Rebuild the tree, scan it and swap in the result
    pub async fn refresh_with_progress(
        &self,
        quick: bool,
        progress: ProgressFn<'_>,
    ) -> Result<RefreshReport, ScanError> {
        let _guard = ScanGuard::acquire(&self.scanning)?;
        let cancel = {
            let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            *token = CancellationToken::new();
            token.clone()
        };

        let result = self.run_refresh(quick, &cancel, progress).await;
        match &result {
            Ok(report) => tracing::info!(
                projects = report.projects,
                failed_pages = report.scan.failed_pages,
                "Workspace refreshed"
            ),
            Err(e) if e.is_cancelled() => tracing::info!("Workspace refresh cancelled"),
            Err(e) => tracing::warn!("Workspace refresh failed: {}", e),
        }
        result
    }

    async fn run_refresh(
        &self,
        quick: bool,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> Result<RefreshReport, ScanError> {
        let descriptors = discover(&self.root, &self.config);
        let descriptor_count = descriptors.values().map(Vec::len).sum();
        tracing::info!(
            workspace = %self.root.display(),
            descriptors = descriptor_count,
            "Refreshing workspace"
        );

        let mut tree = self.factory.build(&descriptors, cancel).await?;
        let scan = self
            .scheduler
            .scan_tree(&tree, quick, cancel, progress)
            .await?;
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let cache: &dyn ReadCache = self.cache.as_ref();
        fill_from_cache(&mut tree, cache);
        process_tree_issues(&mut tree);

        let mut projects = BTreeMap::new();
        for root in tree.roots() {
            let response = response_from_cache(&tree, root, cache);
            let impact = create_impacted_paths(
                &tree,
                root,
                &response,
                self.config.scan.impact_paths_limit,
            );
            let package_type = tree
                .node(root)
                .project()
                .map(|p| p.package_type)
                .unwrap_or_default();
            let dependencies = populate_dependency_issues(&response, &impact, package_type);
            projects.insert(root, ProjectResults { impact, dependencies });
        }

        let report = RefreshReport {
            descriptors: descriptor_count,
            projects: projects.len(),
            scan,
        };
        let snapshot = Snapshot {
            tree,
            projects,
            scanned_at: Some(Utc::now()),
        };
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        Ok(report)
    }
}

/// Apply cached results to every dependency node
///
/// Nodes without a cache entry are marked pending.
pub fn fill_from_cache(tree: &mut DependencyTree, cache: &dyn ReadCache) {
    let mut lookups: HashMap<String, Option<NodeInfo>> = HashMap::new();
    for id in tree.descendants(tree.top()).into_iter().skip(1) {
        if tree.node(id).is_tree_root() {
            continue;
        }
        let component = tree.node(id).component_id();
        let info = lookups
            .entry(component)
            .or_insert_with_key(|component| cache.get(component));
        match info {
            Some(info) => tree.set_node_info(id, info),
            None => tree.set_pending(id),
        }
    }
}
