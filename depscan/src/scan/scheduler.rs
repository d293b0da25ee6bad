//! Cache-aware scan scheduling
//!
//! Components are deduplicated, filtered against the cache in quick mode,
//! and submitted page by page (or one graph per project in graph mode).
//! Cancellation is checked before every request. A failed request is
//! logged and counted; the remaining pages still run.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashSet;
use tokio_util::sync::CancellationToken;

use super::graph::graph_request;
use super::{ScanResponse, ScanService};
use crate::cache::{ReadCache, WriteCache};
use crate::config::ScanMode;
use crate::error::ScanError;
use crate::model::{IssueRecord, short_component_id};
use crate::tree::DependencyTree;

/// Progress after each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub page: usize,
    pub pages: usize,
    /// Components submitted so far
    pub components: usize,
}

/// Progress callback invoked after each page
pub type ProgressFn<'a> = &'a (dyn Fn(ScanProgress) + Send + Sync);

/// Outcome of one scheduling run
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Unique components found in the tree
    pub requested: usize,
    /// Components skipped because a valid cache entry exists
    pub cached: usize,
    /// Components submitted to the service
    pub submitted: usize,
    /// Submitted components the service did not return
    pub missing: usize,
    pub pages: usize,
    pub failed_pages: usize,
    /// Last remote failure, if any page failed
    pub last_error: Option<ScanError>,
}

impl ScanSummary {
    /// Some pages failed; cached results were still used
    pub fn is_partial(&self) -> bool {
        self.failed_pages > 0
    }
}

/// Prefixed ids of every component in the tree, in tree order
pub fn collect_components(tree: &DependencyTree) -> Vec<String> {
    tree.roots()
        .into_iter()
        .filter_map(|root| tree.node(root).project())
        .flat_map(|project| {
            let prefix = project.package_type.component_prefix();
            project
                .dependencies
                .iter()
                .map(move |identity| format!("{prefix}{}", identity.component_id()))
        })
        .collect()
}

/// Deduplicate component ids, dropping cache-valid ones in quick mode
///
/// Returns the ids to submit (first occurrence order) and the number of
/// unique ids served from the cache.
pub fn select_components<I>(ids: I, quick: bool, cache: &dyn ReadCache) -> (Vec<String>, usize)
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut cached = 0;
    for id in ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        if quick && cache.is_valid(short_component_id(&id)) {
            tracing::debug!(component = %id, "Using cached scan result");
            cached += 1;
            continue;
        }
        selected.push(id);
    }
    (selected, cached)
}

pub struct ScanScheduler {
    service: Arc<dyn ScanService>,
    cache: Arc<dyn WriteCache>,
    page_size: usize,
    mode: ScanMode,
}

impl ScanScheduler {
    pub fn new(
        service: Arc<dyn ScanService>,
        cache: Arc<dyn WriteCache>,
        page_size: usize,
        mode: ScanMode,
    ) -> Self {
        Self {
            service,
            cache,
            page_size: page_size.max(1),
            mode,
        }
    }

    /// Scan every component of `tree` and store the results in the cache
    pub async fn scan_tree(
        &self,
        tree: &DependencyTree,
        quick: bool,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> Result<ScanSummary, ScanError> {
        let all = collect_components(tree);
        let (selected, cached) = select_components(all, quick, self.cache.as_ref());
        let mut summary = ScanSummary {
            requested: selected.len() + cached,
            cached,
            ..Default::default()
        };
        tracing::info!(
            components = summary.requested,
            cached = summary.cached,
            "Scanning components"
        );

        match self.mode {
            ScanMode::Components => {
                self.scan_pages(&selected, cancel, progress, &mut summary)
                    .await?
            }
            ScanMode::Graph => {
                self.scan_graphs(tree, &selected, cancel, progress, &mut summary)
                    .await?
            }
        }
        Ok(summary)
    }

    async fn scan_pages(
        &self,
        selected: &[String],
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let pages: Vec<&[String]> = selected.chunks(self.page_size).collect();
        summary.pages = pages.len();
        let mut written = BTreeMap::new();

        for (index, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let result = self.service.scan_components(page).await;
            self.handle_result(result, page, index, &mut written, summary);
            progress(ScanProgress {
                page: index + 1,
                pages: pages.len(),
                components: summary.submitted,
            });
        }
        Ok(())
    }

    async fn scan_graphs(
        &self,
        tree: &DependencyTree,
        selected: &[String],
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let wanted: HashSet<&str> = selected.iter().map(|id| short_component_id(id)).collect();
        let graphs: Vec<_> = tree
            .top_level_roots()
            .into_iter()
            .filter_map(|root| graph_request(tree, root, |id| wanted.contains(id)))
            .collect();
        summary.pages = graphs.len();
        let mut written = BTreeMap::new();

        for (index, graph) in graphs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let requested = graph.component_ids();
            let result = self.service.scan_graph(graph).await;
            self.handle_result(result, &requested, index, &mut written, summary);
            progress(ScanProgress {
                page: index + 1,
                pages: graphs.len(),
                components: summary.submitted,
            });
        }
        Ok(())
    }

    fn handle_result(
        &self,
        result: anyhow::Result<ScanResponse>,
        requested: &[String],
        index: usize,
        written: &mut BTreeMap<String, IssueRecord>,
        summary: &mut ScanSummary,
    ) {
        summary.submitted += requested.len();
        match result {
            Ok(response) => {
                let mut results = response.to_results();
                summary.missing += results.add_missing(requested);
                results.store(self.cache.as_ref(), written);
                tracing::debug!(page = index + 1, components = requested.len(), "Scan page stored");
            }
            Err(e) => {
                tracing::warn!(
                    page = index + 1,
                    components = requested.len(),
                    "Scan request failed, continuing with cached results: {:#}",
                    e
                );
                summary.failed_pages += 1;
                summary.last_error = Some(ScanError::Remote(e));
            }
        }
    }
}
