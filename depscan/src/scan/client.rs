//! HTTP client for the remote scan service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{GraphRequestModel, ScanResponse, ScanService};
use crate::config::{ScanConfig, ServerConfig};

const COMPONENTS_PATH: &str = "api/v1/summary/component";
const GRAPH_PATH: &str = "api/v1/scan/graph";

#[derive(Debug, Serialize)]
struct ComponentDetails<'a> {
    component_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ComponentsRequest<'a> {
    component_details: Vec<ComponentDetails<'a>>,
}

/// Scan service client
pub struct HttpScanClient {
    client: Arc<Client>,
    base_url: Url,
    access_token: Option<String>,
    project_key: Option<String>,
    watches: Vec<String>,
}

impl HttpScanClient {
    pub fn new(server: &ServerConfig, scan: &ScanConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("depscan/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(server.timeout_secs))
            .build()?;

        let mut base_url = Url::parse(&server.url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: Arc::new(client),
            base_url,
            access_token: server.resolved_token(),
            project_key: scan.project_key.clone().filter(|k| !k.is_empty()),
            watches: scan.watches.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Graph endpoint with the project and watch filters as query parameters
    fn graph_url(&self) -> anyhow::Result<Url> {
        let mut url = self.endpoint(GRAPH_PATH)?;
        if self.project_key.is_some() || !self.watches.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(project) = &self.project_key {
                query.append_pair("project", project);
            }
            for watch in &self.watches {
                query.append_pair("watch", watch);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ScanService for HttpScanClient {
    async fn scan_components(&self, component_ids: &[String]) -> anyhow::Result<ScanResponse> {
        if component_ids.is_empty() {
            return Ok(ScanResponse::default());
        }

        let request = ComponentsRequest {
            component_details: component_ids
                .iter()
                .map(|id| ComponentDetails { component_id: id })
                .collect(),
        };
        let url = self.endpoint(COMPONENTS_PATH)?;
        tracing::debug!(url = %url, components = component_ids.len(), "Scanning components");
        let response = self.post(url).json(&request).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Scan service error: {}", response.status());
        }
        Ok(response.json().await?)
    }

    async fn scan_graph(&self, graph: &GraphRequestModel) -> anyhow::Result<ScanResponse> {
        if graph.node_count() == 0 {
            return Ok(ScanResponse::default());
        }

        let url = self.graph_url()?;
        tracing::debug!(url = %url, nodes = graph.node_count(), "Scanning dependency graph");
        let response = self.post(url).json(graph).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Scan service graph error: {}", response.status());
        }
        Ok(response.json().await?)
    }
}
