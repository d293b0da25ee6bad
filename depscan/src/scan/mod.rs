//! Remote scan service contract and scan result handling
//!
//! The remote service answers with a flat list of findings, each mapping
//! prefixed component ids (`npm://left-pad:1.3.0`) to the affected
//! package. [`ScanResponse::to_results`] turns that into per-component
//! [`NodeInfo`] entries plus issue and license records, the shape the
//! cache stores.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{ReadCache, WriteCache};
use crate::model::{
    IssueKey, IssueRecord, LicenseKey, LicenseRecord, MISSING_COMPONENT_ISSUE_ID, NodeInfo,
    Severity, short_component_id,
};
use crate::tree::{DependencyTree, NodeId};

pub mod client;
pub mod graph;
pub mod scheduler;

pub use client::HttpScanClient;
pub use graph::GraphRequestModel;
pub use scheduler::{ScanProgress, ScanScheduler, ScanSummary};

/// Affected package of a finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentImpact {
    pub package_name: String,
    pub package_version: String,
    pub fixed_versions: Vec<String>,
}

/// A vulnerability or policy violation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    pub issue_id: String,
    pub summary: String,
    pub severity: String,
    /// Prefixed component id -> affected package
    pub components: BTreeMap<String, ComponentImpact>,
    pub cves: Vec<String>,
    pub references: Vec<String>,
    /// Policy that raised a violation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_name: Option<String>,
    /// Set on license violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_name: Option<String>,
}

impl Finding {
    pub fn is_license_violation(&self) -> bool {
        self.license_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A license found on one or more components
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseFinding {
    pub license_key: String,
    pub license_name: String,
    pub components: BTreeMap<String, ComponentImpact>,
    pub references: Vec<String>,
}

/// Response of the remote scan service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResponse {
    pub vulnerabilities: Vec<Finding>,
    pub violations: Vec<Finding>,
    pub licenses: Vec<LicenseFinding>,
    /// Components the service recognised, findings or not
    pub scanned: Vec<String>,
}

/// Per-component results ready for the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResults {
    pub components: BTreeMap<String, NodeInfo>,
    pub issues: BTreeMap<String, IssueRecord>,
    pub licenses: BTreeMap<String, LicenseRecord>,
}

impl ScanResponse {
    pub fn is_empty(&self) -> bool {
        self.vulnerabilities.is_empty() && self.violations.is_empty() && self.licenses.is_empty()
    }

    /// Append another response, typically the next page
    pub fn merge(&mut self, other: ScanResponse) {
        self.vulnerabilities.extend(other.vulnerabilities);
        self.violations.extend(other.violations);
        self.licenses.extend(other.licenses);
        self.scanned.extend(other.scanned);
    }

    /// Violations first, then vulnerabilities
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.violations.iter().chain(self.vulnerabilities.iter())
    }

    /// Convert to per-component node infos and issue/license records
    ///
    /// Violations carrying a license key become violated licenses. A plain
    /// license never replaces a violated one with the same key.
    pub fn to_results(&self) -> ScanResults {
        let mut results = ScanResults::default();
        for id in &self.scanned {
            results
                .components
                .entry(short_component_id(id).to_string())
                .or_default();
        }
        for violation in &self.violations {
            if violation.is_license_violation() {
                let key = violation.license_key.clone().unwrap_or_default();
                let record = LicenseRecord {
                    name: key.clone(),
                    full_name: violation.license_name.clone().unwrap_or_default(),
                    violated: true,
                    more_info_url: violation.references.first().cloned(),
                };
                results.add_license(record, violation.components.keys());
            } else {
                results.add_finding(violation);
            }
        }
        for vulnerability in &self.vulnerabilities {
            results.add_finding(vulnerability);
        }
        for license in &self.licenses {
            if results
                .licenses
                .get(&license.license_key)
                .is_some_and(|l| l.violated)
            {
                continue;
            }
            let record = LicenseRecord {
                name: license.license_key.clone(),
                full_name: license.license_name.clone(),
                violated: false,
                more_info_url: license.references.first().cloned(),
            };
            results.add_license(record, license.components.keys());
        }
        results
    }
}

impl ScanResults {
    fn add_finding(&mut self, finding: &Finding) {
        let severity = Severity::from_str_loose(&finding.severity);
        for (component_id, impact) in &finding.components {
            let record = IssueRecord {
                issue_id: finding.issue_id.clone(),
                severity,
                summary: if finding.summary.is_empty() {
                    "N/A".to_string()
                } else {
                    finding.summary.clone()
                },
                fixed_versions: impact.fixed_versions.clone(),
                cves: finding.cves.clone(),
                references: finding.references.clone(),
                watch_names: finding.watch_name.iter().cloned().collect(),
            };
            match self.issues.get_mut(&finding.issue_id) {
                Some(existing) => existing.merge(&record),
                None => {
                    self.issues.insert(finding.issue_id.clone(), record);
                }
            }

            let short = short_component_id(component_id).to_string();
            self.components
                .entry(short.clone())
                .or_default()
                .add_issue(IssueKey::new(finding.issue_id.clone(), short), severity);
        }
    }

    fn add_license<'a>(
        &mut self,
        record: LicenseRecord,
        components: impl Iterator<Item = &'a String>,
    ) {
        for component_id in components {
            self.components
                .entry(short_component_id(component_id).to_string())
                .or_default()
                .add_license(LicenseKey::new(record.name.clone(), record.violated));
        }
        self.licenses.insert(record.name.clone(), record);
    }

    /// Synthesize results for requested components the service did not return
    ///
    /// Returns the number of components added.
    pub fn add_missing(&mut self, requested: &[String]) -> usize {
        let mut added = 0;
        for id in requested {
            let short = short_component_id(id);
            if self.components.contains_key(short) {
                continue;
            }
            tracing::debug!(component = %short, "Component missing from scan response");
            self.components
                .insert(short.to_string(), NodeInfo::missing(short));
            added += 1;
        }
        if added > 0 {
            self.issues
                .entry(MISSING_COMPONENT_ISSUE_ID.to_string())
                .or_insert_with(IssueRecord::missing_component);
        }
        added
    }

    /// Write every result to the cache
    ///
    /// Issue records already written during the same scan (`written`) are
    /// merged rather than replaced, so watch names from earlier pages survive.
    pub fn store(&self, cache: &dyn WriteCache, written: &mut BTreeMap<String, IssueRecord>) {
        for record in self.issues.values() {
            let merged = match written.get_mut(&record.issue_id) {
                Some(existing) => {
                    existing.merge(record);
                    existing.clone()
                }
                None => {
                    written.insert(record.issue_id.clone(), record.clone());
                    record.clone()
                }
            };
            cache.put_issue(merged);
        }
        for record in self.licenses.values() {
            cache.put_license(record.clone());
        }
        for (component_id, info) in &self.components {
            cache.put(component_id.clone(), info.clone());
        }
    }
}

/// Remote vulnerability scanning service
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Scan a page of prefixed component ids
    async fn scan_components(&self, component_ids: &[String]) -> anyhow::Result<ScanResponse>;

    /// Scan a flattened dependency graph
    async fn scan_graph(&self, graph: &GraphRequestModel) -> anyhow::Result<ScanResponse>;
}

/// Rebuild a response for one project from cached results
///
/// Every component owned by `root` that has a cache entry contributes its
/// issues and licenses. Issues raised by several watches are reported once
/// per watch, the way the service reports them.
pub fn response_from_cache(
    tree: &DependencyTree,
    root: NodeId,
    cache: &dyn ReadCache,
) -> ScanResponse {
    let mut issues: BTreeMap<(String, Option<String>), Finding> = BTreeMap::new();
    let mut licenses: BTreeMap<String, LicenseFinding> = BTreeMap::new();
    let mut violated: BTreeMap<String, Finding> = BTreeMap::new();
    let mut seen = hashbrown::HashSet::new();

    for id in tree.project_nodes(root).into_iter().skip(1) {
        let node = tree.node(id);
        let short = node.component_id();
        if !seen.insert(short.clone()) {
            continue;
        }
        let Some(info) = cache.get(&short) else {
            continue;
        };
        let full_id = format!("{}{}", node.info.package_type.component_prefix(), short);
        let impact = |fixed_versions: Vec<String>| ComponentImpact {
            package_name: node.info.name(),
            package_version: node.info.version.clone(),
            fixed_versions,
        };

        for key in &info.issues {
            if key.issue_id == MISSING_COMPONENT_ISSUE_ID {
                continue;
            }
            let record = cache.get_issue(&key.issue_id).unwrap_or_else(|| IssueRecord {
                issue_id: key.issue_id.clone(),
                severity: info.top_severity,
                ..Default::default()
            });
            let watches: Vec<Option<String>> = if record.watch_names.is_empty() {
                vec![None]
            } else {
                record.watch_names.iter().cloned().map(Some).collect()
            };
            for watch in watches {
                let finding = issues
                    .entry((record.issue_id.clone(), watch.clone()))
                    .or_insert_with(|| Finding {
                        issue_id: record.issue_id.clone(),
                        summary: record.summary.clone(),
                        severity: record.severity.as_str().to_string(),
                        cves: record.cves.clone(),
                        references: record.references.clone(),
                        watch_name: watch,
                        ..Default::default()
                    });
                finding
                    .components
                    .insert(full_id.clone(), impact(record.fixed_versions.clone()));
            }
        }

        for license in &info.licenses {
            let record = cache.get_license(&license.name);
            let full_name = record
                .as_ref()
                .map(|r| r.full_name.clone())
                .unwrap_or_default();
            let references: Vec<String> = record
                .and_then(|r| r.more_info_url)
                .into_iter()
                .collect();
            if license.violated {
                violated
                    .entry(license.name.clone())
                    .or_insert_with(|| Finding {
                        issue_id: license.name.clone(),
                        severity: Severity::Unknown.as_str().to_string(),
                        references: references.clone(),
                        license_key: Some(license.name.clone()),
                        license_name: Some(full_name.clone()),
                        ..Default::default()
                    })
                    .components
                    .insert(full_id.clone(), impact(Vec::new()));
            } else {
                licenses
                    .entry(license.name.clone())
                    .or_insert_with(|| LicenseFinding {
                        license_key: license.name.clone(),
                        license_name: full_name,
                        references,
                        ..Default::default()
                    })
                    .components
                    .insert(full_id.clone(), impact(Vec::new()));
            }
        }
    }

    let mut response = ScanResponse {
        licenses: licenses.into_values().collect(),
        violations: violated.into_values().collect(),
        ..Default::default()
    };
    for ((_, watch), finding) in issues {
        if watch.is_some() {
            response.violations.push(finding);
        } else {
            response.vulnerabilities.push(finding);
        }
    }
    response
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::tree::tests::{npm, root_info};

    pub(crate) fn finding(issue_id: &str, severity: &str, components: &[&str]) -> Finding {
        Finding {
            issue_id: issue_id.to_string(),
            severity: severity.to_string(),
            summary: format!("{issue_id} summary"),
            components: components
                .iter()
                .map(|id| {
                    let short = short_component_id(id);
                    let (name, version) = short.rsplit_once(':').unwrap_or((short, ""));
                    (
                        id.to_string(),
                        ComponentImpact {
                            package_name: name.to_string(),
                            package_version: version.to_string(),
                            fixed_versions: vec!["9.9.9".to_string()],
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_to_results_vulnerabilities() {
        let response = ScanResponse {
            vulnerabilities: vec![
                finding("XRAY-1", "High", &["npm://a:1.0.0", "npm://b:1.0.0"]),
                finding("XRAY-2", "low", &["npm://a:1.0.0"]),
            ],
            ..Default::default()
        };
        let results = response.to_results();

        let a = &results.components["a:1.0.0"];
        assert_eq!(a.top_severity, Severity::High);
        assert_eq!(a.issues.len(), 2);
        assert_eq!(a.issues[0].component, "a:1.0.0");
        assert_eq!(results.issues["XRAY-2"].severity, Severity::Low);
        assert_eq!(results.issues["XRAY-1"].fixed_versions, vec!["9.9.9"]);
    }

    #[test]
    fn test_license_violation_wins_over_plain_license() {
        let response = ScanResponse {
            violations: vec![Finding {
                issue_id: "GPL-violation".to_string(),
                license_key: Some("GPL-3.0".to_string()),
                license_name: Some("GNU GPL v3".to_string()),
                components: BTreeMap::from([("npm://a:1.0.0".to_string(), ComponentImpact::default())]),
                ..Default::default()
            }],
            licenses: vec![LicenseFinding {
                license_key: "GPL-3.0".to_string(),
                components: BTreeMap::from([("npm://b:1.0.0".to_string(), ComponentImpact::default())]),
                ..Default::default()
            }],
            ..Default::default()
        };
        let results = response.to_results();

        assert!(results.licenses["GPL-3.0"].violated);
        assert_eq!(results.licenses["GPL-3.0"].full_name, "GNU GPL v3");
        assert_eq!(
            results.components["a:1.0.0"].licenses,
            vec![LicenseKey::new("GPL-3.0", true)]
        );
        // the plain license entry was skipped entirely
        assert!(!results.components.contains_key("b:1.0.0"));
        assert!(results.issues.is_empty());
    }

    #[test]
    fn test_add_missing_components() {
        let response = ScanResponse {
            vulnerabilities: vec![finding("XRAY-1", "Medium", &["npm://p:1.0.0"])],
            ..Default::default()
        };
        let mut results = response.to_results();
        let added = results.add_missing(&["npm://p:1.0.0".to_string(), "npm://q:1.0.0".to_string()]);

        assert_eq!(added, 1);
        assert_eq!(results.components["p:1.0.0"].top_severity, Severity::Medium);
        let q = &results.components["q:1.0.0"];
        assert!(q.is_missing());
        assert_eq!(q.top_severity, Severity::Unknown);
        assert!(results.issues.contains_key(MISSING_COMPONENT_ISSUE_ID));
    }

    #[test]
    fn test_scanned_components_are_not_missing() {
        let response = ScanResponse {
            scanned: vec!["npm://clean:1.0.0".to_string()],
            ..Default::default()
        };
        let mut results = response.to_results();
        assert_eq!(results.add_missing(&["npm://clean:1.0.0".to_string()]), 0);
        assert_eq!(results.components["clean:1.0.0"], NodeInfo::default());
    }

    #[test]
    fn test_store_merges_watch_names_across_pages() {
        let cache = MemoryCache::new();
        let mut written = BTreeMap::new();

        let mut first = finding("XRAY-1", "High", &["npm://a:1.0.0"]);
        first.watch_name = Some("security".to_string());
        let mut second = finding("XRAY-1", "High", &["npm://b:1.0.0"]);
        second.watch_name = Some("release".to_string());

        ScanResponse {
            violations: vec![first],
            ..Default::default()
        }
        .to_results()
        .store(&cache, &mut written);
        ScanResponse {
            violations: vec![second],
            ..Default::default()
        }
        .to_results()
        .store(&cache, &mut written);

        let record = cache.get_issue("XRAY-1").unwrap();
        assert_eq!(record.watch_names, vec!["security", "release"]);
        assert!(cache.is_valid("a:1.0.0"));
        assert!(cache.is_valid("b:1.0.0"));
    }

    #[test]
    fn test_response_from_cache() {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let a = tree.add_child(root, npm("a", "1.0.0"));
        tree.add_child(a, npm("b", "2.0.0"));

        let cache = MemoryCache::new();
        let mut results = ScanResponse {
            violations: vec![Finding {
                watch_name: Some("security".to_string()),
                ..finding("XRAY-9", "Critical", &["npm://b:2.0.0"])
            }],
            ..Default::default()
        }
        .to_results();
        results.add_missing(&["npm://a:1.0.0".to_string()]);
        results.store(&cache, &mut BTreeMap::new());

        let response = response_from_cache(&tree, root, &cache);
        assert!(response.vulnerabilities.is_empty());
        assert_eq!(response.violations.len(), 1);
        let violation = &response.violations[0];
        assert_eq!(violation.issue_id, "XRAY-9");
        assert_eq!(violation.watch_name.as_deref(), Some("security"));
        let impact = &violation.components["npm://b:2.0.0"];
        assert_eq!(impact.package_name, "b");
        assert_eq!(impact.fixed_versions, vec!["9.9.9"]);
        // the missing-component sentinel is not a finding
        assert!(response.findings().all(|f| f.issue_id != MISSING_COMPONENT_ISSUE_ID));
    }
}
