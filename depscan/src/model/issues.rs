//! Issue and license annotations

use serde::{Deserialize, Serialize};

use super::Severity;

/// Issue id of the sentinel attached to components the scanner did not recognise
pub const MISSING_COMPONENT_ISSUE_ID: &str = "MISSING-COMPONENT";

/// License name attached to components the scanner did not recognise
pub const UNKNOWN_LICENSE: &str = "Unknown";

/// Reference from a node to an issue
///
/// `component` is the id of the node that raised the issue. When an issue
/// bubbles up to an ancestor the key keeps pointing at the original node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueKey {
    pub issue_id: String,
    pub component: String,
}

impl IssueKey {
    pub fn new(issue_id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            component: component.into(),
        }
    }
}

/// License attached to a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LicenseKey {
    pub name: String,
    /// True when a policy flagged this license
    pub violated: bool,
}

impl LicenseKey {
    pub fn new(name: impl Into<String>, violated: bool) -> Self {
        Self {
            name: name.into(),
            violated,
        }
    }
}

/// Scan result for one component, as stored in the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub top_severity: Severity,
    pub issues: Vec<IssueKey>,
    pub licenses: Vec<LicenseKey>,
}

impl NodeInfo {
    /// Info for a component the scanner did not return
    pub fn missing(component_id: &str) -> Self {
        Self {
            top_severity: Severity::Unknown,
            issues: vec![IssueKey::new(MISSING_COMPONENT_ISSUE_ID, component_id)],
            licenses: vec![LicenseKey::new(UNKNOWN_LICENSE, false)],
        }
    }

    /// Add an issue, raising the top severity when needed
    pub fn add_issue(&mut self, key: IssueKey, severity: Severity) {
        if !self.issues.iter().any(|k| k.issue_id == key.issue_id) {
            self.issues.push(key);
        }
        self.top_severity = self.top_severity.max(severity);
    }

    /// Add a license unless one with the same name is already present
    ///
    /// A violated license replaces a plain one of the same name.
    pub fn add_license(&mut self, key: LicenseKey) {
        match self.licenses.iter_mut().find(|l| l.name == key.name) {
            Some(existing) => existing.violated |= key.violated,
            None => self.licenses.push(key),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.issues
            .iter()
            .any(|k| k.issue_id == MISSING_COMPONENT_ISSUE_ID)
    }
}

/// Details of an issue, stored once per issue id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub issue_id: String,
    pub severity: Severity,
    pub summary: String,
    pub fixed_versions: Vec<String>,
    pub cves: Vec<String>,
    pub references: Vec<String>,
    pub watch_names: Vec<String>,
}

impl IssueRecord {
    /// Sentinel record for components missing from the scan results
    pub fn missing_component() -> Self {
        Self {
            issue_id: MISSING_COMPONENT_ISSUE_ID.to_string(),
            severity: Severity::Unknown,
            summary: "Component is unknown to the scanner".to_string(),
            ..Default::default()
        }
    }

    /// Merge another report of the same issue into this record
    pub fn merge(&mut self, other: &IssueRecord) {
        self.severity = self.severity.max(other.severity);
        if self.summary.is_empty() {
            self.summary = other.summary.clone();
        }
        extend_unique(&mut self.fixed_versions, &other.fixed_versions);
        extend_unique(&mut self.cves, &other.cves);
        extend_unique(&mut self.references, &other.references);
        extend_unique(&mut self.watch_names, &other.watch_names);
    }
}

/// Details of a license
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub name: String,
    pub full_name: String,
    pub violated: bool,
    pub more_info_url: Option<String>,
}

pub(crate) fn extend_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}
