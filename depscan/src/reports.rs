//! Workspace issue reports
//!
//! A [`Report`] is built from a refresh snapshot and rendered as JSON,
//! Markdown or a short plain-text summary.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{PackageType, Severity};
use crate::workspace::Snapshot;

/// Issue counts per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub total: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub information: u32,
    pub unknown: u32,
}

impl SeveritySummary {
    pub fn add(&mut self, severity: Severity) {
        self.total += 1;
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Information => self.information += 1,
            Severity::Unknown | Severity::Pending | Severity::Normal => self.unknown += 1,
        }
    }
}

/// One issue on one dependency of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub project: String,
    pub component: String,
    pub package_type: PackageType,
    pub indirect: bool,
    pub issue_id: String,
    pub severity: Severity,
    pub summary: String,
    pub cves: Vec<String>,
    pub fixed_versions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub watch_names: Vec<String>,
    /// Number of dependency paths leading to the component
    pub paths_count: usize,
}

/// Project that could not be built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedProject {
    pub project: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub workspace: String,
    pub generated_at: DateTime<Utc>,
    pub projects: usize,
    pub summary: SeveritySummary,
    pub entries: Vec<ReportEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedProject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violated_licenses: Vec<String>,
}

impl Report {
    /// Collect every dependency issue of the snapshot, worst first
    pub fn from_snapshot(workspace: &Path, snapshot: &Snapshot) -> Self {
        let tree = &snapshot.tree;
        let mut entries = Vec::new();
        let mut failed = Vec::new();
        let mut violated_licenses: Vec<String> = Vec::new();

        for root in tree.roots() {
            let node = tree.node(root);
            if let Some(error) = node.project().and_then(|p| p.build_error.as_ref()) {
                failed.push(FailedProject {
                    project: node.label.clone(),
                    reason: error.to_string(),
                });
            }
        }

        for (root, results) in &snapshot.projects {
            let project = tree.node(*root).label.clone();
            for dependency in &results.dependencies {
                for license in dependency.licenses.iter().filter(|l| l.violated) {
                    if !violated_licenses.contains(&license.name) {
                        violated_licenses.push(license.name.clone());
                    }
                }
                for issue in &dependency.issues {
                    let paths_count = results
                        .impact
                        .get(&(issue.issue_id.clone(), dependency.component.clone()))
                        .map_or(0, |g| g.paths_count);
                    entries.push(ReportEntry {
                        project: project.clone(),
                        component: dependency.component.clone(),
                        package_type: dependency.package_type,
                        indirect: dependency.indirect,
                        issue_id: issue.issue_id.clone(),
                        severity: issue.severity,
                        summary: issue.summary.clone(),
                        cves: issue.cves.clone(),
                        fixed_versions: issue.fixed_versions.clone(),
                        watch_names: issue.watch_names.clone(),
                        paths_count,
                    });
                }
            }
        }

        // stable: ties keep project order
        entries.sort_by(|a, b| b.severity.cmp(&a.severity));
        let mut summary = SeveritySummary::default();
        for entry in &entries {
            summary.add(entry.severity);
        }
        violated_licenses.sort();

        Self {
            workspace: workspace.display().to_string(),
            generated_at: snapshot.scanned_at.unwrap_or_else(Utc::now),
            projects: tree.roots().len(),
            summary,
            entries,
            failed,
            violated_licenses,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "⚠",
        Severity::High => "▲",
        Severity::Medium => "●",
        _ => "○",
    }
}

/// Truncate to `max_chars` characters, counting the trailing ellipsis
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn generate_markdown_report(report: &Report) -> String {
    let summary = &report.summary;
    let mut lines = vec![
        "# Dependency Scan Report".to_string(),
        String::new(),
        format!("**Workspace**: {}", report.workspace),
        format!("**Date**: {}", report.generated_at.format("%Y-%m-%d %H:%M UTC")),
        format!("**Projects**: {}", report.projects),
        String::new(),
        "## Summary".to_string(),
        "| Severity | Count |".to_string(),
        "|----------|-------|".to_string(),
        format!("| ⚠ Critical | {} |", summary.critical),
        format!("| ▲ High | {} |", summary.high),
        format!("| ● Medium | {} |", summary.medium),
        format!("| ○ Low | {} |", summary.low),
        format!("| ○ Information | {} |", summary.information),
        format!("| ? Unknown | {} |", summary.unknown),
        format!("| **Total** | **{}** |", summary.total),
        String::new(),
    ];

    if report.entries.is_empty() {
        lines.push("## No issues found".to_string());
        lines.push(String::new());
        lines.push("✅ No known issues in the scanned dependencies.".to_string());
    } else {
        lines.push("## Issues".to_string());
        lines.push(String::new());
        lines.push("| Severity | Issue | Component | Project | Direct | Fixed in | Summary |".to_string());
        lines.push("|----------|-------|-----------|---------|--------|----------|---------|".to_string());
        for entry in &report.entries {
            let issue = if entry.cves.is_empty() {
                entry.issue_id.clone()
            } else {
                format!("{} ({})", entry.issue_id, entry.cves.join(", "))
            };
            lines.push(format!(
                "| {} {} | {} | {} | {} | {} | {} | {} |",
                severity_icon(entry.severity),
                entry.severity.as_str(),
                issue,
                entry.component,
                entry.project,
                if entry.indirect { "no" } else { "yes" },
                if entry.fixed_versions.is_empty() {
                    "-".to_string()
                } else {
                    entry.fixed_versions.join(", ")
                },
                truncate(&entry.summary.replace('|', "\\|"), 80),
            ));
        }
    }

    if !report.violated_licenses.is_empty() {
        lines.push(String::new());
        lines.push("## Violated licenses".to_string());
        lines.push(String::new());
        lines.extend(report.violated_licenses.iter().map(|l| format!("- {l}")));
    }

    if !report.failed.is_empty() {
        lines.push(String::new());
        lines.push("## Projects not scanned".to_string());
        lines.push(String::new());
        lines.extend(
            report
                .failed
                .iter()
                .map(|f| format!("- **{}**: {}", f.project, f.reason)),
        );
    }

    lines.join("\n")
}

/// Short plain-text summary for terminals
pub fn format_summary(report: &Report) -> String {
    let s = &report.summary;
    let mut out = format!(
        "{} project(s), {} issue(s): {} critical, {} high, {} medium, {} low, {} other\n",
        report.projects,
        s.total,
        s.critical,
        s.high,
        s.medium,
        s.low,
        s.information + s.unknown
    );
    for entry in &report.entries {
        let _ = writeln!(
            out,
            "  {} {:<9} {:<20} {} [{}]{}",
            severity_icon(entry.severity),
            entry.severity.as_str(),
            entry.issue_id,
            entry.component,
            entry.project,
            if entry.indirect { " (indirect)" } else { "" }
        );
    }
    for failed in &report.failed {
        let _ = writeln!(out, "  ! {}: {}", failed.project, truncate(&failed.reason, 100));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::BuildError;
    use crate::impact::{DependencyIssues, ImpactGraph, IssueEntry, LicenseEntry};
    use crate::tree::DependencyTree;
    use crate::tree::tests::root_info;
    use crate::workspace::ProjectResults;

    fn issue(id: &str, severity: Severity) -> IssueEntry {
        IssueEntry {
            issue_id: id.to_string(),
            severity,
            summary: format!("{id} | summary"),
            cves: vec![],
            fixed_versions: vec!["2.0.0".to_string()],
            watch_names: vec![],
        }
    }

    fn snapshot() -> Snapshot {
        let mut tree = DependencyTree::new();
        let root = tree.add_root(tree.top(), root_info("app", "1.0.0"), "app");
        let broken = tree.add_root(tree.top(), root_info("broken", "1.0.0"), "broken");
        tree.set_build_error(broken, BuildError::NotInstalled("npm ls failed".to_string()));

        let mut graph = ImpactGraph::new(50);
        graph.paths_count = 3;
        let mut impact = BTreeMap::new();
        impact.insert(("XRAY-2".to_string(), "b:1.0.0".to_string()), graph);

        let dependencies = vec![
            DependencyIssues {
                component: "a:1.0.0".to_string(),
                package_type: PackageType::Npm,
                indirect: false,
                issues: vec![issue("XRAY-1", Severity::Low)],
                licenses: vec![LicenseEntry { name: "GPL-3.0".to_string(), violated: true }],
            },
            DependencyIssues {
                component: "b:1.0.0".to_string(),
                package_type: PackageType::Npm,
                indirect: true,
                issues: vec![IssueEntry {
                    cves: vec!["CVE-2024-1".to_string()],
                    ..issue("XRAY-2", Severity::Critical)
                }],
                licenses: vec![],
            },
        ];
        Snapshot {
            tree,
            projects: BTreeMap::from([(root, ProjectResults { impact, dependencies })]),
            scanned_at: None,
        }
    }

    #[test]
    fn test_report_from_snapshot() {
        let report = Report::from_snapshot(Path::new("/ws"), &snapshot());

        assert_eq!(report.projects, 2);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.critical, 1);
        assert_eq!(report.summary.low, 1);
        assert_eq!(report.entries[0].issue_id, "XRAY-2");
        assert_eq!(report.entries[0].paths_count, 3);
        assert!(report.entries[0].indirect);
        assert_eq!(report.entries[1].paths_count, 0);
        assert_eq!(report.violated_licenses, vec!["GPL-3.0"]);
        assert_eq!(report.failed[0].project, "broken");
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = Report::from_snapshot(Path::new("/ws"), &snapshot());
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Dependency Scan Report"));
        assert!(markdown.contains("**Workspace**: /ws"));
        assert!(markdown.contains("| ⚠ Critical | 1 |"));
        assert!(markdown.contains("XRAY-2 (CVE-2024-1)"));
        assert!(markdown.contains("XRAY-2 \\| summary"));
        assert!(markdown.contains("## Violated licenses"));
        assert!(markdown.contains("- **broken**: dependencies are not installed: npm ls failed"));
    }

    #[test]
    fn test_markdown_without_issues() {
        let report = Report::from_snapshot(Path::new("/ws"), &Snapshot::default());
        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("## No issues found"));
        assert!(!markdown.contains("## Projects not scanned"));
    }

    #[test]
    fn test_json_and_summary() {
        let report = Report::from_snapshot(Path::new("/ws"), &snapshot());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["critical"], 1);
        assert_eq!(json["entries"][0]["severity"], "Critical");
        assert_eq!(json["entries"][1]["package_type"], "npm");

        let text = format_summary(&report);
        assert!(text.starts_with("2 project(s), 2 issue(s): 1 critical"));
        assert!(text.contains("(indirect)"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("日本語test", 6), "日本語...");
    }
}
