//! Per-ecosystem dependency tree builders
//!
//! Each builder describes the commands it needs ([`TreeBuilder::commands`])
//! and turns their captured output into a tree fragment
//! ([`TreeBuilder::build`]). The fragment's top node holds one or more
//! project roots; the factory grafts them into the workspace tree.
//!
//! Builders never fail. A tool that produced nothing usable yields a root
//! with no children and a [`BuildError`] marker; a tool that failed but
//! still printed parsable output yields whatever could be parsed.

use std::path::Path;

use crate::command::{CommandRunner, display_command};
use crate::config::ToolsConfig;
use crate::error::{BuildError, CommandError};
use crate::model::{GeneralInfo, PackageType};
use crate::tree::{DependencyTree, NodeId};

pub mod go;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod pnpm;
pub mod python;
pub mod yarn;

/// Suffix appended to the label of projects whose dependencies are missing
pub const NOT_INSTALLED_SUFFIX: &str = " [Not installed]";

/// One command a builder needs to run in the project directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub label: &'static str,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(label: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of one executed [`ToolCommand`]
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub label: &'static str,
    pub command: String,
    pub result: Result<String, CommandError>,
}

/// Everything captured for one descriptor
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub runs: Vec<ToolRun>,
    /// Descriptor file content, for builders that read it
    pub manifest: Option<String>,
}

/// Usable part of a tool run
#[derive(Debug, Clone, Copy)]
pub enum ToolOutput<'a> {
    Complete(&'a str),
    /// Non-zero exit, but stdout was captured
    Partial(&'a str, &'a CommandError),
    Failed(&'a CommandError),
}

impl RawOutput {
    pub fn with_output(mut self, label: &'static str, stdout: impl Into<String>) -> Self {
        self.runs.push(ToolRun {
            label,
            command: label.to_string(),
            result: Ok(stdout.into()),
        });
        self
    }

    pub fn with_failure(mut self, label: &'static str, error: CommandError) -> Self {
        self.runs.push(ToolRun {
            label,
            command: label.to_string(),
            result: Err(error),
        });
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    pub fn output(&self, label: &str) -> Option<ToolOutput<'_>> {
        let run = self.runs.iter().find(|r| r.label == label)?;
        Some(match &run.result {
            Ok(stdout) => ToolOutput::Complete(stdout),
            Err(e) => match e.partial_stdout() {
                Some(stdout) => ToolOutput::Partial(stdout, e),
                None => ToolOutput::Failed(e),
            },
        })
    }
}

/// Builds the dependency tree of one ecosystem
pub trait TreeBuilder: Send + Sync {
    fn package_type(&self) -> PackageType;

    /// Program this builder invokes
    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str;

    /// Arguments of the installation check
    fn probe_args(&self) -> &'static [&'static str] {
        &["--version"]
    }

    /// Commands to run in the descriptor's directory
    fn commands(&self, descriptor: &Path) -> Vec<ToolCommand>;

    /// Whether the descriptor content should be captured too
    fn reads_manifest(&self) -> bool {
        false
    }

    /// Turn captured output into a fragment whose top node holds the project roots
    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree;
}

static GO: go::GoBuilder = go::GoBuilder;
static MAVEN: maven::MavenBuilder = maven::MavenBuilder;
static NPM: npm::NpmBuilder = npm::NpmBuilder;
static YARN: yarn::YarnBuilder = yarn::YarnBuilder;
static PNPM: pnpm::PnpmBuilder = pnpm::PnpmBuilder;
static NUGET: nuget::NugetBuilder = nuget::NugetBuilder;
static PYTHON: python::PythonBuilder = python::PythonBuilder;

/// Builder registered for an ecosystem
pub fn builder_for(package_type: PackageType) -> Option<&'static dyn TreeBuilder> {
    match package_type {
        PackageType::Go => Some(&GO),
        PackageType::Maven => Some(&MAVEN),
        PackageType::Npm => Some(&NPM),
        PackageType::Yarn => Some(&YARN),
        PackageType::Pnpm => Some(&PNPM),
        PackageType::Nuget => Some(&NUGET),
        PackageType::Python => Some(&PYTHON),
        PackageType::Unknown => None,
    }
}

/// Run a builder's commands for one descriptor
pub async fn collect(
    builder: &dyn TreeBuilder,
    runner: &dyn CommandRunner,
    tools: &ToolsConfig,
    descriptor: &Path,
) -> RawOutput {
    let program = builder.program(tools);
    let cwd = project_dir(descriptor);
    let mut raw = RawOutput::default();

    for command in builder.commands(descriptor) {
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let result = runner.run(program, &args, cwd).await;
        raw.runs.push(ToolRun {
            label: command.label,
            command: display_command(program, &args),
            result,
        });
    }

    if builder.reads_manifest() {
        match tokio::fs::read_to_string(descriptor).await {
            Ok(content) => raw.manifest = Some(content),
            Err(e) => tracing::debug!(
                descriptor = %descriptor.display(),
                "Could not read descriptor: {}",
                e
            ),
        }
    }
    raw
}

/// Directory a descriptor lives in
pub fn project_dir(descriptor: &Path) -> &Path {
    match descriptor.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Last path component of the project directory
pub(crate) fn dir_name(descriptor: &Path) -> String {
    project_dir(descriptor)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| project_dir(descriptor).display().to_string())
}

/// Add a project root for `descriptor` to a fresh fragment
pub(crate) fn new_project(
    descriptor: &Path,
    info: GeneralInfo,
    label: impl Into<String>,
) -> (DependencyTree, NodeId) {
    let mut tree = DependencyTree::new();
    let root = tree.add_root(tree.top(), info.with_path(project_dir(descriptor)), label);
    (tree, root)
}

/// Fragment for a project whose tool produced nothing usable
pub(crate) fn failed_project(
    descriptor: &Path,
    package_type: PackageType,
    name: Option<String>,
    error: BuildError,
) -> DependencyTree {
    let name = name.unwrap_or_else(|| project_dir(descriptor).display().to_string());
    tracing::warn!(
        descriptor = %descriptor.display(),
        ecosystem = %package_type,
        "Could not build dependency tree: {}",
        error
    );
    let label = format!("{name}{NOT_INSTALLED_SUFFIX}");
    let (mut tree, root) = new_project(
        descriptor,
        GeneralInfo::new(label.clone(), "", package_type),
        label,
    );
    tree.set_build_error(root, error);
    tree
}

/// Log a command that failed but still printed usable output
pub(crate) fn log_partial(descriptor: &Path, error: &CommandError, hint: &str) {
    match error {
        CommandError::Failed {
            command, stderr, ..
        } => tracing::warn!(
            descriptor = %descriptor.display(),
            command = %command,
            stderr = %stderr.trim(),
            "Build tool reported errors, using partial output. {}",
            hint
        ),
        other => tracing::warn!(descriptor = %descriptor.display(), "{}. {}", other, hint),
    }
}

/// Add a node unless the same component is already one of its ancestors
pub(crate) fn add_acyclic(
    tree: &mut DependencyTree,
    parent: NodeId,
    info: GeneralInfo,
) -> Option<NodeId> {
    let component_id = info.component_id();
    if tree.node(parent).component_id() == component_id
        || tree.has_ancestor_with_id(parent, &component_id)
    {
        tracing::debug!(component = %component_id, "Dependency cycle detected, skipping");
        return None;
    }
    Some(tree.add_child(parent, info))
}
