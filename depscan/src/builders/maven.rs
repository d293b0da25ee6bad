//! Maven: `mvn dependency:tree`
//!
//! The plugin prints one section per reactor module:
//!
//! ```text
//! [INFO] --- maven-dependency-plugin:3.6.1:tree (default-cli) @ core ---
//! [INFO] com.example:core:jar:1.0.0
//! [INFO] +- org.slf4j:slf4j-api:jar:2.0.9:compile
//! [INFO] \- junit:junit:jar:4.13.2:test
//! [INFO]    \- org.hamcrest:hamcrest-core:jar:1.3:test
//! ```
//!
//! The first section is the project itself, later sections are its
//! modules. Nesting inside a section is inferred from the column of the
//! first word character on each line.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{RawOutput, ToolCommand, ToolOutput, TreeBuilder, failed_project, log_partial};
use crate::config::ToolsConfig;
use crate::error::BuildError;
use crate::model::GeneralInfo;
use crate::model::PackageType;
use crate::tree::{DependencyTree, NodeId};

const TREE: &str = "tree";

/// One module section of the plugin output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSection {
    /// `group:artifact:packaging:version`
    pub project: String,
    /// Raw dependency lines, tree glyphs included
    pub lines: Vec<String>,
}

/// Split plugin output into module sections
pub fn parse_sections(output: &str) -> Vec<ModuleSection> {
    let mut sections = Vec::new();
    let mut current: Option<ModuleSection> = None;

    for raw_line in output.lines() {
        let line = strip_log_prefix(raw_line);
        if line.contains("maven-dependency-plugin") && line.contains(":tree") {
            sections.extend(current.take());
            current = Some(ModuleSection::default());
            continue;
        }
        let Some(section) = current.as_mut() else {
            continue;
        };
        if section.project.is_empty() {
            if !line.trim().is_empty() {
                section.project = line.trim().to_string();
            }
            continue;
        }
        let is_tree_line = line.starts_with(['+', '|', '\\', ' ']) && line.contains(':');
        if !is_tree_line || line.trim().is_empty() {
            sections.extend(current.take());
            continue;
        }
        section.lines.push(line.to_string());
    }
    sections.extend(current);
    sections
}

fn strip_log_prefix(line: &str) -> &str {
    let line = line.trim_end();
    match line.strip_prefix("[INFO]") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    }
}

/// Column of the first word character, or `None` for lines without one
pub fn dependency_level(line: &str) -> Option<usize> {
    line.bytes()
        .position(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// `[group, artifact, version]` of a dependency line
///
/// The version is the second-to-last `:` field, which skips the scope and
/// any classifier.
pub fn dependency_info(line: &str) -> (String, String, String) {
    let parts: Vec<&str> = line.split(':').collect();
    let group = match dependency_level(parts[0]) {
        Some(start) => &parts[0][start..],
        None => "",
    };
    let artifact = parts.get(1).copied().unwrap_or_default();
    let version = if parts.len() >= 3 {
        parts[parts.len() - 2]
    } else {
        ""
    };
    (
        group.trim().to_string(),
        artifact.trim().to_string(),
        version.trim().to_string(),
    )
}

/// `[group, artifact, version]` of a section's project line
pub fn project_info(line: &str) -> (String, String, String) {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    dependency_info(&format!("{compact}:scope"))
}

/// Drop child module lines that repeat a parent dependency
///
/// `mvn dependency:tree` copies a parent's dependencies into each module.
pub fn filter_parent_dependencies(child: &[String], parent: &[String]) -> Vec<String> {
    let parent = parent.join(" ");
    child
        .iter()
        .filter(|line| {
            let start = dependency_level(line).unwrap_or(0);
            !parent.contains(&line[start..])
        })
        .cloned()
        .collect()
}

/// Nest dependency lines under `parent` by indentation
///
/// A line is a child of the previous line iff its level is strictly
/// greater, and a sibling iff it is equal. A shallower line closes the
/// current level and is compared against the enclosing one. A line
/// shallower than the first line closes the outermost level and ends
/// the walk.
pub fn populate(tree: &mut DependencyTree, parent: NodeId, lines: &[String]) {
    struct Frame {
        parent: NodeId,
        level: usize,
        node: NodeId,
    }

    let mut frames: Vec<Frame> = Vec::new();
    for line in lines {
        let Some(level) = dependency_level(line) else {
            continue;
        };
        let (group, artifact, version) = dependency_info(line);
        let info = GeneralInfo::gav(group.clone(), artifact.clone(), version);

        if frames.is_empty() {
            let node = add_gav(tree, parent, info, &group, &artifact);
            frames.push(Frame {
                parent,
                level,
                node,
            });
            continue;
        }

        loop {
            let Some(top) = frames.last_mut() else {
                break;
            };
            if level > top.level {
                let owner = top.node;
                let node = add_gav(tree, owner, info, &group, &artifact);
                frames.push(Frame {
                    parent: owner,
                    level,
                    node,
                });
                break;
            }
            if level == top.level {
                top.node = add_gav(tree, top.parent, info, &group, &artifact);
                break;
            }
            frames.pop();
        }
        if frames.is_empty() {
            break;
        }
    }
}

fn add_gav(
    tree: &mut DependencyTree,
    parent: NodeId,
    info: GeneralInfo,
    group: &str,
    artifact: &str,
) -> NodeId {
    let node = tree.add_child(parent, info);
    tree.set_label(node, format!("{group}:{artifact}"));
    node
}

/// Read `groupId:artifactId:version` from a pom.xml
///
/// Falls back to the `<parent>` coordinates for inherited group and version.
pub fn read_pom_gav(content: &str) -> Option<(String, String, String)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let (mut group, mut artifact, mut version) = (None, None, None);
    let (mut parent_group, mut parent_version) = (None, None);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let depth = path.len();
                let in_project = depth == 1 && path[0] == "project";
                let in_parent = depth == 2 && path[0] == "project" && path[1] == "parent";
                let field = matches!(name.as_str(), "groupId" | "artifactId" | "version");
                if field && (in_project || in_parent) {
                    let text = reader.read_text(e.to_end().name()).ok()?.trim().to_string();
                    match (in_project, name.as_str()) {
                        (true, "groupId") => group = Some(text),
                        (true, "artifactId") => artifact = Some(text),
                        (true, "version") => version = Some(text),
                        (false, "groupId") => parent_group = Some(text),
                        (false, "version") => parent_version = Some(text),
                        _ => {}
                    }
                } else {
                    path.push(name);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    Some((
        group.or(parent_group).unwrap_or_default(),
        artifact?,
        version.or(parent_version).unwrap_or_default(),
    ))
}

#[derive(Debug, Default)]
pub struct MavenBuilder;

impl MavenBuilder {
    pub fn new() -> Self {
        Self
    }

    fn add_module(
        tree: &mut DependencyTree,
        parent: NodeId,
        descriptor: &Path,
        section: &ModuleSection,
        lines: &[String],
    ) -> NodeId {
        let (group, artifact, version) = project_info(&section.project);
        let info = GeneralInfo::gav(group.clone(), artifact.clone(), version)
            .with_path(super::project_dir(descriptor));
        let module = tree.add_root(parent, info, format!("{group}:{artifact}"));
        populate(tree, module, lines);
        module
    }
}

impl TreeBuilder for MavenBuilder {
    fn package_type(&self) -> PackageType {
        PackageType::Maven
    }

    fn program<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        &tools.mvn
    }

    fn probe_args(&self) -> &'static [&'static str] {
        &["-version"]
    }

    fn commands(&self, _descriptor: &Path) -> Vec<ToolCommand> {
        vec![ToolCommand::new(TREE, ["dependency:tree", "-B"])]
    }

    fn reads_manifest(&self) -> bool {
        true
    }

    fn build(&self, descriptor: &Path, raw: &RawOutput) -> DependencyTree {
        let pom_name = || {
            raw.manifest
                .as_deref()
                .and_then(read_pom_gav)
                .map(|(group, artifact, _)| format!("{group}:{artifact}"))
        };

        let (text, failure) = match raw.output(TREE) {
            Some(ToolOutput::Complete(text)) => (text, None),
            Some(ToolOutput::Partial(text, error)) => (text, Some(error)),
            Some(ToolOutput::Failed(error)) => {
                return failed_project(
                    descriptor,
                    PackageType::Maven,
                    pom_name(),
                    BuildError::NotInstalled(error.to_string()),
                );
            }
            None => ("", None),
        };

        let sections = parse_sections(text);
        let Some((project, modules)) = sections.split_first() else {
            return failed_project(
                descriptor,
                PackageType::Maven,
                pom_name(),
                BuildError::ParseError("no dependency:tree section found".to_string()),
            );
        };
        if let Some(error) = failure {
            log_partial(descriptor, error, "Try running 'mvn clean install'.");
        }

        let mut tree = DependencyTree::new();
        let top = tree.top();
        let root = Self::add_module(&mut tree, top, descriptor, project, &project.lines);
        for module in modules {
            let lines = filter_parent_dependencies(&module.lines, &project.lines);
            if lines.is_empty() {
                tracing::debug!(module = %module.project, "Module has no own dependencies");
                continue;
            }
            Self::add_module(&mut tree, root, descriptor, module, &lines);
        }
        tree
    }
}
