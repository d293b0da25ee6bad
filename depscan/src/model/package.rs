//! Package identity: ecosystem tag, component ids and general info

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ecosystem a project or dependency belongs to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Go,
    Maven,
    Npm,
    Yarn,
    Pnpm,
    Nuget,
    Python,
    #[default]
    Unknown,
}

impl PackageType {
    /// All ecosystems a tree can be built for
    pub const BUILDABLE: [PackageType; 7] = [
        PackageType::Go,
        PackageType::Maven,
        PackageType::Npm,
        PackageType::Yarn,
        PackageType::Pnpm,
        PackageType::Nuget,
        PackageType::Python,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Go => "go",
            PackageType::Maven => "maven",
            PackageType::Npm => "npm",
            PackageType::Yarn => "yarn",
            PackageType::Pnpm => "pnpm",
            PackageType::Nuget => "nuget",
            PackageType::Python => "python",
            PackageType::Unknown => "unknown",
        }
    }

    /// Prefix the remote scanner expects in front of a component id
    pub fn component_prefix(&self) -> &'static str {
        match self {
            PackageType::Go => "go://",
            PackageType::Maven => "gav://",
            PackageType::Npm | PackageType::Yarn | PackageType::Pnpm => "npm://",
            PackageType::Nuget => "nuget://",
            PackageType::Python => "pypi://",
            PackageType::Unknown => "",
        }
    }

    /// Parse an ecosystem name (case-insensitive)
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "go" | "golang" => PackageType::Go,
            "maven" | "gav" => PackageType::Maven,
            "npm" => PackageType::Npm,
            "yarn" => PackageType::Yarn,
            "pnpm" => PackageType::Pnpm,
            "nuget" => PackageType::Nuget,
            "python" | "pypi" => PackageType::Python,
            _ => PackageType::Unknown,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip a `<scheme>://` prefix from a component id
///
/// `npm://left-pad:1.3.0` becomes `left-pad:1.3.0`. Ids without a prefix
/// are returned unchanged.
pub fn short_component_id(id: &str) -> &str {
    match id.find("://") {
        Some(idx) => &id[idx + 3..],
        None => id,
    }
}

/// Structural identity of a package release
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub name: String,
    pub version: String,
}

impl ComponentIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Canonical `name:version` id
    pub fn component_id(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Descriptive data carried by every tree node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralInfo {
    /// Maven group id; empty for every other ecosystem
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// Scope labels such as `prod`, `dev` or `test`. Empty means unscoped.
    pub scopes: Vec<String>,
    /// Manifest location; only set on project roots
    pub path: Option<PathBuf>,
    pub package_type: PackageType,
}

impl GeneralInfo {
    pub fn new(
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        package_type: PackageType,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            version: version.into(),
            package_type,
            ..Default::default()
        }
    }

    /// Maven coordinates
    pub fn gav(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::new(artifact_id, version, PackageType::Maven)
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Name used for matching: `group:artifact` for Maven, the artifact otherwise
    pub fn name(&self) -> String {
        if self.group_id.is_empty() {
            self.artifact_id.clone()
        } else {
            format!("{}:{}", self.group_id, self.artifact_id)
        }
    }

    /// Canonical component id (`[group:]artifact:version`)
    pub fn component_id(&self) -> String {
        format!("{}:{}", self.name(), self.version)
    }

    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity::new(self.name(), self.version.clone())
    }

    /// Overwrite fields of `self` with the non-empty fields of `other`
    pub fn update(&mut self, other: &GeneralInfo) {
        if !other.group_id.is_empty() {
            self.group_id = other.group_id.clone();
        }
        if !other.artifact_id.is_empty() {
            self.artifact_id = other.artifact_id.clone();
        }
        if !other.version.is_empty() {
            self.version = other.version.clone();
        }
        if !other.scopes.is_empty() {
            self.scopes = other.scopes.clone();
        }
        if other.path.is_some() {
            self.path = other.path.clone();
        }
        if other.package_type != PackageType::Unknown {
            self.package_type = other.package_type;
        }
    }
}
