//! Data model shared by builders, the scanner and the impact engine

pub mod issues;
pub mod package;
pub mod severity;

pub use issues::{
    IssueKey, IssueRecord, LicenseKey, LicenseRecord, MISSING_COMPONENT_ISSUE_ID, NodeInfo,
    UNKNOWN_LICENSE,
};
pub use package::{ComponentIdentity, GeneralInfo, PackageType, short_component_id};
pub use severity::Severity;
