//! depscan - dependency trees and vulnerability impact for multi-language workspaces
//!
//! Descriptors found in a workspace are turned into one normalized dependency
//! forest by per-ecosystem builders (Go, Maven, npm, Yarn, pnpm, NuGet,
//! Python). Components are scanned by a remote service through a cache,
//! issues are rolled up the tree, and every finding is mapped back to the
//! dependency paths that pull it in.

pub mod builders;
pub mod cache;
pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod impact;
pub mod model;
pub mod reports;
pub mod scan;
pub mod tree;
pub mod workspace;
