//! Ordinal severity scale

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of an issue, or the aggregated state of a node
///
/// Variants are declared from least to most severe so the derived `Ord`
/// makes `max()` pick the worst one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    /// Scanned, no issues
    #[default]
    Normal,
    /// Not scanned yet
    Pending,
    /// Unknown to the scanner, or an unrecognised severity string
    Unknown,
    Information,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank (higher = more severe)
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Check if this severity meets or exceeds a minimum threshold
    pub fn meets_threshold(&self, min: &Self) -> bool {
        self >= min
    }

    /// Parse severity from string (case-insensitive)
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "information" | "info" => Severity::Information,
            "pending" => Severity::Pending,
            "normal" => Severity::Normal,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Pending => "pending",
            Severity::Unknown => "unknown",
            Severity::Information => "information",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Normal => "Scanned - No Issues",
            Severity::Pending => "Pending Scan",
            Severity::Unknown => "Unknown",
            Severity::Information => "Information",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// True for severities that describe an actual issue
    pub fn is_issue(&self) -> bool {
        *self >= Severity::Information
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Normal < Severity::Pending);
        assert!(Severity::Pending < Severity::Unknown);
        assert!(Severity::Unknown < Severity::Information);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(
            [Severity::Low, Severity::Critical, Severity::Normal]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_from_str_loose() {
        assert_eq!(Severity::from_str_loose("High"), Severity::High);
        assert_eq!(Severity::from_str_loose("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_str_loose(" low "), Severity::Low);
        assert_eq!(Severity::from_str_loose("bogus"), Severity::Unknown);
        assert_eq!(Severity::from_str_loose(""), Severity::Unknown);
    }

    #[test]
    fn test_meets_threshold() {
        assert!(Severity::High.meets_threshold(&Severity::Medium));
        assert!(Severity::Medium.meets_threshold(&Severity::Medium));
        assert!(!Severity::Low.meets_threshold(&Severity::Medium));
    }

    #[test]
    fn test_rank_and_labels() {
        assert_eq!(Severity::Normal.rank(), 0);
        assert_eq!(Severity::Critical.rank(), 7);
        assert_eq!(Severity::Normal.to_string(), "Scanned - No Issues");
        assert!(!Severity::Unknown.is_issue());
        assert!(Severity::Information.is_issue());
    }
}
