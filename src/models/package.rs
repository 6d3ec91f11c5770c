//! Work package models
//!
//! Defines the unit of work submitted to the test engine.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Process model for engine execution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessModel {
    /// Execute inside the current process
    #[default]
    InProcess,
}

/// Execution domain usage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainUsage {
    /// Do not create a secondary execution domain
    #[default]
    None,
}

/// Isolation settings applied to every package.
///
/// The host application's process boundary cannot be crossed or duplicated,
/// so both knobs are fixed: run in the current process, no secondary domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationSettings {
    pub process_model: ProcessModel,
    pub domain_usage: DomainUsage,
}

impl IsolationSettings {
    pub fn in_process() -> Self {
        Self::default()
    }
}

/// The unit of work submitted to the test engine.
///
/// Built fresh for every explore/run invocation and serialized to JSON at the
/// engine boundary; never retained across calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Target test assembly (shared library) to analyze
    pub assembly: PathBuf,

    /// Isolation settings for the execution context
    pub settings: IsolationSettings,
}

impl PackageDescriptor {
    /// Create a package for a target assembly with in-process isolation
    pub fn new(assembly: impl Into<PathBuf>) -> Self {
        Self {
            assembly: assembly.into(),
            settings: IsolationSettings::in_process(),
        }
    }

    pub fn assembly(&self) -> &Path {
        &self.assembly
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.assembly.display())
    }
}

/// Test selection filter submitted with a package.
///
/// Discovery and execution are unconditional in this tool, so the accept-all
/// filter is the only one the runner ever builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFilter {
    /// Filter expression; `*` accepts every test
    pub expression: String,
}

impl TestFilter {
    /// The accept-all filter
    pub fn all() -> Self {
        Self {
            expression: "*".to_string(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.expression == "*"
    }
}

impl Default for TestFilter {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_defaults_to_in_process() {
        let package = PackageDescriptor::new("/tmp/libsuite.so");
        assert_eq!(package.settings.process_model, ProcessModel::InProcess);
        assert_eq!(package.settings.domain_usage, DomainUsage::None);
    }

    #[test]
    fn test_filter_accepts_all() {
        let filter = TestFilter::all();
        assert!(filter.is_all());
        assert_eq!(filter, TestFilter::default());
    }

    #[test]
    fn test_package_serialization() {
        let package = PackageDescriptor::new("/tmp/libsuite.so");
        let json = serde_json::to_string(&package).unwrap();
        assert!(json.contains("in_process"));
        assert!(json.contains("libsuite.so"));

        let back: PackageDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.assembly, package.assembly);
    }
}
