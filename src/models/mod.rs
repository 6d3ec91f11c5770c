//! Data models for plugin test execution
//!
//! This module contains all data structures used throughout the application.

mod package;
mod test_result;

pub use package::{DomainUsage, IsolationSettings, PackageDescriptor, ProcessModel, TestFilter};
pub use test_result::{CaseResult, DiscoverySummary, RunSummary, TestStatus};
