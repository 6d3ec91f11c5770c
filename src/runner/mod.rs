//! In-process test execution
//!
//! Drives a resolved engine over one target assembly and persists result
//! documents into the output directory.

use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{PackageDescriptor, TestFilter};
use crate::resolver::{DylibEngineFactory, EngineFactory, EngineHandle};
use crate::results;

/// Construction-time contract violations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("test assembly path must not be empty")]
    EmptyAssemblyPath,

    #[error("output directory not found: {0}")]
    OutputDirNotFound(PathBuf),
}

/// Operation performed against a target assembly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Discover tests without running them
    Explore,
    /// Execute tests and collect outcomes
    Run,
}

impl Operation {
    fn artifact_name(&self) -> &'static str {
        match self {
            Operation::Explore => results::EXPLORE_RESULT_FILE,
            Operation::Run => results::RUN_RESULT_FILE,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Explore => write!(f, "explore"),
            Operation::Run => write!(f, "run"),
        }
    }
}

/// Per-call execution phase. Finalizing always runs, whatever Executing did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Resolving,
    Executing,
    Finalizing,
    Done,
}

/// Test runner scoped to one target assembly and one output directory.
///
/// Failures inside explore/run are contained and reported through the
/// returned message; the caller is a long-lived process that must not be
/// taken down by a single misbehaving test module.
pub struct TestRunner {
    assembly: PathBuf,
    output_dir: PathBuf,
    factory: Box<dyn EngineFactory>,
}

impl TestRunner {
    /// Create a runner. The output directory must already exist; it is never
    /// created here.
    pub fn new(
        assembly: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, RunnerError> {
        let assembly = assembly.into();
        if assembly.as_os_str().is_empty() {
            return Err(RunnerError::EmptyAssemblyPath);
        }

        let output_dir = output_dir.into();
        if !output_dir.is_dir() {
            return Err(RunnerError::OutputDirNotFound(output_dir));
        }

        Ok(Self {
            assembly,
            output_dir,
            factory: Box::new(DylibEngineFactory::new()),
        })
    }

    /// Replace the engine factory. Used by the CLI for runtime-directory
    /// overrides and by tests for scripted engines.
    pub fn with_factory(mut self, factory: Box<dyn EngineFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn assembly(&self) -> &Path {
        &self.assembly
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the discovery result artifact
    pub fn explore_result_path(&self) -> PathBuf {
        self.output_dir.join(results::EXPLORE_RESULT_FILE)
    }

    /// Path of the execution result artifact
    pub fn run_result_path(&self) -> PathBuf {
        self.output_dir.join(results::RUN_RESULT_FILE)
    }

    /// Discover tests in the assembly without running them.
    ///
    /// Returns failure text; an empty string means success and the artifact
    /// exists.
    pub fn explore(&self) -> String {
        self.execute(Operation::Explore)
    }

    /// Execute tests in the assembly and collect outcomes.
    ///
    /// Same contract as [`TestRunner::explore`].
    pub fn run(&self) -> String {
        self.execute(Operation::Run)
    }

    fn execute(&self, operation: Operation) -> String {
        info!("{} {}", operation, self.assembly.display());
        debug!("phase: {:?}", Phase::Idle);

        match self.try_execute(operation) {
            Ok(()) => String::new(),
            Err(e) => {
                error!("{operation} failed: {e:#}");
                format!("{e:#}")
            }
        }
    }

    fn try_execute(&self, operation: Operation) -> anyhow::Result<()> {
        let artifact = self.output_dir.join(operation.artifact_name());

        // A previous call's artifact must not be mistaken for this call's
        // outcome when this call fails before producing a document.
        if artifact.exists() {
            std::fs::remove_file(&artifact).with_context(|| {
                format!("Failed to clear previous artifact: {}", artifact.display())
            })?;
        }

        debug!("phase: {:?}", Phase::Resolving);
        let mut handle = self
            .factory
            .resolve(&self.assembly)
            .context("engine resolution failed")?;

        debug!("phase: {:?}", Phase::Executing);
        let outcome = self.invoke_and_persist(&mut handle, operation, &artifact);

        // Runs on the failure path too; the handle's own Drop covers unwinds.
        debug!("phase: {:?}", Phase::Finalizing);
        handle.release();

        debug!("phase: {:?}", Phase::Done);
        outcome
    }

    fn invoke_and_persist(
        &self,
        handle: &mut EngineHandle,
        operation: Operation,
        artifact: &Path,
    ) -> anyhow::Result<()> {
        let package = PackageDescriptor::new(&self.assembly);
        let filter = TestFilter::all();

        let document = match operation {
            Operation::Explore => handle.explore(&package, &filter),
            Operation::Run => handle.run(&package, &filter),
        }
        .with_context(|| format!("{} failed for {}", operation, self.assembly.display()))?;

        results::write_artifact(artifact, &document)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EngineError, EngineSession, ResolveError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const EXPLORE_DOC: &str = r#"<test-run testcasecount="3">
  <test-case name="a" fullname="suite::a"/>
  <test-case name="b" fullname="suite::b"/>
  <test-case name="c" fullname="suite::c"/>
</test-run>"#;

    struct ScriptedSession {
        document: Result<String, String>,
        released: Arc<AtomicBool>,
    }

    impl EngineSession for ScriptedSession {
        fn explore(
            &mut self,
            _package: &PackageDescriptor,
            _filter: &TestFilter,
        ) -> Result<String, EngineError> {
            self.document
                .clone()
                .map_err(EngineError::Execution)
        }

        fn run(
            &mut self,
            _package: &PackageDescriptor,
            _filter: &TestFilter,
        ) -> Result<String, EngineError> {
            self.document
                .clone()
                .map_err(EngineError::Execution)
        }

        fn unload(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedFactory {
        document: Result<String, String>,
        resolvable: bool,
        released: Arc<AtomicBool>,
    }

    impl ScriptedFactory {
        fn succeeding(document: &str) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    document: Ok(document.to_string()),
                    resolvable: true,
                    released: released.clone(),
                },
                released,
            )
        }

        fn failing(message: &str) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    document: Err(message.to_string()),
                    resolvable: true,
                    released: released.clone(),
                },
                released,
            )
        }

        fn unresolvable() -> Self {
            Self {
                document: Ok(String::new()),
                resolvable: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl EngineFactory for ScriptedFactory {
        fn resolve(&self, _target: &Path) -> Result<EngineHandle, ResolveError> {
            if !self.resolvable {
                return Err(ResolveError::AnchorUnavailable);
            }
            Ok(EngineHandle::new(Box::new(ScriptedSession {
                document: self.document.clone(),
                released: self.released.clone(),
            })))
        }
    }

    fn runner_with(dir: &Path, factory: ScriptedFactory) -> TestRunner {
        TestRunner::new("/tmp/libsuite.so", dir)
            .unwrap()
            .with_factory(Box::new(factory))
    }

    #[test]
    fn test_new_with_valid_paths() {
        let dir = tempdir().unwrap();
        let assembly = dir.path().join("libsuite.so");
        std::fs::write(&assembly, b"x").unwrap();

        assert!(TestRunner::new(&assembly, dir.path()).is_ok());
    }

    #[test]
    fn test_new_rejects_empty_assembly() {
        let dir = tempdir().unwrap();
        let result = TestRunner::new("", dir.path());
        assert!(matches!(result, Err(RunnerError::EmptyAssemblyPath)));
    }

    #[test]
    fn test_new_rejects_missing_output_dir() {
        let result = TestRunner::new("/tmp/libsuite.so", "/nonexistent/out");
        assert!(matches!(result, Err(RunnerError::OutputDirNotFound(_))));
    }

    #[test]
    fn test_explore_writes_artifact() {
        let dir = tempdir().unwrap();
        let (factory, released) = ScriptedFactory::succeeding(EXPLORE_DOC);
        let runner = runner_with(dir.path(), factory);

        let message = runner.explore();
        assert!(message.is_empty(), "unexpected failure: {message}");

        let artifact = runner.explore_result_path();
        assert!(artifact.exists());
        let document = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(results::count_test_cases(&document), 3);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_explore_overwrites_previous_artifact() {
        let dir = tempdir().unwrap();

        let (first, _) = ScriptedFactory::succeeding("<test-run><test-case name=\"a\"/></test-run>");
        let message = runner_with(dir.path(), first).explore();
        assert!(message.is_empty());

        let (second, _) = ScriptedFactory::succeeding(EXPLORE_DOC);
        let runner = runner_with(dir.path(), second);
        let message = runner.explore();
        assert!(message.is_empty());

        let document = std::fs::read_to_string(runner.explore_result_path()).unwrap();
        assert_eq!(results::count_test_cases(&document), 3);
    }

    #[test]
    fn test_engine_failure_is_contained() {
        let dir = tempdir().unwrap();
        let (factory, released) = ScriptedFactory::failing("driver could not load assembly");
        let runner = runner_with(dir.path(), factory);

        let message = runner.explore();
        assert!(message.contains("driver could not load assembly"));
        assert!(!runner.explore_result_path().exists());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failure_clears_stale_artifact() {
        let dir = tempdir().unwrap();

        let (ok, _) = ScriptedFactory::succeeding(EXPLORE_DOC);
        assert!(runner_with(dir.path(), ok).explore().is_empty());
        assert!(dir.path().join(results::EXPLORE_RESULT_FILE).exists());

        let (bad, _) = ScriptedFactory::failing("corrupted module");
        let message = runner_with(dir.path(), bad).explore();
        assert!(!message.is_empty());
        assert!(!dir.path().join(results::EXPLORE_RESULT_FILE).exists());
    }

    #[test]
    fn test_resolution_failure_is_contained() {
        let dir = tempdir().unwrap();
        let runner = runner_with(dir.path(), ScriptedFactory::unresolvable());

        let message = runner.explore();
        assert!(message.contains("cannot establish own module location"));
        assert!(!runner.explore_result_path().exists());
    }

    #[test]
    fn test_fresh_runner_succeeds_after_failure() {
        let dir = tempdir().unwrap();

        let (bad, _) = ScriptedFactory::failing("boom");
        assert!(!runner_with(dir.path(), bad).explore().is_empty());

        let (ok, released) = ScriptedFactory::succeeding(EXPLORE_DOC);
        let runner = runner_with(dir.path(), ok);
        assert!(runner.explore().is_empty());
        assert!(runner.explore_result_path().exists());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_writes_run_artifact() {
        let dir = tempdir().unwrap();
        let doc = r#"<test-run>
  <test-case name="a" fullname="suite::a" result="Passed" duration="0.01"/>
  <test-case name="b" fullname="suite::b" result="Failed" duration="0.02"/>
</test-run>"#;
        let (factory, released) = ScriptedFactory::succeeding(doc);
        let runner = runner_with(dir.path(), factory);

        let message = runner.run();
        assert!(message.is_empty());
        assert!(runner.run_result_path().exists());
        assert!(!runner.explore_result_path().exists());

        let document = std::fs::read_to_string(runner.run_result_path()).unwrap();
        let summary = results::parse_run("suite", &document);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert!(released.load(Ordering::SeqCst));
    }
}
