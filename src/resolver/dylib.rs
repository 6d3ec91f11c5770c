//! Dynamic engine loading
//!
//! Loads the engine module from the verified candidate set and drives it
//! over a C ABI. The engine stays in its own linker namespace; the target
//! assembly is promoted to the global namespace so the engine's by-name
//! driver lookups can resolve it later.

use libloading::Library;
use serde::Serialize;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::paths::ResolutionPaths;
use super::{EngineError, EngineFactory, EngineHandle, EngineSession, ResolveError};
use crate::models::{PackageDescriptor, TestFilter};

/// Entry symbol instantiating the engine
pub const ENGINE_ENTRY_SYMBOL: &[u8] = b"plugtest_engine_create";

const SYM_EXPLORE: &[u8] = b"plugtest_engine_explore";
const SYM_RUN: &[u8] = b"plugtest_engine_run";
const SYM_LAST_ERROR: &[u8] = b"plugtest_engine_last_error";
const SYM_FREE: &[u8] = b"plugtest_engine_free";
const SYM_DESTROY: &[u8] = b"plugtest_engine_destroy";

type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type InvokeFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_char;
type LastErrorFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Work order serialized across the engine boundary
#[derive(Serialize)]
struct WorkOrder<'a> {
    package: &'a PackageDescriptor,
    filter: &'a TestFilter,
}

/// Engine factory backed by dynamic library loading
pub struct DylibEngineFactory {
    runtime_dir: Option<PathBuf>,
}

impl DylibEngineFactory {
    pub fn new() -> Self {
        Self { runtime_dir: None }
    }

    /// Use a fixed runtime library directory instead of the located default
    pub fn with_runtime_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: Some(dir.into()),
        }
    }
}

impl Default for DylibEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for DylibEngineFactory {
    fn resolve(&self, target: &Path) -> Result<EngineHandle, ResolveError> {
        let paths = ResolutionPaths::locate(self.runtime_dir.as_deref())?;

        let engine_module = paths.engine_module().to_path_buf();
        if !engine_module.is_file() {
            return Err(ResolveError::EngineModuleMissing(engine_module));
        }
        if !target.exists() {
            return Err(ResolveError::TargetMissing(target.to_path_buf()));
        }

        let candidates = paths.candidates(target);
        candidates.verify()?;
        debug!("Verified resolution set of {} modules", candidates.len());

        let engine = open_local(&engine_module)?;
        let instance = unsafe {
            let create: libloading::Symbol<CreateFn> = engine
                .get(ENGINE_ENTRY_SYMBOL)
                .map_err(|_| ResolveError::EntrySymbol(symbol_name(ENGINE_ENTRY_SYMBOL)))?;
            create()
        };
        if instance.is_null() {
            return Err(ResolveError::EngineInit);
        }

        // Session owns the instance from here; an error below must still
        // destroy it, which the session's Drop guarantees.
        let mut session = DylibSession {
            engine: Some(engine),
            target: None,
            instance,
        };

        session.target = Some(open_global(target)?);
        debug!("Engine resolved for {}", target.display());

        Ok(EngineHandle::new(Box::new(session)))
    }
}

/// A loaded engine instance plus the libraries keeping it alive
struct DylibSession {
    engine: Option<Library>,
    target: Option<Library>,
    instance: *mut c_void,
}

impl DylibSession {
    fn invoke(&mut self, symbol: &'static [u8], order: &WorkOrder<'_>) -> Result<String, EngineError> {
        let engine = self.engine.as_ref().ok_or(EngineError::Released)?;
        let payload = CString::new(serde_json::to_string(order)?)
            .map_err(|_| EngineError::Execution("work order contains NUL".to_string()))?;

        unsafe {
            let invoke: libloading::Symbol<InvokeFn> =
                engine.get(symbol).map_err(|source| EngineError::Symbol {
                    symbol: symbol_name(symbol),
                    source,
                })?;

            let raw = invoke(self.instance, payload.as_ptr());
            if raw.is_null() {
                return Err(EngineError::Execution(last_error_text(
                    engine,
                    self.instance,
                )));
            }

            let document = CStr::from_ptr(raw).to_string_lossy().into_owned();
            if let Ok(free) = engine.get::<FreeFn>(SYM_FREE) {
                free(raw);
            }
            Ok(document)
        }
    }
}

impl EngineSession for DylibSession {
    fn explore(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError> {
        self.invoke(SYM_EXPLORE, &WorkOrder { package, filter })
    }

    fn run(
        &mut self,
        package: &PackageDescriptor,
        filter: &TestFilter,
    ) -> Result<String, EngineError> {
        self.invoke(SYM_RUN, &WorkOrder { package, filter })
    }

    fn unload(&mut self) {
        if let Some(engine) = self.engine.take() {
            if !self.instance.is_null() {
                unsafe {
                    if let Ok(destroy) = engine.get::<DestroyFn>(SYM_DESTROY) {
                        destroy(self.instance);
                    }
                }
                self.instance = std::ptr::null_mut();
            }
            drop(engine);
        }
        self.target.take();
    }
}

impl Drop for DylibSession {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Fetch the engine's failure text for the last rejected invocation
fn last_error_text(engine: &Library, instance: *mut c_void) -> String {
    unsafe {
        match engine.get::<LastErrorFn>(SYM_LAST_ERROR) {
            Ok(last_error) => {
                let ptr = last_error(instance);
                if ptr.is_null() {
                    "engine reported no detail".to_string()
                } else {
                    CStr::from_ptr(ptr).to_string_lossy().into_owned()
                }
            }
            Err(_) => "engine reported no detail".to_string(),
        }
    }
}

/// Load a module into its own linker namespace
fn open_local(path: &Path) -> Result<Library, ResolveError> {
    #[cfg(unix)]
    {
        use libloading::os::unix::{Library as RawLibrary, RTLD_LOCAL, RTLD_NOW};
        unsafe { RawLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }
            .map(Library::from)
            .map_err(|source| ResolveError::Load {
                path: path.to_path_buf(),
                source,
            })
    }
    #[cfg(not(unix))]
    {
        unsafe { Library::new(path) }.map_err(|source| ResolveError::Load {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Force-load a module into the global namespace so later by-name lookups
/// resolve it
fn open_global(path: &Path) -> Result<Library, ResolveError> {
    #[cfg(unix)]
    {
        use libloading::os::unix::{Library as RawLibrary, RTLD_GLOBAL, RTLD_NOW};
        unsafe { RawLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }
            .map(Library::from)
            .map_err(|source| ResolveError::Load {
                path: path.to_path_buf(),
                source,
            })
    }
    #[cfg(not(unix))]
    {
        unsafe { Library::new(path) }.map_err(|source| ResolveError::Load {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_order_serialization() {
        let package = PackageDescriptor::new("/tmp/libsuite.so");
        let filter = TestFilter::all();
        let order = WorkOrder {
            package: &package,
            filter: &filter,
        };

        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("libsuite.so"));
        assert!(json.contains("\"expression\":\"*\""));
        assert!(json.contains("in_process"));
    }

    #[test]
    fn test_symbol_name() {
        assert_eq!(symbol_name(ENGINE_ENTRY_SYMBOL), "plugtest_engine_create");
    }

    #[test]
    fn test_resolve_without_engine_module_fails() {
        // The test binary's directory carries no engine module, so resolution
        // must stop before loading anything.
        let factory = DylibEngineFactory::new();
        let target = Path::new("/tmp/libsuite.so");

        match factory.resolve(target) {
            Err(ResolveError::EngineModuleMissing(path)) => {
                assert!(path.ends_with(super::super::paths::engine_module_file()));
            }
            other => panic!("Expected EngineModuleMissing, got {:?}", other.map(|_| ())),
        }
    }
}
