//! Module location and candidate enumeration
//!
//! The host application's base directory is never consulted: the anchor is
//! the directory of the module this code executes from, and every path the
//! engine may be resolved from is enumerated explicitly.

use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ResolveError;

/// Environment override for the runtime library directory
pub const RUNTIME_DIR_ENV: &str = "PLUGTEST_RUNTIME_DIR";

/// Base name of the engine module, decorated per platform
pub const ENGINE_MODULE_BASENAME: &str = "plugtest_engine";

/// Shared library extensions recognized during enumeration
const MODULE_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Resolved directory layout for engine loading
#[derive(Clone, Debug)]
pub struct ResolutionPaths {
    anchor_dir: PathBuf,
    runtime_dir: PathBuf,
    engine_module: PathBuf,
}

impl ResolutionPaths {
    /// Locate the layout relative to the currently executing module.
    ///
    /// Precedence for the runtime directory: explicit override, then the
    /// `PLUGTEST_RUNTIME_DIR` environment variable, then `<anchor>/runtime`.
    pub fn locate(runtime_override: Option<&Path>) -> Result<Self, ResolveError> {
        let anchor_dir = own_module_dir()?;
        let runtime_dir = runtime_override
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(RUNTIME_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| anchor_dir.join("runtime"));
        let engine_module = anchor_dir.join(engine_module_file());

        debug!(
            "Resolution anchored at {} (runtime: {})",
            anchor_dir.display(),
            runtime_dir.display()
        );

        Ok(Self {
            anchor_dir,
            runtime_dir,
            engine_module,
        })
    }

    /// Fixed layout, bypassing anchor discovery
    pub fn with_layout(
        anchor_dir: impl Into<PathBuf>,
        runtime_dir: impl Into<PathBuf>,
        engine_module: impl Into<PathBuf>,
    ) -> Self {
        Self {
            anchor_dir: anchor_dir.into(),
            runtime_dir: runtime_dir.into(),
            engine_module: engine_module.into(),
        }
    }

    pub fn anchor_dir(&self) -> &Path {
        &self.anchor_dir
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn engine_module(&self) -> &Path {
        &self.engine_module
    }

    /// Build the complete candidate resolution set for one target assembly:
    /// every runtime library, the engine module, and the target itself.
    pub fn candidates(&self, target: &Path) -> CandidateSet {
        let mut modules = runtime_modules(&self.runtime_dir);
        modules.push(self.engine_module.clone());
        modules.push(target.to_path_buf());
        CandidateSet { modules }
    }
}

/// The fully enumerated set of modules the engine may be resolved from.
///
/// Nothing outside this set participates in resolution; there is no fallback
/// to the process's default search path.
#[derive(Clone, Debug)]
pub struct CandidateSet {
    modules: Vec<PathBuf>,
}

impl CandidateSet {
    pub fn modules(&self) -> &[PathBuf] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.modules.iter().any(|m| m == path)
    }

    /// Verify every candidate present on disk is a loadable module.
    ///
    /// Reads object-file headers only; nothing is executed.
    pub fn verify(&self) -> Result<(), ResolveError> {
        for module in &self.modules {
            if module.exists() {
                verify_module(module)?;
            }
        }
        Ok(())
    }
}

/// Enumerate shared libraries in the runtime directory.
///
/// A missing directory yields an empty set; an engine module may be
/// self-contained.
fn runtime_modules(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!("No runtime directory at {}", dir.display());
            return Vec::new();
        }
    };

    let mut modules: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| MODULE_EXTENSIONS.contains(&e))
                .unwrap_or(false)
        })
        .collect();

    modules.sort();
    modules
}

/// Check the object-file magic of a candidate without loading it
fn verify_module(path: &Path) -> Result<(), ResolveError> {
    let mut magic = [0u8; 4];
    let read = fs::File::open(path)
        .and_then(|mut file| file.read(&mut magic))
        .map_err(|_| ResolveError::InvalidModule(path.to_path_buf()))?;

    if read < 4 || !is_object_magic(&magic) {
        return Err(ResolveError::InvalidModule(path.to_path_buf()));
    }
    Ok(())
}

fn is_object_magic(magic: &[u8; 4]) -> bool {
    matches!(
        magic,
        [0x7f, b'E', b'L', b'F']                    // ELF
            | [0xfe, 0xed, 0xfa, _]                 // Mach-O big endian
            | [_, 0xfa, 0xed, 0xfe]                 // Mach-O little endian
            | [0xca, 0xfe, 0xba, 0xbe]              // Mach-O universal
            | [b'M', b'Z', _, _]                    // PE
    )
}

/// Platform file name of the engine module
pub(super) fn engine_module_file() -> String {
    if cfg!(target_os = "windows") {
        format!("{ENGINE_MODULE_BASENAME}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{ENGINE_MODULE_BASENAME}.dylib")
    } else {
        format!("lib{ENGINE_MODULE_BASENAME}.so")
    }
}

/// Directory of the module this code is executing from
fn own_module_dir() -> Result<PathBuf, ResolveError> {
    own_module_path()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .ok_or(ResolveError::AnchorUnavailable)
}

/// Path of the object containing this code: the plugin library when hosted,
/// the executable when run standalone.
#[cfg(unix)]
fn own_module_path() -> Option<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    static ANCHOR: u8 = 0;

    let raw = unsafe {
        let mut info: libc::Dl_info = std::mem::zeroed();
        let addr = &ANCHOR as *const u8 as *const libc::c_void;
        if libc::dladdr(addr, &mut info) == 0 || info.dli_fname.is_null() {
            return None;
        }
        CStr::from_ptr(info.dli_fname)
    };

    if raw.to_bytes().is_empty() {
        return None;
    }

    let path = PathBuf::from(OsStr::from_bytes(raw.to_bytes()));
    Some(path.canonicalize().unwrap_or(path))
}

#[cfg(not(unix))]
fn own_module_path() -> Option<PathBuf> {
    env::current_exe().ok()
}
