//! Runtime discovery of the LightGBM shared library.
//!
//! The library is searched for next to the running executable first and then
//! by bare file name through the platform's dynamic-library search path. A
//! candidate is accepted only if it opens *and* exports every name in
//! [`REQUIRED_SYMBOLS`](super::REQUIRED_SYMBOLS).
//!
//! [`library`] loads the process-wide instance exactly once. Concurrent first
//! callers block until that single attempt finishes, and every caller sees
//! the same outcome. A failed load is cached and never retried.
//!
//! # Example
//!
//! ```no_run
//! use lgbm_dyn::{Api, LoaderConfig};
//!
//! // A private instance from a custom location, outside the global singleton.
//! let config = LoaderConfig::builder()
//!     .search_dirs(vec!["/opt/lightgbm/lib".into()])
//!     .system_fallback(false)
//!     .build();
//! let api = Api::load(&config)?;
//! # Ok::<(), lgbm_dyn::Error>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bon::Builder;

use super::{Api, Symbols};
use crate::error::{Error, Result};

/// Platform file name of the LightGBM shared library.
pub fn platform_library_name() -> &'static str {
    if cfg!(windows) {
        "lib_lightgbm.dll"
    } else if cfg!(target_os = "macos") {
        "lib_lightgbm.dylib"
    } else {
        "lib_lightgbm.so"
    }
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

// =============================================================================
// LoaderConfig
// =============================================================================

/// Where to look for the shared library.
///
/// The default looks for [`platform_library_name`] next to the running
/// executable, then falls back to the bare name.
#[derive(Debug, Clone, Builder)]
pub struct LoaderConfig {
    /// File name to look for. Default: [`platform_library_name`].
    #[builder(into, default = platform_library_name().to_string())]
    pub library_name: String,

    /// Directories searched in order. Default: the executable's directory.
    #[builder(default = executable_dir().into_iter().collect())]
    pub search_dirs: Vec<PathBuf>,

    /// Try the bare name through the OS search path last. Default: `true`.
    #[builder(default = true)]
    pub system_fallback: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LoaderConfig {
    /// Candidate paths in the order they are tried.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(&self.library_name))
            .collect();
        if self.system_fallback {
            out.push(PathBuf::from(&self.library_name));
        }
        out
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Api {
    /// Open and resolve a library instance outside the global singleton.
    ///
    /// Candidates are tried in order; the first that opens and resolves every
    /// symbol wins. If some candidate opened but lacked an export, the first
    /// such [`Error::MissingSymbol`] is returned. Otherwise the error is
    /// [`Error::LibraryLoadFailed`] with every path tried.
    pub fn load(config: &LoaderConfig) -> Result<Api> {
        let candidates = config.candidates();
        let mut missing: Option<Error> = None;
        let mut reason = String::from("no candidate paths");

        for path in &candidates {
            let library = match unsafe { libloading::Library::new(path) } {
                Ok(library) => library,
                Err(err) => {
                    log::debug!("could not open {}: {err}", path.display());
                    reason = err.to_string();
                    continue;
                }
            };
            match Symbols::resolve(&library) {
                Ok(symbols) => {
                    log::debug!("loaded LightGBM from {}", path.display());
                    return Ok(Api::from_library(library, symbols));
                }
                Err(err) => {
                    log::debug!("rejected {}: {err}", path.display());
                    missing.get_or_insert(err);
                }
            }
        }

        Err(missing.unwrap_or_else(|| Error::LibraryLoadFailed {
            candidates: candidates.iter().map(|p| p.display().to_string()).collect(),
            reason,
        }))
    }
}

static LIBRARY: OnceLock<Result<Api>> = OnceLock::new();

/// The process-wide library, loaded on first use.
///
/// On success the native log stream is routed into the crate's log pipeline
/// (see [`set_log_observer`](crate::set_log_observer)).
pub fn library() -> Result<&'static Api> {
    LIBRARY
        .get_or_init(|| {
            let api = Api::load(&LoaderConfig::default())?;
            crate::logging::install(&api);
            Ok(api)
        })
        .as_ref()
        .map_err(Clone::clone)
}
