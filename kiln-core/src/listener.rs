//! Progress notifications from the compiler.
//!
//! The compiler holds a listener by trait object and calls it at the
//! phase boundaries of each rep. Observers plug in without the
//! compiler knowing about terminals or log formats.

use crate::model::RepKey;
use std::path::Path;

#[allow(unused_variables)]
pub trait CompilationListener: Send + Sync {
    fn compilation_started(&self, rep: &RepKey) {}

    fn compilation_ended(&self, rep: &RepKey) {}

    /// An up-to-date rep was not recompiled.
    fn compilation_skipped(&self, rep: &RepKey) {}

    fn filtering_started(&self, rep: &RepKey, filter: &str) {}

    fn filtering_ended(&self, rep: &RepKey, filter: &str) {}

    fn file_written(&self, path: &Path) {}
}

/// Discards every notification.
pub struct NullListener;

impl CompilationListener for NullListener {}

/// Reports progress through the log.
pub struct LogReporter;

impl CompilationListener for LogReporter {
    fn compilation_started(&self, rep: &RepKey) {
        tracing::info!("Compiling {}", rep);
    }

    fn compilation_ended(&self, rep: &RepKey) {
        tracing::debug!("Finished {}", rep);
    }

    fn compilation_skipped(&self, rep: &RepKey) {
        tracing::debug!("Skipping {} (up to date)", rep);
    }

    fn filtering_started(&self, rep: &RepKey, filter: &str) {
        tracing::debug!("Applying filter '{}' to {}", filter, rep);
    }

    fn filtering_ended(&self, _rep: &RepKey, _filter: &str) {}

    fn file_written(&self, path: &Path) {
        tracing::info!("Wrote {}", path.display());
    }
}
