//! Run-wide interrupt flag.
//!
//! A snapshot run over a large corpus can take hours, and a hard kill in
//! stage 1 leaves a torn index behind. On SIGINT/SIGTERM the CLI raises this
//! flag instead: workers finish the file they hold, stop claiming new ones,
//! and the run ends with an interrupted error. External sort/extract
//! pipelines are not killed mid-flight; the flag is checked between them.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// The raw flag, for signal handlers that need an async-signal-safe `swap`.
pub fn shutdown_flag() -> &'static AtomicBool {
    &SHUTDOWN
}

/// True once an interrupt has been requested.
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Raise the flag. Idempotent; there is no way to lower it again.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
