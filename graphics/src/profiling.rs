//! Profiling support via Tracy.
//!
//! Profiling is enabled with the `profiling` Cargo feature:
//!
//! ```bash
//! cargo run --features profiling
//! ```
//!
//! The runtime instruments command-list submission, frame begin/end and
//! swap-chain resize. Client code can use the same macros:
//!
//! ```ignore
//! use stratus_graphics::{frame_mark, profile_scope};
//!
//! fn record_shadows() {
//!     profile_scope!("record_shadows");
//!     // ...
//! }
//!
//! loop {
//!     // ... render frame ...
//!     frame_mark!();
//! }
//! ```
//!
//! When profiling is disabled (the default), all macros compile to no-ops.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, Span, frame_mark as tracy_frame_mark, span};

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span for the current scope.
///
/// The span ends when the scope exits.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Send a message to Tracy's message log.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_message {
    ($msg:expr) => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.message($msg, 0);
        }
    };
}

/// Send a message (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_message {
    ($msg:expr) => {};
}

/// Start the Tracy client if profiling is enabled.
///
/// Returns `true` when a client is running after the call.
pub fn start_profiler() -> bool {
    #[cfg(feature = "profiling")]
    {
        let _client = tracy_client::Client::start();
        log::info!("Tracy profiler client started");
        true
    }
    #[cfg(not(feature = "profiling"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(feature = "profiling"))]
    fn test_macros_expand_without_profiler() {
        profile_scope!("test_scope");
        profile_message!("hello");
        frame_mark!();
        assert!(!super::start_profiler());
    }
}
