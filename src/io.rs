//! Virtual I/O channel between the host and the interpreter module.
//!
//! The channel writes input data into the module filesystem, calls the single
//! entry point and collects what it printed. It is not safe for overlapping
//! use: the module's buffers are global, so every caller goes through the
//! gateway, which owns the only channel.
//!
//! # Invocation
//!
//! ```text
//!   reset()  ──►  call_main([baseline..., options..., query, path])
//!                         │
//!                         ▼
//!              drain stdout / stderr  ──►  reopen std handles
//! ```
//!
//! The entry point closes its std handles on exit. Reopening them is part of
//! every invoke; skipping it makes all later output vanish.

use crate::module::{FsError, SharedModule};
use serde::Serialize;
use std::path::Path;

/// Captured output of one entry-point call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl InvocationResult {
    /// True when the interpreter reported a problem.
    pub fn is_error(&self) -> bool {
        self.exit_code != 0 || !self.stderr.is_empty()
    }
}

/// Host side of the module's filesystem and std streams.
#[derive(Debug, Clone)]
pub struct VirtualIo {
    module: SharedModule,
    baseline: Vec<String>,
}

impl VirtualIo {
    /// `baseline` flags precede every argument list passed to `invoke`.
    pub fn new(module: SharedModule, baseline: Vec<String>) -> Self {
        Self { module, baseline }
    }

    /// Place `data` at `path`, overwriting prior content. No validation.
    pub fn write(&self, path: &Path, data: &str) -> Result<(), FsError> {
        self.module.lock().fs_mut().write(path, data.as_bytes())
    }

    /// Discard buffered output. The filesystem is left alone.
    pub fn reset(&self) {
        let mut module = self.module.lock();
        module.stdout_mut().clear();
        module.stderr_mut().clear();
    }

    /// Run the entry point with `[baseline..., args...]` and capture both streams.
    pub fn invoke(&self, args: &[String]) -> InvocationResult {
        let mut module = self.module.lock();
        module.stdout_mut().clear();
        module.stderr_mut().clear();

        let argv: Vec<String> = self.baseline.iter().chain(args).cloned().collect();
        let exit_code = module.call_main(&argv);

        let stdout = module.stdout_mut().drain();
        let stderr = module.stderr_mut().drain();
        module.reopen_std_streams();

        InvocationResult {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Argument list for one query: options first, then the query and the
    /// input path as the last two arguments.
    pub fn entry_args(options: &[String], query: &str, path: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(options.len() + 2);
        args.extend(options.iter().cloned());
        args.push(query.to_string());
        args.push(path.to_string_lossy().into_owned());
        args
    }
}
