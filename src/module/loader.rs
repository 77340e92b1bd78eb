//! Asynchronous, one-shot loading of the interpreter module.
//!
//! The first `load()` injects the bootstrap on the blocking pool; every later
//! call returns another handle on the same readiness state. Readiness is a
//! `watch` value so any number of waiters can observe it, before or after the
//! module becomes ready.
//!
//! ```text
//!  load() ──► spawn_blocking(instantiate) ──► Pending ──► Ready(module)
//!  load() ──► (already started)                      └──► Failed(reason)
//! ```

use super::{InterpreterModule, Program, SharedModule, VirtualFs};
use crate::log;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tokio::{runtime::Handle, sync::watch};

/// Produces the program once per page session.
pub trait Bootstrap: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Compile/instantiate the program. Runs on the blocking pool.
    fn instantiate(&self) -> Result<Box<dyn Program>, LoadError>;
}

/// Reasons the module never becomes ready.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("bootstrap `{name}` failed: {reason}")]
    Bootstrap { name: String, reason: String },

    #[error("no async runtime available to load the interpreter")]
    NoRuntime,

    #[error("module loader dropped before the interpreter became ready")]
    Abandoned,
}

/// Lifecycle of the module as seen by waiters.
#[derive(Debug, Clone)]
pub enum LoadState {
    Pending,
    Ready(SharedModule),
    Failed(LoadError),
}

/// Owns the module and its readiness signal.
pub struct ModuleLoader {
    bootstrap: Arc<dyn Bootstrap>,
    fs_quota: Option<usize>,
    state: Arc<watch::Sender<LoadState>>,
    started: AtomicBool,
}

impl ModuleLoader {
    pub fn new(bootstrap: Arc<dyn Bootstrap>) -> Self {
        let (state, _) = watch::channel(LoadState::Pending);
        Self {
            bootstrap,
            fs_quota: None,
            state: Arc::new(state),
            started: AtomicBool::new(false),
        }
    }

    /// Limit the size of files written into the module filesystem.
    pub fn with_fs_quota(mut self, quota: usize) -> Self {
        self.fs_quota = Some(quota);
        self
    }

    /// Start loading (first call only) and return a readiness handle.
    pub fn load(&self) -> ReadyHandle {
        if !self.started.swap(true, Ordering::AcqRel) {
            self.inject();
        }
        self.ready()
    }

    /// A readiness handle that does not start loading.
    pub fn ready(&self) -> ReadyHandle {
        ReadyHandle {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    fn inject(&self) {
        let Ok(runtime) = Handle::try_current() else {
            log!("error"; "{}", LoadError::NoRuntime);
            self.state.send_replace(LoadState::Failed(LoadError::NoRuntime));
            return;
        };

        let bootstrap = Arc::clone(&self.bootstrap);
        let state = Arc::clone(&self.state);
        let quota = self.fs_quota;
        log!("loader"; "loading `{}`", bootstrap.name());

        runtime.spawn(async move {
            let name = bootstrap.name().to_string();
            let outcome = tokio::task::spawn_blocking(move || bootstrap.instantiate()).await;

            let next = match outcome {
                Ok(Ok(program)) => {
                    let fs = quota.map_or_else(VirtualFs::new, VirtualFs::with_quota);
                    log!("loader"; "`{name}` ready");
                    LoadState::Ready(InterpreterModule::new(program, fs).into_shared())
                }
                Ok(Err(err)) => {
                    log!("error"; "{err}");
                    LoadState::Failed(err)
                }
                Err(join_err) => {
                    let err = LoadError::Bootstrap {
                        name,
                        reason: join_err.to_string(),
                    };
                    log!("error"; "{err}");
                    LoadState::Failed(err)
                }
            };
            state.send_replace(next);
        });
    }
}

/// Observes the loader's readiness. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadyHandle {
    rx: watch::Receiver<LoadState>,
}

impl ReadyHandle {
    /// Wait until the module is ready or loading has failed.
    pub async fn wait(&mut self) -> Result<SharedModule, LoadError> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            match state {
                LoadState::Ready(module) => return Ok(module),
                LoadState::Failed(err) => return Err(err),
                LoadState::Pending => {}
            }

            if self.rx.changed().await.is_err() {
                let last = self.rx.borrow().clone();
                return match last {
                    LoadState::Ready(module) => Ok(module),
                    LoadState::Failed(err) => Err(err),
                    LoadState::Pending => Err(LoadError::Abandoned),
                };
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.rx.borrow(), LoadState::Ready(_))
    }
}
