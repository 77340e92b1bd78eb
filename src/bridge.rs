//! Assembles the loader, gateway and page-side components from configuration.
//!
//! The gateway is spawned against a readiness handle that does not start
//! loading, so pages can be scaffolded without ever paying for a load.
//! `start()` injects the interpreter; queued runs flush once it is ready.

use crate::{
    config::RunnerConfig,
    dom::Page,
    gateway::{Gateway, GatewaySettings},
    interp::JqBootstrap,
    module::{Bootstrap, ModuleLoader, ReadyHandle},
    snippet::SnippetController,
    swap::{PageSource, PageSwapper},
};
use std::sync::Arc;

pub struct Bridge {
    config: RunnerConfig,
    loader: ModuleLoader,
    gateway: Gateway,
}

impl Bridge {
    /// Bridge running the built-in jq program. Needs a tokio runtime.
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_bootstrap(config, Arc::new(JqBootstrap))
    }

    pub fn with_bootstrap(config: RunnerConfig, bootstrap: Arc<dyn Bootstrap>) -> Self {
        let loader = ModuleLoader::new(bootstrap).with_fs_quota(config.fs_quota_bytes());
        let gateway = Gateway::spawn(
            loader.ready(),
            GatewaySettings {
                input_path: config.interpreter.input_path.clone(),
                baseline_flags: config.interpreter.baseline_flags.clone(),
            },
        );
        Self {
            config,
            loader,
            gateway,
        }
    }

    /// Start loading the interpreter. Idempotent.
    pub fn start(&self) -> ReadyHandle {
        self.loader.load()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn controller(&self, page: Page) -> SnippetController {
        SnippetController::new(page, self.gateway.clone(), self.config.snippet.clone())
    }

    pub fn swapper<S: PageSource>(&self, page: Page, source: S) -> PageSwapper<S> {
        PageSwapper::new(source, self.controller(page), self.config.swap.clone())
    }
}
