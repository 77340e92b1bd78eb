//! jqdoc - runnable jq snippets for static documentation sites.
//!
//! ```text
//!   ModuleLoader ──► ReadyHandle ──► Gateway (one call at a time)
//!                                      ▲
//!   PageSwapper ──► SnippetController ─┘   VirtualIo ◄── Gateway
//! ```
//!
//! [`bridge::Bridge`] assembles these from a [`config::RunnerConfig`].

pub mod logger;

pub mod bridge;
pub mod cli;
pub mod config;
pub mod dom;
pub mod gateway;
pub mod interp;
pub mod io;
pub mod module;
pub mod prerender;
pub mod snippet;
pub mod swap;
