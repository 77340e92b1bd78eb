//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jqdoc - runnable jq snippets for static documentation sites
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file path (default: jqdoc.toml)
    #[arg(short = 'C', long, default_value = "jqdoc.toml")]
    pub config: PathBuf,

    /// Override the input path inside the interpreter filesystem
    #[arg(long = "input-path", global = true)]
    pub input_path: Option<PathBuf>,

    /// Override the class that marks runnable snippets
    #[arg(long, global = true)]
    pub class: Option<String>,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a single query against input data
    Run {
        /// The query to run
        query: String,

        /// Literal input data
        #[arg(short, long, conflicts_with = "file")]
        source: Option<String>,

        /// Read input data from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Flag forwarded to the interpreter (repeatable), e.g. `-o=-c`
        #[arg(short = 'o', long = "option", allow_hyphen_values = true)]
        options: Vec<String>,

        /// Print the captured streams as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wire the runnable snippets of an HTML page and print the result
    Render {
        /// The page to render
        page: PathBuf,

        /// Write the rendered page here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run every snippet once and fill in its output
        #[arg(short, long)]
        execute: bool,
    },
}

#[allow(unused)]
impl Cli {
    pub const fn is_run(&self) -> bool {
        matches!(self.command, Commands::Run { .. })
    }
    pub const fn is_render(&self) -> bool {
        matches!(self.command, Commands::Render { .. })
    }
}
