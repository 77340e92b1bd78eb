//! A jq-compatible filter program that runs inside the interpreter module.
//!
//! # Pipeline
//!
//! ```text
//! args ──► Options ──► parse + check ──► read inputs (VirtualFs) ──► eval ──► print
//!              │             │                   │                     │
//!           exit 2        exit 3              exit 2                exit 5
//! ```
//!
//! Supported: paths, iteration, slices, `?`, pipes, commas, `//`, `and`/`or`,
//! comparisons, arithmetic, literals, array/object construction, conditionals
//! and a core set of builtins.

mod eval;
mod lexer;
mod parser;
mod print;

use crate::module::{Bootstrap, FsError, LoadError, Program, ProgramEnv};
use print::{Indent, PrintOptions};
use serde_json::Value;
use std::{path::Path, thread};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_COMPILE: i32 = 3;
pub const EXIT_RUNTIME: i32 = 5;

const USAGE: &str = "Usage:\tjq [OPTIONS] FILTER [FILES...]";

/// Stack of the thread a call runs on. Parsing, evaluation and printing
/// recurse per nesting level, which the parser caps.
const STACK_SIZE: usize = 64 * 1024 * 1024;

/// Command-line options accepted by the program.
#[derive(Debug, Default)]
struct Options {
    print: PrintOptions,
    join: bool,
    null_input: bool,
    slurp: bool,
    filter: Option<String>,
    files: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--monochrome-output" => opts.print.color = false,
            "--color-output" => opts.print.color = true,
            "--compact-output" => opts.print.indent = Indent::Compact,
            "--raw-output" => opts.print.raw = true,
            "--join-output" => {
                opts.print.raw = true;
                opts.join = true;
            }
            "--sort-keys" => opts.print.sort_keys = true,
            "--null-input" => opts.null_input = true,
            "--slurp" => opts.slurp = true,
            "--tab" => opts.print.indent = Indent::Tab,
            "--indent" => {
                let n = iter
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or("--indent takes one parameter")?;
                if n > 7 {
                    return Err("Cannot indent more than 7 characters".into());
                }
                opts.print.indent = Indent::Spaces(n);
            }
            short if short.starts_with('-') && !short.starts_with("--") && short.len() > 1 => {
                for flag in short.chars().skip(1) {
                    match flag {
                        'M' => opts.print.color = false,
                        'C' => opts.print.color = true,
                        'c' => opts.print.indent = Indent::Compact,
                        'r' => opts.print.raw = true,
                        'j' => {
                            opts.print.raw = true;
                            opts.join = true;
                        }
                        'S' => opts.print.sort_keys = true,
                        'n' => opts.null_input = true,
                        's' => opts.slurp = true,
                        _ => return Err(format!("Unknown option: {short}")),
                    }
                }
            }
            long if long.starts_with("--") => return Err(format!("Unknown option: {long}")),
            _ if opts.filter.is_none() => opts.filter = Some(arg.clone()),
            _ => opts.files.push(arg.clone()),
        }
    }

    Ok(opts)
}

/// Render a compile error the way jq reports it.
fn compile_error(filter: &str, message: &str, offset: usize) -> String {
    let line = filter[..offset.min(filter.len())].matches('\n').count() + 1;
    format!("jq: error: {message} at <top-level>, line {line}:\n{filter}\njq: 1 compile error")
}

fn input_name(files: &[String]) -> String {
    files.last().cloned().unwrap_or_else(|| "<stdin>".into())
}

/// The jq program.
#[derive(Debug, Default)]
pub struct Jq;

impl Jq {
    fn run(&self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
        let opts = match parse_args(args) {
            Ok(opts) => opts,
            Err(message) => {
                env.stderr.writeln(&format!("jq: {message}"));
                env.stderr.writeln(USAGE);
                return EXIT_USAGE;
            }
        };
        let Some(filter) = opts.filter.as_deref() else {
            env.stderr.writeln(USAGE);
            return EXIT_USAGE;
        };

        let expr = match parser::parse(filter) {
            Ok(expr) => expr,
            Err(err) => {
                env.stderr
                    .writeln(&compile_error(filter, &err.message, err.offset));
                return EXIT_COMPILE;
            }
        };
        if let Err(undefined) = eval::check(&expr) {
            env.stderr.writeln(&compile_error(
                filter,
                &format!("{undefined} is not defined"),
                filter.len(),
            ));
            return EXIT_COMPILE;
        }

        let name = input_name(&opts.files);
        let mut text = String::new();
        for file in &opts.files {
            match env.fs.read_to_string(Path::new(file)) {
                Ok(content) => text.push_str(&content),
                Err(FsError::NotFound(_) | FsError::InvalidPath(_)) => {
                    env.stderr.writeln(&format!(
                        "jq: error: Could not open {file}: No such file or directory"
                    ));
                    return EXIT_USAGE;
                }
                Err(err) => {
                    env.stderr.writeln(&format!("jq: error: {err}"));
                    return EXIT_USAGE;
                }
            }
        }

        let mut status = EXIT_OK;
        let mut emit = |env: &mut ProgramEnv<'_>, input: &Value| {
            let result = eval::eval(&expr, input, &mut |value| {
                let rendered = print::render(&value, &opts.print);
                if opts.join {
                    env.stdout.write(&rendered);
                } else {
                    env.stdout.writeln(&rendered);
                }
                Ok(())
            });
            if let Err(err) = result {
                env.stderr
                    .writeln(&format!("jq: error (at {name}:0): {err}"));
                status = EXIT_RUNTIME;
            }
        };

        if opts.null_input {
            emit(&mut *env, &Value::Null);
            return status;
        }

        let mut slurped = Vec::new();
        for parsed in serde_json::Deserializer::from_str(&text).into_iter::<Value>() {
            match parsed {
                Ok(value) if opts.slurp => slurped.push(value),
                Ok(value) => emit(&mut *env, &value),
                Err(err) => {
                    env.stderr
                        .writeln(&format!("jq: error (at {name}:{}): {err}", err.line()));
                    return EXIT_USAGE;
                }
            }
        }
        if opts.slurp {
            emit(&mut *env, &Value::Array(slurped));
        }

        status
    }
}

impl Program for Jq {
    fn name(&self) -> &str {
        "jq"
    }

    fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
        let this = &*self;
        let outcome = thread::scope(|scope| {
            thread::Builder::new()
                .name("jq".into())
                .stack_size(STACK_SIZE)
                .spawn_scoped(scope, || this.run(args, &mut *env))
                .map_err(|err| format!("cannot start evaluator: {err}"))?
                .join()
                .map_err(|_| "evaluator panicked".to_string())
        });

        outcome.unwrap_or_else(|message| {
            env.stderr.writeln(&format!("jq: error: {message}"));
            EXIT_RUNTIME
        })
    }
}

/// Instantiates [`Jq`].
#[derive(Debug, Default)]
pub struct JqBootstrap;

impl Bootstrap for JqBootstrap {
    fn name(&self) -> &str {
        "jq"
    }

    fn instantiate(&self) -> Result<Box<dyn Program>, LoadError> {
        Ok(Box::new(Jq))
    }
}
