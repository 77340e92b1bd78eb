//! jqdoc - runnable jq snippets for static documentation sites.

use anyhow::{Context, Result};
use clap::Parser;
use jqdoc::{
    bridge::Bridge,
    cli::{Cli, Commands},
    config::RunnerConfig,
    logger, prerender,
};
use std::{
    fs,
    io::{Write, stdout},
    path::Path,
    process::ExitCode,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logger::set_quiet(cli.quiet);
    let config = RunnerConfig::load(&cli)?;

    match &cli.command {
        Commands::Run {
            query,
            source,
            file,
            options,
            json,
        } => {
            let input = match (source, file) {
                (Some(source), _) => source.clone(),
                (None, Some(path)) => fs::read_to_string(path)
                    .with_context(|| format!("failed to read `{}`", path.display()))?,
                (None, None) => "null".to_string(),
            };
            run_query(config, &input, query, options, *json).await
        }
        Commands::Render {
            page,
            output,
            execute,
        } => {
            render_page(config, page, output.as_deref(), *execute).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one query and mirror the interpreter's streams and exit status.
async fn run_query(
    config: RunnerConfig,
    input: &str,
    query: &str,
    options: &[String],
    json: bool,
) -> Result<ExitCode> {
    let bridge = Bridge::new(config);
    bridge.start();
    let result = bridge.gateway().run(input, query, options).await?;

    let mut out = stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &result)?;
        writeln!(out)?;
    } else {
        write!(out, "{}", result.stdout)?;
        if !result.stdout.is_empty() && !result.stdout.ends_with('\n') {
            writeln!(out)?;
        }
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr.trim_end());
        }
    }
    out.flush()?;

    Ok(match result.exit_code {
        0 => ExitCode::SUCCESS,
        code => ExitCode::from(u8::try_from(code).unwrap_or(1)),
    })
}

async fn render_page(
    config: RunnerConfig,
    page: &Path,
    output: Option<&Path>,
    execute: bool,
) -> Result<()> {
    let html = fs::read_to_string(page)
        .with_context(|| format!("failed to read `{}`", page.display()))?;

    let bridge = Bridge::new(config);
    let rendered = prerender::render(&bridge, &html, execute).await?;
    jqdoc::log!(
        "render";
        "{}: {} widget(s), {} failed",
        page.display(),
        rendered.widgets,
        rendered.failed
    );

    match output {
        Some(path) => fs::write(path, &rendered.html)
            .with_context(|| format!("failed to write `{}`", path.display()))?,
        None => {
            let mut out = stdout().lock();
            writeln!(out, "{}", rendered.html)?;
            out.flush()?;
        }
    }
    Ok(())
}
