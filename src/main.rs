//! plugtest - In-process test discovery and execution for plugin assemblies
//!
//! A CLI tool for discovering and executing tests in plugin modules that are
//! loaded inside a foreign host application. The test engine is resolved from
//! an explicitly enumerated module set, independent of the host process's own
//! library search path, and results are persisted as XML artifacts.
//!
//! ## Usage
//!
//! ```bash
//! # Discover tests in an assembly
//! plugtest assembly ./libsuite.so --out ./results
//!
//! # Execute them
//! plugtest assembly ./libsuite.so --out ./results --run
//!
//! # Hand a request to the host-side service and wait for the answer
//! plugtest request --assembly ./libsuite.so
//!
//! # Diagnostics
//! plugtest hello --engine
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod models;
mod output;
mod protocol;
mod resolver;
mod results;
mod runner;

use cli::Args;
use config::AppConfig;
use output::{OutputFormat, ResultFormatter};
use resolver::{DylibEngineFactory, EngineFactory, ResolutionPaths};
use runner::TestRunner;

fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .compact()
        .init();

    match args.command {
        cli::Command::Assembly(assembly_args) => run_assembly(assembly_args)?,
        cli::Command::Request(request_args) => run_request(request_args)?,
        cli::Command::Hello(hello_args) => run_hello(hello_args)?,
    }

    Ok(())
}

fn run_assembly(args: cli::AssemblyArgs) -> Result<()> {
    let config = AppConfig::load_default()?;

    let out_dir = args.out.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let runtime_dir = args.runtime_dir.or(config.runtime_dir);
    let factory: Box<dyn EngineFactory> = match runtime_dir {
        Some(dir) => Box::new(DylibEngineFactory::with_runtime_dir(dir)),
        None => Box::new(DylibEngineFactory::new()),
    };

    let runner = TestRunner::new(&args.assembly, &out_dir)?.with_factory(factory);
    let formatter = ResultFormatter::new(
        OutputFormat::from_str(&args.format).unwrap_or(OutputFormat::Table),
    );
    let assembly_name = args.assembly.display().to_string();

    if args.run {
        let message = runner.run();
        if !message.is_empty() {
            bail!("run failed: {message}");
        }

        let document = std::fs::read_to_string(runner.run_result_path())?;
        let summary = results::parse_run(assembly_name, &document);
        println!("{}", formatter.format_run(&summary));
    } else {
        let message = runner.explore();
        if !message.is_empty() {
            bail!("explore failed: {message}");
        }

        let document = std::fs::read_to_string(runner.explore_result_path())?;
        let summary = results::parse_discovery(assembly_name, &document);
        println!("{}", formatter.format_discovery(&summary));
    }

    Ok(())
}

fn run_request(args: cli::RequestArgs) -> Result<()> {
    let config = AppConfig::load_default()?;
    let watch_dir = args.watch_dir.unwrap_or_else(|| config.watch_dir.clone());

    let request = match (args.file, args.assembly) {
        (Some(file), _) => protocol::RunRequest::load(&file)?,
        (None, Some(assembly)) => protocol::RunRequest::new(assembly),
        (None, None) => bail!("either --file or --assembly is required"),
    };

    let timeout = args
        .timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.response_timeout());

    protocol::submit_request(&watch_dir, &request)?;
    info!(
        "Waiting up to {}s for the service to answer {}",
        timeout.as_secs(),
        request.id
    );

    match protocol::await_response(&watch_dir, &request.id, timeout, config.poll_interval())? {
        Some(response) if response.is_success() => {
            println!("Results in {}", response.directory.display());
        }
        Some(response) => bail!("service reported failure: {}", response.message),
        None => bail!("no response within {}s", timeout.as_secs()),
    }

    Ok(())
}

fn run_hello(args: cli::HelloArgs) -> Result<()> {
    let config = AppConfig::load_default()?;

    println!("plugtest {}", env!("CARGO_PKG_VERSION"));
    println!("watch directory: {}", config.watch_dir.display());

    if args.engine {
        match ResolutionPaths::locate(config.runtime_dir.as_deref()) {
            Ok(paths) => {
                let state = if paths.engine_module().is_file() {
                    "present"
                } else {
                    "missing"
                };
                println!("anchor: {}", paths.anchor_dir().display());
                println!("engine module: {} ({state})", paths.engine_module().display());
                println!("runtime directory: {}", paths.runtime_dir().display());
            }
            Err(e) => println!("engine resolution unavailable: {e}"),
        }
    }

    Ok(())
}
