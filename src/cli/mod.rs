//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// In-process test discovery and execution for plugin assemblies
#[derive(Parser, Debug)]
#[command(name = "plugtest")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Discover and execute tests in plugin assemblies")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Explore or run a test assembly directly
    Assembly(AssemblyArgs),

    /// Submit a test request to the host-side service
    Request(RequestArgs),

    /// Diagnostic no-op
    Hello(HelloArgs),
}

/// Arguments for the assembly command
#[derive(Parser, Debug)]
pub struct AssemblyArgs {
    /// Path to the test assembly (shared library)
    pub assembly: PathBuf,

    /// Output directory for result artifacts (created if missing)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Execute discovered tests instead of only exploring
    #[arg(short, long)]
    pub run: bool,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Override the engine runtime library directory
    #[arg(long)]
    pub runtime_dir: Option<PathBuf>,
}

/// Arguments for the request command
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Prepared request file to submit
    #[arg(short, long, conflicts_with = "assembly")]
    pub file: Option<PathBuf>,

    /// Build a request for this assembly
    #[arg(short, long)]
    pub assembly: Option<PathBuf>,

    /// Watch directory of the service (defaults to configuration)
    #[arg(short, long)]
    pub watch_dir: Option<PathBuf>,

    /// Seconds to wait for the response
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Arguments for the hello command
#[derive(Parser, Debug)]
pub struct HelloArgs {
    /// Also report whether the engine module is locatable
    #[arg(long)]
    pub engine: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_args() {
        let args = Args::parse_from([
            "plugtest",
            "assembly",
            "./libsuite.so",
            "--out",
            "./results",
            "--run",
        ]);
        match args.command {
            Command::Assembly(assembly_args) => {
                assert_eq!(assembly_args.assembly, PathBuf::from("./libsuite.so"));
                assert_eq!(assembly_args.out, Some(PathBuf::from("./results")));
                assert!(assembly_args.run);
                assert_eq!(assembly_args.format, "table");
            }
            _ => panic!("Expected Assembly command"),
        }
    }

    #[test]
    fn test_request_args() {
        let args = Args::parse_from([
            "plugtest",
            "request",
            "--assembly",
            "./libsuite.so",
            "--timeout",
            "30",
        ]);
        match args.command {
            Command::Request(request_args) => {
                assert_eq!(request_args.assembly, Some(PathBuf::from("./libsuite.so")));
                assert_eq!(request_args.timeout, Some(30));
                assert!(request_args.file.is_none());
            }
            _ => panic!("Expected Request command"),
        }
    }

    #[test]
    fn test_hello_args() {
        let args = Args::parse_from(["plugtest", "hello", "--engine", "--verbose"]);
        assert!(args.verbose);
        match args.command {
            Command::Hello(hello_args) => assert!(hello_args.engine),
            _ => panic!("Expected Hello command"),
        }
    }
}
