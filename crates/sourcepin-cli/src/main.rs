mod commands;
mod progress;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::pin::PinArgs;
use commands::{EXIT_FAILURE, EXIT_INPUT_ERROR, INPUT_ERROR_PREFIX};
use sourcepin_core::install_signal_handler;
use sourcepin_resolve::CancelToken;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "sourcepin",
    version,
    about = "Pin container images, HTTP sources and git refs to immutable identifiers",
    long_about = "Resolve the image, HTTP and git references extracted from build manifests \
                  to digests, checksums and commits, and emit a BuildKit source policy.\n\n\
                  Usage with docker buildx:\n  \
                  EXPERIMENTAL_BUILDKIT_SOURCE_POLICY=policy.json docker buildx build ."
)]
struct Cli {
    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve extracted references and write a source policy.
    Pin {
        /// References files produced by a manifest parser (`-` reads stdin).
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Write the policy to this file instead of stdout.
        #[arg(short, long, conflicts_with = "stdout")]
        output: Option<PathBuf>,
        /// Write the policy to stdout (the default without --output).
        #[arg(long, default_value_t = false)]
        stdout: bool,
        /// Resolver settings file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Give up on the whole run after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Look up Docker Hub official images on AWS ECR Public first.
        #[arg(long, default_value_t = false)]
        prefer_ecr_public: bool,
        /// Look up Docker Hub official images on Microsoft MCR first.
        #[arg(long, default_value_t = false)]
        prefer_mcr: bool,
        /// Registry tool invoked as `<tool> digest <reference>`.
        #[arg(long)]
        registry_tool: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SOURCEPIN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Pin {
            inputs,
            output,
            stdout,
            config,
            timeout,
            prefer_ecr_public,
            prefer_mcr,
            registry_tool,
        } => {
            let cancel = CancelToken::new();
            install_signal_handler(cancel.clone());
            commands::pin::run(
                &PinArgs {
                    inputs,
                    output: if stdout { None } else { output },
                    config,
                    timeout,
                    prefer_ecr_public,
                    prefer_mcr,
                    registry_tool,
                },
                cancel,
            )
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(INPUT_ERROR_PREFIX) {
                EXIT_INPUT_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
