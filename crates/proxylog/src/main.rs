// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! proxylog - encrypted exchange logs and daily cost caps for an LLM proxy.
//!
//! This is the binary entry point for the operator tooling.

mod decrypt;
mod status;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use proxylog_config::ProxylogConfig;
use proxylog_vault::{FieldCodec, decode_key, generate_key};

/// proxylog - encrypted exchange logs and daily cost caps for an LLM proxy.
#[derive(Parser, Debug)]
#[command(name = "proxylog", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt the payload fields of a JSONL log file.
    Decrypt {
        /// Encrypted JSONL log file.
        input: PathBuf,
        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Base64 AES-256 key (default: logging.encryption_key from config).
        #[arg(short, long)]
        key: Option<String>,
        /// Fields to decrypt (default: request_encrypted response_encrypted).
        #[arg(short, long, num_args = 1..)]
        fields: Vec<String>,
    },
    /// Generate a new base64 encryption key.
    Keygen,
    /// Show today's spend against the daily cap.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Validate the configuration and print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Keygen) => match generate_key() {
            Ok(key) => println!("{key}"),
            Err(e) => exit_with(&e),
        },
        Some(Commands::Decrypt {
            input,
            output,
            key,
            fields,
        }) => {
            init_tracing("info");
            let codec = match key {
                Some(key) => decode_key(&key).and_then(|bytes| FieldCodec::new(&bytes)),
                None => FieldCodec::from_config(&load_config(cli.config.as_deref()).logging),
            };
            let codec = codec.unwrap_or_else(|e| exit_with(&e));
            let fields = if fields.is_empty() {
                decrypt::DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
            } else {
                fields
            };
            if let Err(e) = decrypt::run_decrypt(&input, output.as_deref(), &codec, &fields) {
                exit_with(&e);
            }
        }
        Some(Commands::Status { json, plain }) => {
            let config = load_config(cli.config.as_deref());
            init_tracing(&config.agent.log_level);
            if let Err(e) = status::run_status(&config, json, plain).await {
                exit_with(&e);
            }
        }
        Some(Commands::CheckConfig) => {
            let config = load_config(cli.config.as_deref());
            print_config_summary(&config);
        }
        None => {
            println!("proxylog: use --help for available commands");
        }
    }
}

/// Load and validate configuration, exiting with diagnostics on failure.
fn load_config(path: Option<&Path>) -> ProxylogConfig {
    let result = match path {
        Some(path) => proxylog_config::load_and_validate_path(path),
        None => proxylog_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            proxylog_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn print_config_summary(config: &ProxylogConfig) {
    println!("proxylog: config OK");
    println!("  identity:        {}", config.agent.resolved_identity());
    println!("  log directory:   {}", config.logging.directory);
    println!("  compression:     {}", config.logging.compression);
    println!(
        "  batching:        {} records / {}ms, queue {}",
        config.logging.batch_size, config.logging.batch_timeout_ms, config.logging.queue_capacity
    );
    println!("  daily cap:       €{:.2}", config.limits.daily_cost_cap_eur);
    println!("  priced models:   {}", config.pricing.len());
}

fn exit_with(err: &proxylog_core::ProxylogError) -> ! {
    eprintln!("proxylog: {err}");
    std::process::exit(1);
}

/// Initialize the tracing subscriber. Output goes to stderr so it never mixes
/// with command output on stdout.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("proxylog={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
