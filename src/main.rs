//! Command line interface for dumping events from Nostr relays. Resolves
//! filter options, piped filter JSON and relay specifiers, then streams the
//! matching events to stdout as JSON lines. Relay aliases and relay sets are
//! managed through subcommands.

mod config;
mod event;
mod fetch;
mod filter;
mod ident;
mod input;
mod nip19;
mod relay_cmd;
mod relay_store;
mod relay_url;
mod tag;
mod timestamp;

use std::{
    io::{self, Read, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{resolve_config_path, ConfigRepo};
use input::{parse_input, DumpArgs, InputError};
use relay_cmd::{RelayAliasArgs, RelaySetArgs};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "nosdump",
    version,
    about = "A tool to dump events stored in Nostr relays",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, env = "NOSDUMP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    dump: DumpArgs,
    /// Relay URLs, relay aliases or `...<relay set>`.
    #[arg(value_name = "RELAYS", required = true)]
    relays: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage relay aliases.
    #[command(visible_alias = "alias")]
    RelayAlias(RelayAliasArgs),
    /// Manage relay sets.
    #[command(visible_alias = "set")]
    RelaySet(RelaySetArgs),
}

#[cfg(not(test))]
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

/// Execute the selected command. `stdin` is `None` when nothing is piped in.
async fn run<R: Read, W: Write>(cli: Cli, stdin: Option<R>, out: &mut W) -> anyhow::Result<()> {
    let config_path = resolve_config_path(cli.config)?;
    match cli.command {
        Some(Commands::RelayAlias(args)) => relay_cmd::relay_alias(args, &config_path, out),
        Some(Commands::RelaySet(args)) => relay_cmd::relay_set(args, &config_path, out),
        None => {
            let config = ConfigRepo::load(&config_path)?;
            let stdin_text = match stdin {
                Some(mut r) => {
                    let mut text = String::new();
                    r.read_to_string(&mut text).context("failed to read stdin")?;
                    text
                }
                None => String::new(),
            };
            let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
            let parsed = parse_input(&cli.dump, &cli.relays, &stdin_text, now, &config)?;

            if parsed.misc.dry_run {
                writeln!(out, "Parsed options:")?;
                writeln!(out, "{}", serde_json::to_string_pretty(&parsed.params)?)?;
                return Ok(());
            }
            fetch::dump(&parsed.params, out).await?;
            Ok(())
        }
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::io::IsTerminal;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdin = io::stdin();
    let piped = (!stdin.is_terminal()).then_some(stdin);
    let mut out = io::stdout().lock();
    if let Err(err) = run(cli, piped, &mut out).await {
        if let Some(input_err) = err.downcast_ref::<InputError>() {
            eprintln!("{}:", input_err.header());
            for msg in input_err.messages() {
                eprintln!("  * {msg}");
            }
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}
