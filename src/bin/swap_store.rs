use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand, ValueEnum};
use swap_sync::swap::store::SqliteSwapStore;
use swap_sync::sync::phase::Phase;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "swaps.sqlite3")]
    store_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a user's swaps, optionally only the candidates of one sync phase.
    List {
        #[arg(long)]
        user_id: String,

        #[arg(long, value_enum)]
        phase: Option<PhaseArg>,
    },
    Show {
        #[arg(long)]
        swap_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PhaseArg {
    Pending,
    Expired,
    Failed,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Pending => Phase::Pending,
            PhaseArg::Expired => Phase::Expired,
            PhaseArg::Failed => Phase::Failed,
        }
    }
}

fn main() -> Result<()> {
    swap_sync::logging::init().ok();
    let args = Args::parse();

    let store = SqliteSwapStore::open(args.store_path).context("open swap store")?;
    tracing::debug!(path = %store.path().display(), "opened swap store");

    let out = match args.command {
        Command::List { user_id, phase } => {
            let swaps = match phase {
                Some(phase) => store
                    .query(&user_id, &Phase::from(phase).predicate())
                    .context("query phase candidates")?,
                None => store.list_swaps(&user_id).context("list swaps")?,
            };
            serde_json::to_value(swaps).context("encode swaps")?
        }
        Command::Show { swap_id } => {
            let swap = store
                .get_swap(&swap_id)
                .context("get swap")?
                .with_context(|| format!("swap not found: {swap_id}"))?;
            serde_json::to_value(swap).context("encode swap")?
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
