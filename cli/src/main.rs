//! entindex CLI — inspect and manage indexer state.
//!
//! Usage:
//! ```bash
//! entindex status --db ./index.db --chain ethereum --id gravatar
//! entindex rewind --db ./index.db --chain ethereum --id gravatar --to 6175000
//! entindex info
//! ```

use std::env;
use std::process;

use anyhow::{bail, Context, Result};
use chrono::DateTime;

use entindex_core::IndexerConfig;
use entindex_store::{Persistence, SqlitePersistence};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => {
            cmd_info();
            Ok(())
        }
        "status" => cmd_status(&args[2..]).await,
        "rewind" => cmd_rewind(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("entindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("entindex {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe entity-projection indexing engine\n");
    println!("USAGE:");
    println!("    entindex <COMMAND>\n");
    println!("COMMANDS:");
    println!("    status   Show the checkpoint for an indexer (--db, --chain, --id)");
    println!("    rewind   Revert committed blocks above --to (--db, --chain, --id)");
    println!("    info     Show EntIndex configuration defaults");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    let defaults = IndexerConfig::default();
    println!("EntIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default confirmation depth: {} blocks", defaults.confirmation_depth);
    println!("  Default batch size: {} blocks/call", defaults.batch_size);
    println!("  Default reorg window: {} blocks", defaults.reorg_window);
    println!("  Storage backends: memory, SQLite");
    println!("  Chains: EVM (Ethereum, Arbitrum, Base, Polygon, Optimism, ...)");
}

async fn cmd_status(args: &[String]) -> Result<()> {
    let opts = Opts::parse(args)?;
    let backend = SqlitePersistence::open(&opts.db)
        .await
        .with_context(|| format!("opening {}", opts.db))?;

    match backend.load_checkpoint(&opts.chain, &opts.id).await? {
        Some(cp) => {
            println!("Indexer:  {} / {}", cp.chain_id, cp.indexer_id);
            println!("Block:    {}", cp.block_number);
            println!("Hash:     {}", cp.block_hash);
            let updated = DateTime::from_timestamp(cp.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cp.updated_at.to_string());
            println!("Updated:  {updated}");
        }
        None => println!("No checkpoint for {} / {}", opts.chain, opts.id),
    }
    Ok(())
}

async fn cmd_rewind(args: &[String]) -> Result<()> {
    let opts = Opts::parse(args)?;
    let to = opts
        .to
        .context("rewind requires --to <block-number>")?;
    let backend = SqlitePersistence::open(&opts.db)
        .await
        .with_context(|| format!("opening {}", opts.db))?;

    backend.revert_to(&opts.chain, &opts.id, to).await?;
    match backend.load_checkpoint(&opts.chain, &opts.id).await? {
        Some(cp) => println!("Rewound {} / {} to block {}", opts.chain, opts.id, cp.block_number),
        None => println!("Rewound {} / {} past all committed blocks", opts.chain, opts.id),
    }
    Ok(())
}

struct Opts {
    db: String,
    chain: String,
    id: String,
    to: Option<u64>,
}

impl Opts {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = Self {
            db: "./entindex.db".into(),
            chain: "ethereum".into(),
            id: "default".into(),
            to: None,
        };
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .with_context(|| format!("{flag} requires a value"))?;
            match flag.as_str() {
                "--db" => opts.db = value.clone(),
                "--chain" => opts.chain = value.clone(),
                "--id" => opts.id = value.clone(),
                "--to" => {
                    opts.to = Some(value.parse().with_context(|| {
                        format!("--to expects a block number, got '{value}'")
                    })?)
                }
                other => bail!("unknown flag: {other}"),
            }
        }
        Ok(opts)
    }
}
