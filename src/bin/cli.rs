//! pagestore CLI
//!
//! Inspect and populate a node store from the command line.

use clap::{Parser, Subcommand};
use pagestore::{Config, NodeStore, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// pagestore CLI
#[derive(Parser, Debug)]
#[command(name = "pagestore")]
#[command(about = "Block-structured node store toolkit")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./pagestore_data")]
    data_dir: String,

    /// Store name (file prefix)
    #[arg(short, long, default_value = "nodes")]
    name: String,

    /// Open the store read-only
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show files, blocks and open blocks
    Stats,

    /// Load every page and report checksum failures
    Verify,

    /// Intern an IRI and print its key
    Intern {
        /// The IRI to intern
        iri: String,
    },

    /// Look up an IRI without interning it
    Lookup {
        /// The IRI to look up
        iri: String,
    },

    /// Intern a literal and print its key
    Literal {
        /// Lexical value
        lexical: String,

        /// Datatype IRI
        #[arg(long)]
        datatype: Option<String>,

        /// Language tag
        #[arg(long)]
        lang: Option<String>,
    },

    /// Allocate a new blank node id
    Blank,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pagestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .store_name(&args.name)
        .read_only(args.read_only)
        .build();

    let store = match NodeStore::open(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        std::process::exit(1);
    }
}

fn run(store: &NodeStore, command: Commands) -> Result<()> {
    match command {
        Commands::Stats => {
            let stats = store.stats()?;
            for file in &stats.files {
                println!(
                    "{} (radical {}): {} blocks, {} entries, {} open blocks",
                    file.path.display(),
                    file.radical,
                    file.block_count,
                    file.entry_count,
                    file.open_blocks.len()
                );
                for (block, remaining) in &file.open_blocks {
                    println!("  block {:>5}: {} bytes free", block, remaining);
                }
            }
            println!("string buckets:  {}", stats.string_buckets);
            println!("literal buckets: {}", stats.literal_buckets);
            println!("next blank id:   {}", stats.next_blank);
        }
        Commands::Verify => {
            let failures = store.verify()?;
            if failures.is_empty() {
                println!("OK");
            }
            for failure in &failures {
                println!(
                    "file {} block {}: {}",
                    failure.radical, failure.block, failure.error
                );
            }
        }
        Commands::Intern { iri } => {
            let node = store.get_iri_node(&iri)?;
            store.commit()?;
            println!("{}", node.key());
        }
        Commands::Lookup { iri } => match store.get_existing_iri_node(&iri)? {
            Some(node) => println!("{}", node.key()),
            None => println!("(not found)"),
        },
        Commands::Literal {
            lexical,
            datatype,
            lang,
        } => {
            let node =
                store.get_literal_node(Some(&lexical), datatype.as_deref(), lang.as_deref())?;
            store.commit()?;
            println!("{}", node.key());
        }
        Commands::Blank => {
            let node = store.get_blank_node()?;
            store.commit()?;
            println!("{}", node);
        }
    }
    Ok(())
}
