use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irx::IndexError;
use irx::config::IndexConfig;
use irx::index::{IndexReader, Operation, build, compact, stats};
use irx::output;
use irx::query::{QueryExecutor, QueryOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "irx")]
#[command(about = "Inverted-index full-text search over a directory of documents")]
struct Cli {
    /// Indexer configuration file
    #[arg(short, long, global = true, default_value = "index.cfg")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from scratch
    Index {
        /// Hide progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Add, re-index or delete documents
    Update {
        /// Operation applied to every document
        #[arg(long, value_enum, default_value_t = Operation::Add)]
        op: Operation,

        /// Hide progress output
        #[arg(short, long)]
        quiet: bool,

        /// Documents to process; the whole tree when omitted
        files: Vec<PathBuf>,
    },
    /// Verify the index against the documents
    Check,
    /// Print every document and posting
    Dump,
    /// Show index statistics
    Stats,
    /// Fold pending journals into the snapshots
    Compact,
    /// Query the index
    Query {
        /// Show occurrence counts
        #[arg(long)]
        counts: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Report a document once per matching word of a wildcard
        #[arg(long)]
        no_dedup: bool,

        /// Query terms; split arguments are joined back together
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        terms: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = IndexConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;

    match cli.command {
        Commands::Index { quiet } => {
            let stats = build::build_index(&config, quiet)?;
            if !quiet {
                println!(
                    "Indexed {} documents ({} occurrences)",
                    stats.documents, stats.occurrences
                );
                println!("Index stored at: {}", config.db.display());
            }
        }
        Commands::Update { op, quiet, files } => {
            let stats = build::update_index(&config, op, &files, quiet)?;
            if !quiet {
                println!("{}: {} documents", op, stats.documents);
            }
        }
        Commands::Check => {
            let mut stdout = io::stdout();
            build::check_index(&config, &mut stdout).context("Index check failed")?;
        }
        Commands::Dump => {
            let reader = IndexReader::open(&config)?;
            let mut out = BufWriter::new(io::stdout().lock());
            reader.dump(&mut out)?;
            out.flush()?;
        }
        Commands::Stats => {
            stats::show_stats(&config)?;
        }
        Commands::Compact => {
            let folded = compact::reorganize(&config)?;
            if folded == 0 {
                println!("Index is already compact.");
            } else {
                println!("Folded {} journals into the index.", folded);
            }
        }
        Commands::Query {
            counts,
            no_color,
            limit,
            no_dedup,
            terms,
        } => {
            let reader = IndexReader::open(&config)?;
            let options = QueryOptions {
                dedup_wildcards: !no_dedup,
                ..QueryOptions::from_config(&config)
            };
            let executor = QueryExecutor::with_options(&reader, options);

            let mut matches = match executor.execute_args(&terms) {
                Ok(matches) => matches,
                Err(IndexError::QuerySyntax(message)) => {
                    eprintln!("Query syntax error: {}", message);
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(limit) = limit {
                matches.truncate(limit);
            }

            if matches.is_empty() {
                println!("No matches found.");
            } else {
                output::print_matches(&matches, !no_color, counts)?;
            }
        }
    }

    Ok(())
}
