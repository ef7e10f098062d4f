//! strata command line interface

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use strata::{
    backup, forget, generations, restore, show_generation, BackupOptions, Config, LocalBackend,
    RestoreOptions, Result, Store,
};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "incremental backup engine with a content-addressed object store")]
#[command(version)]
struct Cli {
    /// store path
    #[arg(short, long, env = "STRATA_STORE", default_value = ".")]
    store: PathBuf,

    /// host identity (defaults to the configured or actual hostname)
    #[arg(long)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new backup store
    Init {
        /// path to create the store at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// back up directory trees as a new generation
    Backup {
        /// directories to back up
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// glob patterns for pathnames to leave out
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// restore a generation into a directory
    Restore {
        /// id of the generation to restore
        gen_id: String,

        /// directory to restore into
        target: PathBuf,

        /// restore only these pathnames (everything when omitted)
        files: Vec<String>,
    },

    /// list all generations
    Generations,

    /// list the files in one generation
    Show {
        /// id of the generation to show
        gen_id: String,
    },

    /// remove generations and the data only they referenced
    Forget {
        /// ids of the generations to forget
        #[arg(required = true)]
        gen_ids: Vec<String>,
    },
}

fn open_store(cli: &Cli) -> Result<Store<LocalBackend>> {
    let backend = LocalBackend::open(&cli.store)?;
    let config_path = cli.store.join("config.toml");
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };
    if let Some(host) = &cli.host {
        config.host_id = Some(host.clone());
    }
    Ok(Store::new(backend, config))
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Init { path } => {
            LocalBackend::create(path)?;
            Config::default().save(&path.join("config.toml"))?;
            println!("initialized empty store at {}", path.display());
        }

        Commands::Backup { roots, exclude } => {
            let mut store = open_store(&cli)?;
            let _lock = store.backend().lock()?;
            let options = BackupOptions {
                excludes: exclude.clone(),
            };
            let root_refs: Vec<&std::path::Path> = roots.iter().map(PathBuf::as_path).collect();
            let report = backup(&mut store, &root_refs, &options)?;
            println!("generation {}", report.gen_id);
            println!(
                "{} entries: {} unchanged, {} stored as delta, {} stored in full",
                report.files_total,
                report.files_unchanged,
                report.files_delta,
                report.files_full
            );
        }

        Commands::Restore {
            gen_id,
            target,
            files,
        } => {
            let mut store = open_store(&cli)?;
            let options = RestoreOptions {
                files: files.clone(),
            };
            let report = restore(&mut store, gen_id, target, &options)?;
            println!(
                "restored {} entries ({} skipped)",
                report.files_restored, report.files_skipped
            );
        }

        Commands::Generations => {
            let mut store = open_store(&cli)?;
            for gen in generations(&mut store)? {
                match (gen.start, gen.end) {
                    (Some(start), Some(end)) => println!("{} {} -- {}", gen.id, start, end),
                    _ => println!("{}", gen.id),
                }
            }
        }

        Commands::Show { gen_id } => {
            let mut store = open_store(&cli)?;
            for entry in show_generation(&mut store, gen_id)? {
                let mode = entry.stat.mode.unwrap_or(0);
                let size = entry.stat.size.unwrap_or(0);
                println!("{:o} {:>10} {}", mode, size, entry.pathname);
            }
        }

        Commands::Forget { gen_ids } => {
            let mut store = open_store(&cli)?;
            let _lock = store.backend().lock()?;
            let stats = forget(&mut store, gen_ids)?;
            println!(
                "forgot {} generations, removed {} blocks, kept {}",
                stats.generations_forgotten, stats.blocks_removed, stats.blocks_kept
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
