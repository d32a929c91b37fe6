//! httpsync CLI
//!
//! Mirrors an HTTP directory tree (or a local one) into a destination
//! directory, fetching new files through an aria2 daemon.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use httpsync::{
    config::{ConfigOverrides, config_target, load_config},
    error::Result,
    models::Config,
    pipeline::{IndexBuilder, MirrorOptions, TrimOptions, run_mirror, run_trim},
    services::{Aria2Client, make_lister},
    storage::{IndexStore, LocalIndexStore},
    utils::log as console,
};

/// httpsync - HTTP directory mirror
#[derive(Parser, Debug)]
#[command(
    name = "httpsync",
    version,
    about = "Mirror an HTTP directory listing tree incrementally"
)]
struct Cli {
    /// Configuration file (default: ./httpsync.toml if present)
    #[arg(short = 'C', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the source, download new files and prune removed ones
    Mirror {
        #[command(flatten)]
        overrides: OverrideArgs,

        /// Crawl and compare only
        #[arg(long)]
        dry_run: bool,

        /// Write the effective configuration back to the config file
        #[arg(long)]
        save: bool,
    },

    /// Crawl the source and write its index as JSON
    Index {
        #[command(flatten)]
        overrides: OverrideArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete local files that are not in the persisted index
    Trim {
        #[command(flatten)]
        overrides: OverrideArgs,

        /// Report only
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration
    Validate,

    /// Show effective paths and the persisted index
    Info,
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Source URL or local directory
    #[arg(short = 'u', long)]
    source: Option<String>,

    /// Mirror directory name under the destination
    #[arg(short = 'd', long)]
    distro: Option<String>,

    /// Destination directory
    #[arg(short = 'p', long)]
    destination: Option<PathBuf>,

    /// Index cache directory
    #[arg(short = 'c', long)]
    cache: Option<PathBuf>,

    /// Include pattern (repeatable)
    #[arg(short = 'i', long)]
    include: Vec<String>,

    /// Exclude pattern (repeatable)
    #[arg(short = 'x', long)]
    exclude: Vec<String>,

    /// aria2 RPC host
    #[arg(short = 'H', long)]
    rpc_host: Option<String>,

    /// aria2 RPC port
    #[arg(short = 'P', long)]
    rpc_port: Option<u16>,

    /// aria2 RPC secret
    #[arg(short = 'S', long)]
    rpc_secret: Option<String>,

    /// Concurrent directory listings
    #[arg(short = 'w', long)]
    workers: Option<usize>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            source: args.source,
            distro: args.distro,
            destination: args.destination,
            cache: args.cache,
            include: args.include,
            exclude: args.exclude,
            rpc_host: args.rpc_host,
            rpc_port: args.rpc_port,
            rpc_secret: args.rpc_secret,
            workers: args.workers,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
    console::init(level);
}

fn configured(mut config: Config, overrides: OverrideArgs) -> Result<Config> {
    ConfigOverrides::from(overrides).apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Mirror {
            overrides,
            dry_run,
            save,
        } => {
            let config = configured(config, overrides)?;
            if save {
                let target = config_target(cli.config.as_deref());
                config.save(&target)?;
                log::info!("Configuration saved to {}", target.display());
            }

            let source = make_lister(&config)?;
            let store = LocalIndexStore::from_config(&config);
            let downloader = Aria2Client::new(&config.aria2)?;
            let report =
                run_mirror(&config, &source, &store, &downloader, &MirrorOptions { dry_run })
                    .await?;

            if let Some(downloads) = &report.downloads {
                if !downloads.failed.is_empty() {
                    console::warn(&format!(
                        "{} file(s) were not downloaded; they will be retried next run",
                        downloads.failed.len()
                    ));
                }
            }
        }

        Command::Index { overrides, output } => {
            let config = configured(config, overrides)?;
            let source = make_lister(&config)?;
            let build = IndexBuilder::from_config(&source, &config)?
                .build(&source.root_url)
                .await?;

            let json = serde_json::to_string_pretty(&build.tree)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    console::success(&format!(
                        "{} files indexed into {}",
                        build.tree.file_count(),
                        path.display()
                    ));
                }
                None => println!("{json}"),
            }
        }

        Command::Trim { overrides, dry_run } => {
            let config = configured(config, overrides)?;
            let store = LocalIndexStore::from_config(&config);
            run_trim(&config, &store, &TrimOptions { dry_run }).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                console::error(&format!("Config validation failed: {}", e));
                return Err(e);
            }
            console::success("Config OK");
        }

        Command::Info => {
            let store = LocalIndexStore::from_config(&config);
            console::summary(
                "Paths",
                &[
                    ("Source", config.general.source.clone()),
                    ("Mirror", config.mirror_root().display().to_string()),
                    ("Index", store.location()),
                    ("aria2", config.aria2.endpoint()),
                ],
            );
            match store.load().await? {
                Some(index) => console::summary(
                    "Persisted index",
                    &[
                        ("Files", index.file_count().to_string()),
                        ("Directories", index.dir_count().to_string()),
                    ],
                ),
                None => console::info("No index persisted yet."),
            }
        }
    }

    Ok(())
}
