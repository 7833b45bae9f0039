use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use orchid::build::Pipeline;
use orchid::config::Config;
use orchid::gate::Mode;
use orchid::template::GtmplEngine;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchid", version, about = "Builds templated pages into a static site")]
struct Cli {
    /// Project file to use instead of searching for `orchid.yaml`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip drafts and pages whose publication date is in the future
    #[arg(long, global = true)]
    production: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every page and copy static assets
    Build,

    /// Build the given source documents
    Render {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Remove the output of the given source documents
    Remove {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let engine = GtmplEngine::new().load_partials(&config.partials_directory)?;
    let pipeline = Pipeline::new(config, Box::new(engine));

    let failures = match &cli.command {
        Command::Build => build(&pipeline).await?,
        Command::Render { files } => render(&pipeline, files).await,
        Command::Remove { files } => remove(&pipeline, files).await,
    };

    for date in pipeline.future_dates() {
        tracing::info!("Deferred until {}", date.to_rfc3339());
    }

    match failures {
        0 => Ok(()),
        n => Err(anyhow!("{} file(s) failed", n)),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_project_file(&absolute(path))?,
        None => {
            let cwd = std::env::current_dir()?;
            Config::from_directory(&cwd).or_else(|err| {
                tracing::debug!("{:#}; using defaults", err);
                Ok::<_, anyhow::Error>(Config::with_defaults(&cwd))
            })?
        }
    }
    .with_env_mode();
    if cli.production {
        config.mode = Mode::Production;
    }
    tracing::debug!("building in {} mode", config.mode);
    Ok(config)
}

async fn build(pipeline: &Pipeline) -> Result<usize> {
    let mut failures = 0;
    for (source, result) in pipeline.build_all().await? {
        if let Err(err) = result {
            tracing::error!("{}: {}", source.display(), err);
            failures += 1;
        }
    }
    for (file, result) in pipeline.copy_assets().await? {
        if let Err(err) = result {
            tracing::error!("{}: {}", file.display(), err);
            failures += 1;
        }
    }
    Ok(failures)
}

async fn render(pipeline: &Pipeline, files: &[PathBuf]) -> usize {
    let mut failures = 0;
    for file in files {
        match pipeline.create(&absolute(file)).await {
            Ok(report) => {
                for (id, decision) in report.skipped {
                    tracing::info!("Skipped {}: {:?}", id.display(), decision);
                }
            }
            Err(err) => {
                tracing::error!("{}", err);
                failures += 1;
            }
        }
    }
    failures
}

async fn remove(pipeline: &Pipeline, files: &[PathBuf]) -> usize {
    let mut failures = 0;
    for file in files {
        if let Err(err) = pipeline.destroy(&absolute(file)).await {
            tracing::error!("{}: {}", file.display(), err);
            failures += 1;
        }
    }
    failures
}

// Configured directories are absolute, so sources given on the command line
// must be too before they can be mapped.
fn absolute(path: &Path) -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_owned(),
    }
}
