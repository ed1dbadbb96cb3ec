use std::path::PathBuf;

use anyhow::{Context, Result};
use cat_or_loaf::config::{ModelConfig, ServerConfig};
use cat_or_loaf::{server, Classifier};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cat-or-loaf")]
#[command(about = "Tells cats from loaves of bread")]
struct Cli {
    #[command(flatten)]
    model: ModelConfig,

    /// Log level
    #[arg(long, env = "CAT_OR_LOAF_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Serve flags only, so a bare invocation still honours the environment.
#[derive(Parser)]
struct ServeDefaults {
    #[command(flatten)]
    server: ServerConfig,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve(ServerConfig),
    /// Classify local image files
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let classifier = Classifier::from_config(&cli.model)
        .with_context(|| format!("loading {}", cli.model.model_path.display()))?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeDefaults::parse_from(["cat-or-loaf"]).server));

    match command {
        Command::Serve(config) => server::run(config, classifier).await?,
        Command::Classify { images } => {
            let failed = classifier.classify_report(&images, &mut std::io::stdout().lock())?;
            if failed > 0 {
                anyhow::bail!("{} of {} images could not be classified", failed, images.len());
            }
        }
    }

    Ok(())
}
