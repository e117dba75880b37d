use facelink::{cli::commands, Config, FacingMode};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facelink")]
#[command(about = "Face enrollment and live recognition client")]
struct Cli {
    /// Enable development mode (verbose logging with source locations)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (defaults to configs/facelink.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Camera override: /dev/videoN, an image file, or stub://name
    #[arg(long, global = true)]
    source: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the recognition service answers
    Health,
    /// Capture samples for a subject and enroll them
    Enroll {
        #[arg(short, long)]
        name: String,
    },
    /// Retrain the global model
    Train,
    /// Live recognition against the camera
    Recognize {
        /// user or environment
        #[arg(short, long, default_value = "user")]
        facing: FacingMode,
    },
    /// Show the enrolled roster
    Roster {
        /// Keep the roster live from the update stream
        #[arg(short, long)]
        watch: bool,
    },
    /// Write the texture view of an image
    Filter {
        input: PathBuf,
        output: PathBuf,
    },
    /// Print the luminance histogram of an image
    Histogram {
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        config.camera.user_device = source;
        config.camera.environment_device = None;
    }

    match cli.command {
        Commands::Health => commands::health(&config).await?,
        Commands::Enroll { name } => {
            println!("Enrolling subject: {}", name);
            commands::enroll(&config, &name).await?;
        }
        Commands::Train => commands::train(&config).await?,
        Commands::Recognize { facing } => commands::recognize(&config, facing).await?,
        Commands::Roster { watch } => commands::roster(&config, watch).await?,
        Commands::Filter { input, output } => commands::filter(&config, &input, &output)?,
        Commands::Histogram { image } => commands::histogram(&image)?,
    }

    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
