use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecheck_core::{ImageSource, SeetaFaceLocator, Settings, Verifier};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facecheck", about = "Face enrollment and verification CLI")]
struct Cli {
    /// TOML settings file (default: $FACECHECK_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in an image
    Enroll {
        #[arg(short, long)]
        user: String,
        /// Image file, or a text file holding a data:image/ URL
        image: PathBuf,
    },
    /// Verify the face in an image against the user's enrollment
    Verify {
        #[arg(short, long)]
        user: String,
        image: PathBuf,
    },
    /// Show whether a user is enrolled
    Status {
        #[arg(short, long)]
        user: String,
    },
    /// Remove a user's enrollment
    Remove {
        #[arg(short, long)]
        user: String,
    },
    /// List enrolled users
    List,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    run(cli, &settings)
}

fn run(cli: Cli, settings: &Settings) -> Result<ExitCode> {
    match cli.command {
        Commands::Enroll { user, image } => {
            let verifier = open_verifier(settings)?;
            let result = verifier.enroll(&user, &read_image(&image)?)?;
            if cli.json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                println!("{}", result.message);
            }
            Ok(if result.ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Verify { user, image } => {
            let verifier = open_verifier(settings)?;
            let decision = verifier.verify(&user, &read_image(&image)?)?;
            if cli.json {
                println!("{}", serde_json::to_string(&decision)?);
            } else {
                println!("{}", decision.message);
            }
            Ok(if decision.matched { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Status { user } => {
            let enrolled = settings.open_store()?.exists(&user)?;
            if cli.json {
                println!("{}", serde_json::json!({ "user_id": user, "enrolled": enrolled }));
            } else if enrolled {
                println!("{user}: enrolled");
            } else {
                println!("{user}: not enrolled");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Remove { user } => {
            let removed = settings.open_store()?.delete(&user)?;
            if cli.json {
                println!("{}", serde_json::json!({ "user_id": user, "removed": removed }));
            } else if removed {
                println!("Removed enrollment for {user}");
            } else {
                println!("{user} was not enrolled");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let infos = settings.open_store()?.list()?;
            if cli.json {
                println!("{}", serde_json::to_string(&infos)?);
            } else if infos.is_empty() {
                println!("No users enrolled");
            } else {
                for info in &infos {
                    let at = info
                        .enrolled_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".into());
                    println!("{}\t{}\t{}", info.user_id, info.dimension, at);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_verifier(settings: &Settings) -> Result<Verifier> {
    let store = settings.open_store().context("failed to open feature store")?;
    let locator = SeetaFaceLocator::load(&settings.model_path, settings.locator.clone())
        .context("failed to load face detector")?;
    tracing::debug!(model = %settings.model_path.display(), "face detector loaded");
    Ok(Verifier::new(Box::new(locator), store, &settings.verifier))
}

fn read_image(path: &Path) -> Result<ImageSource> {
    let contents =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(ImageSource::from_file_contents(contents))
}
