use albums_core::{ClassificationPipeline, FaceDetector, ImageClassifier, Preprocessor, Taxonomy};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

// Generates `PhotoAlbumsProxy`.
#[zbus::proxy(
    interface = "org.freedesktop.PhotoAlbums1",
    default_service = "org.freedesktop.PhotoAlbums1",
    default_path = "/org/freedesktop/PhotoAlbums1"
)]
trait PhotoAlbums {
    async fn upload(&self, files: Vec<(String, Vec<u8>)>) -> zbus::Result<String>;
    async fn list_albums(&self) -> zbus::Result<String>;
    async fn fetch_image(&self, album: &str, filename: &str) -> zbus::Result<Vec<u8>>;
    async fn download_album(&self, album: &str) -> zbus::Result<Vec<u8>>;
    async fn clear(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "albums", about = "Sort photos into albums by what they show")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload photos to be classified and filed into albums
    Upload {
        /// Image files (png, jpg, jpeg, webp)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List albums and their images
    List,
    /// Save one image from an album
    Get {
        album: String,
        filename: String,
        /// Output path (default: the image filename)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download an album as a zip archive
    Download {
        album: String,
        /// Output path (default: <album>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every album and image
    Clear {
        /// Confirm the irreversible deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show daemon status
    Status,
    /// Classify an image locally, bypassing the daemon (diagnostics)
    Classify {
        file: PathBuf,
        /// Directory containing the ONNX models and label file
        /// (default: $ALBUMS_MODEL_DIR, then the system model directory)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload { files } => {
            let mut payload = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                payload.push((file_name(path)?, bytes));
            }
            tracing::debug!(files = payload.len(), "uploading");
            let conn = connect().await?;
            let response = PhotoAlbumsProxy::new(&conn).await?.upload(payload).await?;
            print_json(&response)?;
        }
        Commands::List => {
            let conn = connect().await?;
            let response = PhotoAlbumsProxy::new(&conn).await?.list_albums().await?;
            print_json(&response)?;
        }
        Commands::Get {
            album,
            filename,
            output,
        } => {
            let conn = connect().await?;
            let bytes = PhotoAlbumsProxy::new(&conn)
                .await?
                .fetch_image(&album, &filename)
                .await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&filename));
            std::fs::write(&output, bytes).with_context(|| format!("writing {}", output.display()))?;
            println!("Saved {}", output.display());
        }
        Commands::Download { album, output } => {
            let conn = connect().await?;
            let bytes = PhotoAlbumsProxy::new(&conn).await?.download_album(&album).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{album}.zip")));
            std::fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
            println!("Saved {} ({} bytes)", output.display(), bytes.len());
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to delete all albums without --yes");
            }
            let conn = connect().await?;
            let response = PhotoAlbumsProxy::new(&conn).await?.clear().await?;
            print_json(&response)?;
        }
        Commands::Status => {
            let conn = connect().await?;
            let response = PhotoAlbumsProxy::new(&conn).await?.status().await?;
            print_json(&response)?;
        }
        Commands::Classify { file, model_dir } => {
            // Direct inference, bypassing the daemon
            let model_dir = model_dir
                .or_else(|| std::env::var_os("ALBUMS_MODEL_DIR").map(PathBuf::from))
                .unwrap_or_else(albums_core::default_model_dir);
            classify_locally(&file, &model_dir)?;
        }
    }

    Ok(())
}

async fn connect() -> Result<zbus::Connection> {
    zbus::Connection::session()
        .await
        .context("failed to connect to the session bus (is albumsd running?)")
}

/// Load both models and run the pipeline on a single file.
fn classify_locally(file: &Path, model_dir: &Path) -> Result<()> {
    let model = |name: &str| model_dir.join(name).to_string_lossy().into_owned();

    let detector = FaceDetector::load(&model("det_10g.onnx"))?;
    let classifier = ImageClassifier::load(&model("mobilenetv2-12.onnx"), &model("imagenet_labels.txt"))?;
    let mut pipeline = ClassificationPipeline::new(
        detector,
        classifier,
        Preprocessor::default(),
        Default::default(),
    );

    tracing::debug!(path = %file.display(), model_dir = %model_dir.display(), "classifying locally");
    let predictions = pipeline.classify(file);
    let albums = Taxonomy::builtin().assign(&predictions);

    println!("{}", file.display());
    for p in &predictions {
        println!("  {:<24} {:.3}", p.label(), p.confidence());
    }
    let names: Vec<&str> = albums.iter().map(|a| a.as_str()).collect();
    println!("  albums: {}", names.join(", "));
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!("{} has no usable file name", path.display()),
    }
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
