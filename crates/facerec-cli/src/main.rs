use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facerec", about = "Face recognition CLI")]
struct Cli {
    /// Base URL of a running facerecd
    #[arg(long, env = "FACEREC_SERVER", default_value = "http://127.0.0.1:7860", global = true)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate an image with recognised names
    Predict {
        #[arg(short, long)]
        image: PathBuf,
        /// Where to write the annotated JPEG
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Annotate an image with the face a registration would use
    Preview {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Register the first face in an image
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// List registered names
    List,
    /// Show how many faces are registered
    Count,
    /// Rename a registered face
    Rename {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        password: String,
    },
    /// Delete a registered face
    Delete {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show daemon status
    Status,
}

#[derive(Debug, Deserialize)]
struct OutcomeResponse {
    message: String,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct FacesResponse {
    names: Vec<String>,
    count: u64,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    registered_faces: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn new(server: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: server.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        bail!("facerecd returned {status}: {detail}")
    }

    /// POST image bytes and return the annotated JPEG, if any face frame came back.
    async fn annotate(&self, path: &str, image: &Path) -> Result<Option<Vec<u8>>> {
        let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
        let resp = self.http.post(self.url(path)).body(bytes).send().await?;
        let resp = Self::check(resp).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn register(&self, name: &str, image: &Path) -> Result<OutcomeResponse> {
        let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
        let resp = self
            .http
            .post(self.url("/api/v1/register"))
            .query(&[("name", name)])
            .body(bytes)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn manage(&self, path: &str, body: serde_json::Value) -> Result<OutcomeResponse> {
        let resp = self.http.post(self.url(path)).json(&body).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn faces(&self) -> Result<FacesResponse> {
        let resp = self.http.get(self.url("/api/v1/faces")).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn health(&self) -> Result<HealthResponse> {
        let resp = self.http.get(self.url("/api/v1/health")).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

fn report(outcome: &OutcomeResponse) -> ExitCode {
    println!("{}", outcome.message);
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn write_annotated(image: Option<Vec<u8>>, output: &Path) -> Result<()> {
    let Some(jpeg) = image else {
        bail!("daemon returned no frame");
    };
    std::fs::write(output, jpeg).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Annotated image written to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server);
    tracing::debug!(server = %client.base, "using facerecd");

    match cli.command {
        Commands::Predict { image, output } => {
            write_annotated(client.annotate("/api/v1/predict", &image).await?, &output)?;
        }
        Commands::Preview { image, output } => {
            write_annotated(client.annotate("/api/v1/register/preview", &image).await?, &output)?;
        }
        Commands::Register { name, image } => {
            return Ok(report(&client.register(&name, &image).await?));
        }
        Commands::List => {
            let faces = client.faces().await?;
            if faces.names.is_empty() {
                println!("No faces registered");
            }
            for name in &faces.names {
                println!("{name}");
            }
        }
        Commands::Count => {
            println!("{}", client.faces().await?.count);
        }
        Commands::Rename { from, to, password } => {
            let body = serde_json::json!({ "old_name": from, "new_name": to, "password": password });
            return Ok(report(&client.manage("/api/v1/faces/rename", body).await?));
        }
        Commands::Delete { name, password } => {
            let body = serde_json::json!({ "name": name, "password": password });
            return Ok(report(&client.manage("/api/v1/faces/delete", body).await?));
        }
        Commands::Status => {
            let health = client.health().await?;
            println!("facerecd {} ({})", health.version, health.status);
            println!("  uptime:           {}s", health.uptime_seconds);
            println!("  registered faces: {}", health.registered_faces);
        }
    }

    Ok(ExitCode::SUCCESS)
}
