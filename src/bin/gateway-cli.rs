use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered microservices
    Microservices {
        /// Only show pending, active or error
        #[arg(short, long)]
        status: Option<String>,
    },
    /// List endpoints of the current routing generation
    Endpoints,
    /// Register (or re-register) a microservice
    Register {
        name: String,
        service_url: String,
        #[arg(long)]
        path_info: Option<String>,
        #[arg(long)]
        path_live: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a microservice and its redirects
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Microservices { status } => {
            let mut request = client.get(format!("{base}/api/v1/microservice"));
            if let Some(status) = status {
                request = request.query(&[("status", status)]);
            }
            request.headers(headers).send().await?
        }
        Commands::Endpoints => {
            client
                .get(format!("{base}/api/v1/endpoint"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Register {
            name,
            service_url,
            path_info,
            path_live,
            tags,
        } => {
            client
                .post(format!("{base}/api/v1/microservice"))
                .headers(headers)
                .json(&json!({
                    "name": name,
                    "url": service_url,
                    "pathInfo": path_info,
                    "pathLive": path_live,
                    "tags": tags,
                }))
                .send()
                .await?
        }
        Commands::Remove { id } => {
            client
                .delete(format!("{base}/api/v1/microservice/{id}"))
                .headers(headers)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
