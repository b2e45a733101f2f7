use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "queue-cli")]
#[command(about = "Management CLI for the request-queue daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "QUEUE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the running generation, its queue and prefixes
    Status,
    /// List every queue in the namespace
    Queues,
    /// List delegations on the primary queue
    Delegations,
    /// Send requests under URI to another queue
    Delegate {
        queue_name: String,
        uri: String,
    },
    /// Remove the delegation for URI
    Undelegate {
        uri: String,
    },
    /// Start a new generation and retire the current one
    Handoff,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Queues => client.get(format!("{}/admin/queues", cli.url)),
        Commands::Delegations => client.get(format!("{}/admin/delegations", cli.url)),
        Commands::Delegate { queue_name, uri } => client
            .post(format!("{}/admin/delegations", cli.url))
            .json(&json!({ "queue_name": queue_name, "uri": uri })),
        Commands::Undelegate { uri } => client
            .delete(format!("{}/admin/delegations", cli.url))
            .json(&json!({ "uri": uri })),
        Commands::Handoff => client.post(format!("{}/admin/handoff", cli.url)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
