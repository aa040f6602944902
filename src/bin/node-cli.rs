use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "node-cli")]
#[command(about = "Management CLI for proxy-node", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "NODE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Engine state, generation and inbounds
    Status,
    /// Ask the node to reload its node set
    Reload,
    /// List registered users of an inbound
    Users { tag: String },
    /// Add users (by id) to a running inbound
    AddUsers {
        tag: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove users (by id) from a running inbound
    RemoveUsers {
        tag: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Forget the id mappings of an inbound that is no longer served
    ResetUsers { tag: String },
    /// Per-user traffic of an inbound
    Traffic {
        tag: String,
        #[arg(long)]
        reset: bool,
    },
    /// Show which outbound a destination would be routed to
    Route {
        inbound: String,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long, default_value_t = 443)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Reload => client.post(format!("{base}/admin/reload")),
        Commands::Users { tag } => client.get(format!("{base}/admin/users/{tag}")),
        Commands::AddUsers { tag, ids } => {
            let users: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
            client
                .post(format!("{base}/admin/users/{tag}"))
                .json(&json!({ "users": users }))
        }
        Commands::RemoveUsers { tag, ids } => client
            .delete(format!("{base}/admin/users/{tag}"))
            .json(&json!({ "ids": ids })),
        Commands::ResetUsers { tag } => client.delete(format!("{base}/admin/registry/{tag}")),
        Commands::Traffic { tag, reset } => {
            client.get(format!("{base}/admin/traffic/{tag}?reset={reset}"))
        }
        Commands::Route {
            inbound,
            domain,
            ip,
            port,
        } => client.post(format!("{base}/admin/route")).json(&json!({
            "inbound": inbound,
            "domain": domain,
            "ip": ip,
            "port": port,
        })),
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

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
