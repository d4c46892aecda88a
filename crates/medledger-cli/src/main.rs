use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "medledger-cli")]
#[command(about = "CLI client for the medledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct NodeArg {
    /// Node base URL (e.g. http://127.0.0.1:5000)
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    node: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a medicine transfer
    Submit {
        #[command(flatten)]
        node: NodeArg,
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        medicine: String,
        #[arg(long)]
        quantity: u64,
        /// Price in minor currency units
        #[arg(long)]
        price: u64,
    },
    /// Print the node's full chain
    Chain {
        #[command(flatten)]
        node: NodeArg,
    },
    /// Print transactions waiting for the next block
    Pending {
        #[command(flatten)]
        node: NodeArg,
    },
    /// Mine a block on the node
    Mine {
        #[command(flatten)]
        node: NodeArg,
    },
    /// Register peers with the node
    Register {
        #[command(flatten)]
        node: NodeArg,
        /// Peer addresses, e.g. 127.0.0.1:5001
        #[arg(required = true)]
        peers: Vec<String>,
    },
    /// Run longest-chain conflict resolution on the node
    Resolve {
        #[command(flatten)]
        node: NodeArg,
    },
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    medicine: String,
    quantity: u64,
    price: u64,
}

#[derive(Serialize)]
struct Nodes {
    nodes: Vec<String>,
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let res = match cli.cmd {
        Command::Submit {
            node,
            sender,
            recipient,
            medicine,
            quantity,
            price,
        } => {
            let tx = Tx {
                sender,
                recipient,
                medicine,
                quantity,
                price,
            };
            client
                .post(format!("{}/transactions/new", node.node))
                .json(&tx)
                .send()
                .await?
        }
        Command::Chain { node } => client.get(format!("{}/chain", node.node)).send().await?,
        Command::Pending { node } => {
            client
                .get(format!("{}/transactions/pending", node.node))
                .send()
                .await?
        }
        Command::Mine { node } => client.post(format!("{}/mine", node.node)).send().await?,
        Command::Register { node, peers } => {
            client
                .post(format!("{}/nodes/register", node.node))
                .json(&Nodes { nodes: peers })
                .send()
                .await?
        }
        Command::Resolve { node } => {
            client
                .get(format!("{}/nodes/resolve", node.node))
                .send()
                .await?
        }
    };
    debug!(url = %res.url(), "request finished");
    print_response(res).await
}
