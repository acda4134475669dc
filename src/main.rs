use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use raft_lite::channel::Channel;
use raft_lite::cluster::NodeInfo;
use raft_lite::config::NodeConfig;
use raft_lite::error::RaftLiteError;
use raft_lite::node::Node;
use raft_lite::raft::{ConsensusMachine, LogEntry};
use raft_lite::rpc::{AppendLogs, AppendLogsArgs, FetchState, FetchStateArgs};
use raft_lite::server::RpcServer;
use raft_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "raft-lite")]
#[command(version)]
#[command(about = "A minimal peer-to-peer consensus node with simulated network faults")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a cluster node
    Server(ServerArgs),

    /// Fetch the identity and membership view of a running node
    State {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Append log entries through a running node
    Append {
        #[command(flatten)]
        client: ClientArgs,

        /// Entries to append
        #[arg(required = true)]
        entries: Vec<String>,
    },
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Name of this node (unique within the cluster)
    #[arg(long, short = 'n', default_value = "node")]
    name: String,

    /// Host to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    port: u16,

    /// Address of an existing member to join the network through
    #[arg(long, short = 's')]
    join: Option<SocketAddr>,

    /// Mean delay of outbound communication channels (ms)
    #[arg(long, short = 'd', default_value = "0")]
    delay: f64,

    /// Loss rate of outbound communication channels, in [0, 1]
    #[arg(long, short = 'l', default_value = "0")]
    loss: f64,

    /// Random seed for fault injection and election timing (0 = entropy)
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Address of the target node
    #[arg(long, short = 'a', default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen = format!("{}:{}", args.host, args.port);
    let listen_addr: SocketAddr = listen
        .parse()
        .map_err(|_| RaftLiteError::InvalidAddress(listen.clone()))?;

    let mut config = NodeConfig::new(args.name, listen_addr)
        .with_faults(args.delay, args.loss)
        .with_seed(args.seed);
    if let Some(join) = args.join {
        config = config.with_join_addr(join);
    }

    let listener = TcpListener::bind(config.listen_addr).await?;
    // Advertise the bound address so a port-0 bind stays reachable
    let endpoint = listener.local_addr()?;

    let node = Arc::new(Node::new(
        NodeInfo::new(config.name.clone(), endpoint),
        &config,
    ));
    let machine = Arc::new(ConsensusMachine::new(Arc::clone(&node), &config));
    let shutdown = install_shutdown_handler();

    let role_machine = Arc::clone(&machine);
    let role_token = shutdown.clone();
    tokio::spawn(async move {
        role_machine.run(role_token).await;
    });

    let server = RpcServer::new(Arc::clone(&node), Arc::clone(&machine));
    let server_handle = tokio::spawn(server.run(listener, shutdown.clone()));

    if let Some(join_addr) = config.join_addr {
        node.establish_connection(join_addr).await?;
    }

    server_handle.await?;
    Ok(())
}

async fn handle_state(client: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reply = Channel::reliable(client.addr)
        .call::<FetchState>(FetchStateArgs {})
        .await?;

    match client.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        OutputFormat::Table => {
            match reply.node {
                Some(node) => println!("Node:    {}", node),
                None => println!("Node:    <unknown>"),
            }
            println!("Members:");
            if reply.members.is_empty() {
                println!("  (none)");
            }
            for member in reply.members {
                println!("  {}", member);
            }
        }
    }
    Ok(())
}

async fn handle_append(
    client: ClientArgs,
    entries: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries: Vec<LogEntry> = entries.into_iter().map(LogEntry::from).collect();
    let reply = Channel::reliable(client.addr)
        .call::<AppendLogs>(AppendLogsArgs { entries })
        .await?;

    match client.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        OutputFormat::Table => {
            println!("Appended {} entries", reply.appended);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::State { client } => handle_state(client).await?,
        Commands::Append { client, entries } => handle_append(client, entries).await?,
    }

    Ok(())
}
