//! Subcommands.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Subcommand};
use corelib::{Location, LogicalNode, NodeEvent};
use distributor::{DistributorConfig, FakeStore, ResourceDistributor};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

const INGEST_BATCH: usize = 1_000;
const WATCH_QUIET: Duration = Duration::from_millis(200);

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the effective distributor configuration.
    ShowConfig,
    /// Run ingest, registration, list and watch against an in-memory store.
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Nodes to create, spread over every location of the topology.
    #[arg(long, default_value_t = 10_000)]
    pub nodes: usize,

    /// Clients to register.
    #[arg(long, default_value_t = 1)]
    pub clients: usize,

    /// Hosts requested by each client.
    #[arg(long, default_value_t = 500)]
    pub hosts: usize,

    /// Modified events sent after the clients start watching.
    #[arg(long, default_value_t = 1_000)]
    pub updates: usize,
}

/// Output of a command, printed as pretty JSON.
#[derive(Debug)]
pub struct CommandResult(pub serde_json::Value);

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

impl Command {
    pub async fn execute(self, config: DistributorConfig) -> anyhow::Result<CommandResult> {
        match self {
            Command::ShowConfig => Ok(CommandResult(serde_json::to_value(&config)?)),
            Command::Simulate(args) => {
                let report = simulate(config, args).await?;
                Ok(CommandResult(serde_json::to_value(&report)?))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientReport {
    pub client_id: String,
    pub listed_nodes: usize,
    pub watched_events: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub nodes_ingested: usize,
    pub total_hosts: usize,
    pub updates_sent: usize,
    pub persisted_records: usize,
    pub clients: Vec<ClientReport>,
    pub elapsed_ms: u64,
}

pub async fn simulate(
    config: DistributorConfig,
    args: SimulateArgs,
) -> anyhow::Result<SimulationReport> {
    let started = Instant::now();
    let store = Arc::new(FakeStore::new());
    let channel_capacity = config.watch_channel_capacity;
    let dis = Arc::new(
        ResourceDistributor::new(config, store.clone()).context("creating distributor")?,
    );

    let locations: Vec<Location> = dis.node_store().ring().locations().collect();
    let mut versions: HashMap<Location, u64> = HashMap::new();
    let mut next_rv = |location: Location| {
        let rv = versions.entry(location).or_insert(0);
        *rv += 1;
        *rv
    };

    let nodes: Vec<LogicalNode> = (0..args.nodes)
        .map(|i| {
            let location = locations[i % locations.len()];
            LogicalNode::new(format!("sim-node-{i}"), next_rv(location), location)
        })
        .collect();
    for chunk in nodes.chunks(INGEST_BATCH) {
        let events = chunk.iter().cloned().map(NodeEvent::added).collect();
        dis.process_events(events).await;
    }
    info!(nodes = nodes.len(), hosts = dis.node_store().total_host_num(), "nodes ingested");

    let mut watchers = Vec::with_capacity(args.clients);
    for _ in 0..args.clients {
        let client_id = dis
            .register_client(args.hosts)
            .await
            .context("registering client")?;
        let (listed, rvs) = dis.list_nodes_for_client(&client_id)?;

        let (tx, rx) = mpsc::channel(channel_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        dis.watch(&client_id, &rvs, tx, stop_rx)?;
        watchers.push((client_id, listed.len(), rx, stop_tx));
    }

    let updates: Vec<NodeEvent> = (0..args.updates)
        .filter_map(|i| {
            let node = nodes.get(i % nodes.len().max(1))?;
            let location = node.location().ok()?;
            let mut node = node.clone();
            node.resource_version = next_rv(location).to_string();
            Some(NodeEvent::modified(node))
        })
        .collect();
    let updates_sent = updates.len();
    for chunk in updates.chunks(INGEST_BATCH) {
        dis.process_events(chunk.to_vec()).await;
    }

    let mut clients = Vec::with_capacity(watchers.len());
    for (client_id, listed_nodes, mut rx, stop_tx) in watchers {
        let watched_events = count_events(&mut rx).await;
        let _ = stop_tx.send(());
        clients.push(ClientReport {
            client_id,
            listed_nodes,
            watched_events,
        });
    }

    Ok(SimulationReport {
        nodes_ingested: nodes.len(),
        total_hosts: dis.node_store().total_host_num(),
        updates_sent,
        persisted_records: store.len(),
        clients,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Count events until the stream has been quiet for a while.
async fn count_events(rx: &mut mpsc::Receiver<NodeEvent>) -> usize {
    let mut count = 0;
    while let Ok(Some(_)) = tokio::time::timeout(WATCH_QUIET, rx.recv()).await {
        count += 1;
    }
    count
}
