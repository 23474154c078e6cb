//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use minibit_core::storage::{plan_distribution, seed_pieces, split_file};
use minibit_core::{
    AgentConfig, FilePieceStore, PeerAgent, PieceStore, Registry, SwarmConfig, SwarmError,
    TrackerServer,
};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the discovery tracker
    Tracker {
        /// Address to bind to
        #[arg(long)]
        bind: Option<String>,
        /// Forget peers not heard from for this many seconds
        #[arg(long)]
        peer_ttl: Option<u64>,
    },
    /// Run one peer agent
    Peer {
        /// Agent identity; selects the listen port and storage directory
        id: u16,
        /// Tracker address
        #[arg(long)]
        tracker: Option<String>,
        /// Storage root shared by the swarm
        #[arg(long)]
        root: Option<PathBuf>,
        /// Listen port is this base plus the agent id
        #[arg(long)]
        port_base: Option<u16>,
        /// This agent originates the content
        #[arg(long)]
        origin: bool,
        /// Payload the origin splits at startup
        #[arg(long, requires = "origin")]
        source: Option<PathBuf>,
        /// Piece size in bytes when splitting
        #[arg(long)]
        piece_size: Option<usize>,
    },
    /// Split a file into numbered pieces
    Split {
        /// File to split
        source: PathBuf,
        /// Directory receiving the pieces
        dir: PathBuf,
        /// Piece size in bytes
        #[arg(long, default_value = "1024")]
        piece_size: usize,
    },
    /// Copy random subsets of the origin's pieces to the other agents
    Distribute {
        /// Storage root shared by the swarm
        #[arg(long)]
        root: Option<PathBuf>,
        /// Total number of agents, origin included
        #[arg(long, default_value = "4")]
        peers: u16,
        /// Fewest pieces an agent receives
        #[arg(long, default_value = "1")]
        min: usize,
        /// Most pieces an agent receives
        #[arg(long, default_value = "10")]
        max: usize,
    },
    /// Split, pre-seed, and run a tracker plus every agent in this process
    Swarm {
        /// Payload to distribute
        #[arg(long)]
        source: PathBuf,
        /// Total number of agents, origin included
        #[arg(long, default_value = "4")]
        peers: u16,
        /// Storage root shared by the swarm
        #[arg(long)]
        root: Option<PathBuf>,
        /// Piece size in bytes
        #[arg(long, default_value = "1024")]
        piece_size: usize,
    },
}

impl Commands {
    /// Name of the process role, used for the log file.
    pub fn role(&self) -> String {
        match self {
            Commands::Tracker { .. } => "tracker".to_string(),
            Commands::Peer { id, .. } => format!("peer-{id}"),
            Commands::Split { .. } => "split".to_string(),
            Commands::Distribute { .. } => "distribute".to_string(),
            Commands::Swarm { .. } => "swarm".to_string(),
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let mut config = SwarmConfig::from_env();

    match command {
        Commands::Tracker { bind, peer_ttl } => {
            if let Some(bind) = bind {
                config.tracker.bind_address = bind;
            }
            config.tracker.peer_ttl = peer_ttl.map(Duration::from_secs);
            run_tracker(config).await
        }
        Commands::Peer {
            id,
            tracker,
            root,
            port_base,
            origin,
            source,
            piece_size,
        } => {
            let agent = &mut config.agent;
            agent.peer_id = id;
            agent.origin = origin;
            agent.source = source;
            if let Some(tracker) = tracker {
                agent.tracker_address = tracker;
            }
            if let Some(root) = root {
                agent.storage_root = root;
            }
            if let Some(port_base) = port_base {
                agent.port_base = port_base;
            }
            if let Some(piece_size) = piece_size {
                agent.piece_size = piece_size;
            }
            run_peer(config.agent).await
        }
        Commands::Split {
            source,
            dir,
            piece_size,
        } => {
            let store = FilePieceStore::new(&dir, dir.join("reconstructed.bin"));
            let total = split_file(&source, &store, piece_size)
                .await
                .with_context(|| format!("splitting {}", source.display()))?;
            println!("Split {} into {} pieces in {}", source.display(), total, dir.display());
            Ok(())
        }
        Commands::Distribute {
            root,
            peers,
            min,
            max,
        } => {
            let root = root.unwrap_or(config.agent.storage_root);
            distribute(&root, peers, min, max).await
        }
        Commands::Swarm {
            source,
            peers,
            root,
            piece_size,
        } => {
            if let Some(root) = root {
                config.agent.storage_root = root;
            }
            config.agent.piece_size = piece_size;
            run_swarm(config, source, peers).await
        }
    }
}

async fn run_tracker(config: SwarmConfig) -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new(&config.tracker));
    let server = TrackerServer::bind(&config.tracker, registry)
        .await
        .with_context(|| format!("binding tracker to {}", config.tracker.bind_address))?;

    tokio::select! {
        () = server.serve() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Tracker shutting down"),
    }
    Ok(())
}

async fn run_peer(config: AgentConfig) -> anyhow::Result<()> {
    let store = FilePieceStore::for_peer(&config.storage_root, config.peer_id);
    let peer_id = config.peer_id;

    let agent = match PeerAgent::start(config, store).await {
        Ok(agent) => agent,
        Err(SwarmError::BootstrapFailed { reason }) => {
            tracing::error!("Peer {} exiting: {}", peer_id, reason);
            return Ok(());
        }
        Err(e) => return Err(e).context("starting peer agent"),
    };

    tokio::select! {
        () = agent.run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Peer {} shutting down", peer_id),
    }
    Ok(())
}

async fn distribute(root: &std::path::Path, peers: u16, min: usize, max: usize) -> anyhow::Result<()> {
    let origin = FilePieceStore::for_peer(root, 0);
    let available = origin
        .list_pieces()
        .await
        .context("listing origin pieces")?;
    anyhow::ensure!(
        !available.is_empty(),
        "origin store {} holds no pieces",
        origin.directory().display()
    );

    let targets = usize::from(peers.saturating_sub(1));
    let plan = plan_distribution(&available, targets, min, max, &mut rand::rng());

    for (peer_id, pieces) in (1..peers).zip(plan) {
        let target = FilePieceStore::for_peer(root, peer_id);
        seed_pieces(&origin, &target, &pieces)
            .await
            .with_context(|| format!("seeding peer {peer_id}"))?;
        tracing::info!("Peer {} received {} pieces: {:?}", peer_id, pieces.len(), pieces);
    }
    Ok(())
}

async fn run_swarm(config: SwarmConfig, source: PathBuf, peers: u16) -> anyhow::Result<()> {
    anyhow::ensure!(peers >= 1, "a swarm needs at least one agent");
    let root = config.agent.storage_root.clone();

    let origin_store = FilePieceStore::for_peer(&root, 0);
    let total = split_file(&source, &origin_store, config.agent.piece_size)
        .await
        .with_context(|| format!("splitting {}", source.display()))?;
    let max = usize::try_from(total).unwrap_or(usize::MAX);
    distribute(&root, peers, 1, max.max(1) / 2 + 1).await?;

    let registry = Arc::new(Registry::new(&config.tracker));
    let tracker = TrackerServer::bind(&config.tracker, registry)
        .await
        .context("binding tracker")?;
    let tracker_address = tracker.local_addr()?.to_string();
    let tracker_task = tokio::spawn(tracker.serve());

    let mut agents = Vec::new();
    for peer_id in 0..peers {
        let agent_config = AgentConfig {
            peer_id,
            origin: peer_id == 0,
            tracker_address: tracker_address.clone(),
            ..config.agent.clone()
        };
        let store = FilePieceStore::for_peer(&root, peer_id);
        match PeerAgent::start(agent_config, store).await {
            Ok(agent) => agents.push(tokio::spawn(agent.run())),
            Err(e) => tracing::error!("Peer {} did not start: {}", peer_id, e),
        }
    }

    tracing::info!("Swarm of {} agents running, press Ctrl-C to stop", agents.len());
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down swarm");
    for agent in agents {
        agent.abort();
    }
    tracker_task.abort();
    Ok(())
}
