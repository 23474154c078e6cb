//! Autonomous peer agent.
//!
//! An agent bootstraps its local pieces, serves them to other agents,
//! periodically refreshes what its peers hold to decide whom to unchoke,
//! and downloads missing pieces rarest first until it holds the full set.
//! The transfer server, the choke loop and the acquisition loop coordinate
//! only through one lock-guarded [`AgentState`].

mod acquisition;
pub mod client;
mod scheduler;
mod server;
pub mod state;

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

pub use acquisition::DownloadOutcome;
pub use client::PeerClient;
use parking_lot::Mutex;
pub use state::AgentState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::AgentConfig;
use crate::piece::{PeerAddress, PieceSet};
use crate::selection::ChokeState;
use crate::storage::{PieceCountDescriptor, PieceStore, StorageError, split_file};
use crate::tracker::TrackerClient;
use crate::{Result, SwarmError};

/// Shared by the agent's background tasks.
pub(crate) struct AgentContext<S> {
    pub(crate) config: AgentConfig,
    /// Identity advertised to the tracker and other agents
    pub(crate) address: PeerAddress,
    pub(crate) state: Mutex<AgentState>,
    pub(crate) store: S,
    pub(crate) tracker: TrackerClient,
    pub(crate) peers: PeerClient,
}

/// A running peer agent.
///
/// The transfer server and the choke loop start with the agent and stop
/// when it is dropped. Acquisition runs only when [`PeerAgent::acquire`] or
/// [`PeerAgent::run`] is awaited.
pub struct PeerAgent<S: PieceStore + 'static> {
    context: Arc<AgentContext<S>>,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl<S: PieceStore + 'static> PeerAgent<S> {
    /// Bootstraps the agent and starts serving.
    ///
    /// The origin splits its source payload when one is configured and
    /// publishes the piece count. Every agent then loads its pieces, retrying
    /// while the store is empty, and non-origin agents wait for the piece
    /// count. Exhausting those retries is fatal to this agent only.
    ///
    /// # Errors
    ///
    /// - `SwarmError::BootstrapFailed` - If pieces or the piece count never appear
    /// - `SwarmError::Io` - If the transfer server cannot bind
    pub async fn start(config: AgentConfig, store: S) -> Result<Self> {
        let descriptor = PieceCountDescriptor::new(config.descriptor_path());
        let policy = config.bootstrap_policy();

        if config.origin
            && let Some(source) = &config.source
        {
            split_file(source, &store, config.piece_size)
                .await
                .map_err(|e| bootstrap_failed("splitting the source", e))?;
        }

        let pieces = policy
            .run("Loading local pieces", || load_pieces(&store))
            .await
            .map_err(|e| bootstrap_failed("loading local pieces", e))?;

        let total = if config.origin {
            let total = u32::try_from(pieces.len()).map_err(|_| SwarmError::BootstrapFailed {
                reason: format!("{} pieces exceed the id range", pieces.len()),
            })?;
            descriptor
                .publish(total)
                .await
                .map_err(|e| bootstrap_failed("publishing the piece count", e))?;
            total
        } else {
            descriptor
                .wait_for(policy)
                .await
                .map_err(|e| bootstrap_failed("reading the piece count", e))?
        };

        let listener = TcpListener::bind((config.host.as_str(), config.listen_port())).await?;
        let local_addr = listener.local_addr()?;
        let address = PeerAddress::new(config.host.clone(), local_addr.port());

        tracing::info!(
            "Peer {} listening on {} with {}/{} pieces",
            config.peer_id,
            local_addr,
            pieces.len(),
            total
        );

        let context = Arc::new(AgentContext {
            tracker: TrackerClient::new(config.tracker_address.clone(), config.tracker_timeout),
            peers: PeerClient::new(config.refresh_timeout, config.transfer_timeout),
            state: Mutex::new(AgentState::new(pieces, Some(total))),
            address,
            store,
            config,
        });

        let server = tokio::spawn(server::serve(listener, context.clone()));
        let scheduler = tokio::spawn(scheduler::run_choke_loop(context.clone()));

        Ok(Self {
            context,
            local_addr,
            server,
            scheduler,
        })
    }

    /// Runs the acquisition loop until this agent holds every piece.
    ///
    /// For the origin this never returns.
    pub async fn acquire(&self) {
        acquisition::run_acquisition(self.context.clone()).await;
    }

    /// Acquires, then keeps serving until the agent is dropped.
    pub async fn run(mut self) {
        self.acquire().await;
        if let Err(e) = (&mut self.server).await
            && !e.is_cancelled()
        {
            tracing::error!("Transfer server of peer {} stopped: {}", self.address(), e);
        }
    }

    /// Registers with the tracker and merges the peers it returns.
    ///
    /// # Errors
    ///
    /// Returns the tracker exchange error.
    pub async fn sync_with_tracker(&self) -> Result<()> {
        acquisition::sync_with_tracker(&self.context).await
    }

    /// Runs one choke scheduling round immediately.
    pub async fn schedule_now(&self) -> ChokeState {
        scheduler::run_round(&self.context).await
    }

    /// Makes one download attempt against `peer`.
    ///
    /// # Errors
    ///
    /// Returns the network, protocol or storage error that aborted the attempt.
    pub async fn try_download(&self, peer: &PeerAddress) -> Result<DownloadOutcome> {
        acquisition::try_download(&self.context, peer).await
    }

    /// Identity advertised to the tracker.
    pub fn address(&self) -> &PeerAddress {
        &self.context.address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &S {
        &self.context.store
    }

    pub fn pieces(&self) -> PieceSet {
        self.context.state.lock().pieces.clone()
    }

    pub fn total(&self) -> Option<u32> {
        self.context.state.lock().total
    }

    pub fn is_complete(&self) -> bool {
        self.context.state.lock().is_complete()
    }

    pub fn known_peers(&self) -> BTreeSet<PeerAddress> {
        self.context.state.lock().known_peers.clone()
    }

    pub fn peer_knowledge(&self) -> HashMap<PeerAddress, PieceSet> {
        self.context.state.lock().peer_pieces.clone()
    }

    pub fn choke_state(&self) -> ChokeState {
        self.context.state.lock().choke.clone()
    }
}

impl<S: PieceStore + 'static> Drop for PeerAgent<S> {
    fn drop(&mut self) {
        self.server.abort();
        self.scheduler.abort();
    }
}

async fn load_pieces<S>(store: &S) -> std::result::Result<PieceSet, StorageError>
where
    S: PieceStore,
{
    let pieces = store.list_pieces().await?;
    if pieces.is_empty() {
        return Err(StorageError::EmptyStore {
            location: "local piece store".to_string(),
        });
    }
    Ok(pieces)
}

fn bootstrap_failed(step: &str, error: StorageError) -> SwarmError {
    tracing::error!("Bootstrap failed while {}: {}", step, error);
    SwarmError::BootstrapFailed {
        reason: format!("{step}: {error}"),
    }
}
