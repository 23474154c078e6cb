//! End-to-end scenarios with a real tracker and agents on ephemeral ports.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use minibit_core::storage::{seed_pieces, split_file};
use minibit_core::{
    AgentConfig, DownloadOutcome, FilePieceStore, PeerAddress, PeerAgent, PieceCountDescriptor,
    PieceId, PieceSet, PieceStore, Registry, TrackerClient, TrackerConfig, TrackerServer,
};
use tempfile::TempDir;

fn ids(raw: impl IntoIterator<Item = u32>) -> PieceSet {
    raw.into_iter().map(PieceId::new).collect()
}

async fn start_tracker() -> String {
    start_tracker_with_registry().await.0
}

async fn start_tracker_with_registry() -> (String, Arc<Registry>) {
    let config = TrackerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        io_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let registry = Arc::new(Registry::new(&config));
    let server = TrackerServer::bind(&config, registry.clone()).await.unwrap();
    let address = server.local_addr().unwrap().to_string();
    tokio::spawn(server.serve());
    (address, registry)
}

/// Writes `pieces` (each filled with its own id) into peer `peer_id`'s store.
async fn seed(root: &Path, peer_id: u16, pieces: &[u32]) -> FilePieceStore {
    let store = FilePieceStore::for_peer(root, peer_id);
    for &index in pieces {
        store
            .write_piece(PieceId::new(index), &piece_bytes(index))
            .await
            .unwrap();
    }
    store
}

fn piece_bytes(index: u32) -> Vec<u8> {
    vec![index as u8; 64]
}

async fn start_agent(
    root: &Path,
    peer_id: u16,
    tracker: &str,
    store: FilePieceStore,
) -> PeerAgent<FilePieceStore> {
    let config = AgentConfig::for_testing(peer_id, root.to_path_buf(), tracker.to_string());
    PeerAgent::start(config, store).await.unwrap()
}

#[tokio::test]
async fn test_unregistered_requester_discovers_registered_peer() {
    let (tracker, registry) = start_tracker_with_registry().await;
    let client = TrackerClient::new(tracker, Duration::from_secs(2));

    client.register(6101, &ids([0, 1])).await.unwrap();

    for requester in [Some(6102), None] {
        let payload = client.discover(requester).await.unwrap();
        assert_eq!(payload.peers, vec![PeerAddress::new("127.0.0.1", 6101)]);
        assert_eq!(payload.suggested_pieces, vec![PieceId::new(0), PieceId::new(1)]);
    }

    // Discovery alone never registers the requester
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.pieces_of(&PeerAddress::new("127.0.0.1", 6102)),
        None
    );
}

#[tokio::test]
async fn test_origin_stays_resident_while_complete_leecher_finishes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let tracker = start_tracker().await;

    let origin = start_agent(root, 0, &tracker, seed(root, 0, &[0, 1, 2]).await).await;
    let leecher = start_agent(root, 1, &tracker, seed(root, 1, &[0, 1, 2]).await).await;
    assert_eq!(leecher.total(), Some(3));

    tokio::time::timeout(Duration::from_secs(2), leecher.acquire())
        .await
        .expect("complete leecher kept acquiring");
    let expected: Vec<u8> = (0..3).flat_map(piece_bytes).collect();
    assert_eq!(std::fs::read(leecher.store().output()).unwrap(), expected);

    let resident = tokio::time::timeout(Duration::from_millis(300), origin.acquire()).await;
    assert!(resident.is_err(), "origin stopped acquiring");

    let payload = TrackerClient::new(tracker, Duration::from_secs(2))
        .discover(None)
        .await
        .unwrap();
    assert!(payload.peers.contains(origin.address()));
    assert!(payload.peers.contains(leecher.address()));
}

#[tokio::test]
async fn test_rarest_piece_downloaded_from_unchoked_holder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    PieceCountDescriptor::new(root.join("piece_count"))
        .publish(4)
        .await
        .unwrap();
    let tracker = start_tracker().await;

    let holder = start_agent(root, 1, &tracker, seed(root, 1, &[2]).await).await;
    let other = start_agent(root, 2, &tracker, seed(root, 2, &[0, 1]).await).await;
    let agent = start_agent(root, 3, &tracker, seed(root, 3, &[0, 1, 3]).await).await;

    holder.sync_with_tracker().await.unwrap();
    other.sync_with_tracker().await.unwrap();
    agent.sync_with_tracker().await.unwrap();
    assert_eq!(
        agent.known_peers(),
        [holder.address().clone(), other.address().clone()]
            .into_iter()
            .collect()
    );

    let choke = agent.schedule_now().await;
    assert!(choke.is_unchoked(holder.address()));
    assert_eq!(
        agent.peer_knowledge().get(holder.address()),
        Some(&ids([2]))
    );

    let outcome = agent.try_download(other.address()).await.unwrap();
    assert_eq!(outcome, DownloadOutcome::NothingAvailable);

    let outcome = agent.try_download(holder.address()).await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Downloaded(PieceId::new(2)));

    // Stored copy is byte-identical to the server's
    let served = holder.store().read_piece(PieceId::new(2)).await.unwrap();
    let received = agent.store().read_piece(PieceId::new(2)).await.unwrap();
    assert_eq!(served, received);

    assert!(agent.is_complete());
    let expected: Vec<u8> = (0..4).flat_map(piece_bytes).collect();
    assert_eq!(std::fs::read(agent.store().output()).unwrap(), expected);
}

#[tokio::test]
async fn test_choked_peer_aborts_attempt() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    PieceCountDescriptor::new(root.join("piece_count"))
        .publish(2)
        .await
        .unwrap();
    let tracker = start_tracker().await;

    let holder = start_agent(root, 1, &tracker, seed(root, 1, &[1]).await).await;
    let mut config = AgentConfig::for_testing(2, root.to_path_buf(), tracker.clone());
    config.choke_interval = Duration::from_secs(3600);
    let agent = PeerAgent::start(config, seed(root, 2, &[0]).await)
        .await
        .unwrap();
    // Let the immediate first round run while nobody is known
    tokio::time::sleep(Duration::from_millis(20)).await;

    holder.sync_with_tracker().await.unwrap();
    agent.sync_with_tracker().await.unwrap();

    // No round has run since the peer became known, so it is still choked
    let outcome = agent.try_download(holder.address()).await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Choked);
    assert_eq!(agent.pieces(), ids([0]));
}

#[tokio::test]
async fn test_unreachable_peer_forgotten_after_refresh() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    PieceCountDescriptor::new(root.join("piece_count"))
        .publish(3)
        .await
        .unwrap();
    let tracker = start_tracker().await;

    let stays = start_agent(root, 1, &tracker, seed(root, 1, &[0]).await).await;
    let leaves = start_agent(root, 2, &tracker, seed(root, 2, &[1]).await).await;
    let agent = start_agent(root, 3, &tracker, seed(root, 3, &[2]).await).await;

    stays.sync_with_tracker().await.unwrap();
    leaves.sync_with_tracker().await.unwrap();
    agent.sync_with_tracker().await.unwrap();
    agent.schedule_now().await;
    let departed = leaves.address().clone();
    assert!(agent.peer_knowledge().contains_key(&departed));

    drop(leaves);
    tokio::time::sleep(Duration::from_millis(100)).await;
    agent.schedule_now().await;

    assert!(!agent.known_peers().contains(&departed));
    assert!(!agent.peer_knowledge().contains_key(&departed));
    assert!(!agent.choke_state().is_unchoked(&departed));
    assert!(agent.known_peers().contains(stays.address()));
}

#[tokio::test]
async fn test_swarm_completes_and_reconstructs_everywhere() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let source = root.join("payload.bin");
    let payload: Vec<u8> = (0..4000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&source, &payload).unwrap();
    let tracker = start_tracker().await;

    let origin_store = FilePieceStore::for_peer(root, 0);
    let total = split_file(&source, &origin_store, 256).await.unwrap();
    assert_eq!(total, 16);
    let origin = start_agent(root, 0, &tracker, origin_store).await;
    origin.sync_with_tracker().await.unwrap();

    let mut leechers = Vec::new();
    for (peer_id, pieces) in [(1u16, ids([0, 5])), (2, ids([9])), (3, ids([3, 4, 15]))] {
        let store = FilePieceStore::for_peer(root, peer_id);
        seed_pieces(origin.store(), &store, &pieces).await.unwrap();
        leechers.push(start_agent(root, peer_id, &tracker, store).await);
    }

    let runs = leechers.iter().map(|agent| async move {
        let watch = async {
            let mut seen = agent.pieces();
            while !agent.is_complete() {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let now = agent.pieces();
                assert!(now.is_superset(&seen), "piece set shrank");
                seen = now;
            }
        };
        tokio::join!(agent.acquire(), watch);
    });
    tokio::time::timeout(Duration::from_secs(30), futures::future::join_all(runs))
        .await
        .expect("swarm did not complete in time");

    for agent in &leechers {
        assert!(agent.is_complete());
        let output = agent.store().output();
        assert_eq!(std::fs::read(output).unwrap(), payload);

        // Reconstructing again rewrites the same artifact
        assert!(agent.store().reconstruct(total).await.unwrap());
        assert_eq!(std::fs::read(output).unwrap(), payload);
    }
}
