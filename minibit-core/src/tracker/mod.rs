//! Discovery tracker.
//!
//! The tracker keeps a directory of which peers hold which pieces. Agents
//! register their listen port and pieces, ask for a sample of other peers,
//! and get the pieces that are rarest across the whole swarm as hints.

pub mod client;
pub mod registry;
pub mod server;

pub use client::TrackerClient;
pub use registry::Registry;
pub use server::{TrackerServer, handle_request};
