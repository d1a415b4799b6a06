//! # Tag Arena Server Library
//!
//! This library provides the authoritative server for a real-time tag game:
//! one hunter chases several runners across a walled arena littered with
//! coins. The server owns the only mutable copy of the world and keeps every
//! client consistent with it over two channels.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The [`world::World`] is stepped on a fixed tick by the [`runner::Runner`].
//! Player input is only buffered between ticks and applied by the next
//! update, so a tick is the sole point where entity state changes.
//!
//! ### Change Propagation
//! Entity collections live in [`registry::EntityRegistry`] values that publish
//! every membership change. The [`room::Room`] turns those events into
//! reliable add/upd/del patches, and broadcasts a compact binary snapshot of
//! every person once per tick on the unreliable channel.
//!
//! ### Game Rules
//! - A runner touching a coin collects it; the coin set is regenerated as
//!   soon as the last coin is gone
//! - A runner touching the hunter swaps roles with it and respawns at the
//!   hunter spawn point
//! - Hunter speed shrinks as the arena fills up
//!
//! ## Module Organization
//!
//! - `physics`: physics backend seam and the bundled arcade backend
//! - `registry`: id-keyed collections with change subscriptions
//! - `entity`: persons, coins and walls
//! - `arena`: built-in layout and the static options sent to clients
//! - `world`: simulation state, movement and collision rules
//! - `runner`: fixed-timestep scheduler
//! - `room`: join/leave lifecycle, patch and snapshot emission
//! - `client_manager`: connection bookkeeping, implements the room transport
//! - `network`: TCP/UDP tasks and the actor loop owning the room
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::bind(&ServerConfig::default()).await?;
//!
//!     // Accepts connections, ticks the world at the configured rate and
//!     // broadcasts patches and snapshots until shut down
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod client_manager;
pub mod entity;
pub mod network;
pub mod physics;
pub mod registry;
pub mod room;
pub mod runner;
pub mod world;
