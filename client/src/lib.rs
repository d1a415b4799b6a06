//! # Tag Arena Client Library
//!
//! Headless client for the tag arena. It keeps a local mirror of the
//! server's person and coin collections, buffers binary snapshots from the
//! unreliable channel and samples person positions a few ticks in the past
//! so movement stays smooth despite jitter and loss.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Scripted key holding. Only key transitions go over the wire.
//!
//! ### Interpolation Module (`interpolation`)
//! Time-ordered snapshot buffer with linear sampling between the two
//! snapshots bracketing the render time.
//!
//! ### Reconciler Module (`reconciler`)
//! Applies `init` and `add`/`upd`/`del` patches to the mirror, tracks the
//! server clock offset and merges sampled positions with mirrored roles and
//! animations into a [`reconciler::RenderState`].
//!
//! ### Network Module (`network`)
//! TCP stream for reliable messages, UDP socket for snapshots, and the
//! session loop tying input, reconciliation and sampling together.

pub mod input;
pub mod interpolation;
pub mod network;
pub mod reconciler;
