//! `PairPlan` document store library.
//!
//! Exposes the in-memory engine for in-process use and the WebSocket server
//! for use in tests and embedding.

pub mod config;
pub mod engine;
pub mod server;
