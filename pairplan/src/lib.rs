//! `PairPlan` shared weekly planner client library.

pub mod config;
pub mod identity;
pub mod notify;
pub mod recent;
pub mod registry;
pub mod session;
pub mod state;
pub mod store;
pub mod tasks;
