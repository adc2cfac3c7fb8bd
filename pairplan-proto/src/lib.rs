//! Shared definitions for `PairPlan`: the session/task domain model, the
//! document value model used by the document store, the mapping between the
//! two, and the store wire protocol.

pub mod mapping;
pub mod path;
pub mod session;
pub mod task;
pub mod value;
pub mod wire;
