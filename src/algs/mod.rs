//! Runtime algorithms: transport, pass tables, and the exchange engine.

pub mod communicator;
pub mod diagnostics;
pub mod exchange;
pub mod passes;
pub mod wire;

pub use exchange::{exchange_id_d, exchange_node_d, exchange_node_f, exchange_snode_f};
