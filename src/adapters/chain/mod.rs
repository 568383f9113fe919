//! Chain Adapters - Blockchain Node Pool
//!
//! Implements the `NodePool` port over JSON-RPC node endpoints.

pub mod rpc_pool;

pub use rpc_pool::{BlockchainInfo, JsonRpcNodePool, NodePoolConfig};
