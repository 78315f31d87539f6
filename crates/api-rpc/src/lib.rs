//! JSON-RPC API Layer
//!
//! Exposes the jobs caller API (push, declare, destroy, pause, resume, list,
//! reset) as JSON-RPC 2.0 methods.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{shutdown, RpcServer, RpcServerConfig};
