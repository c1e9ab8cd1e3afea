//! blockscope library
//!
//! Read-only block explorer: a background refresher keeps a summary of the
//! chain cached in memory, and HTTP routes serve it alongside pass-through
//! views of the base node.

pub mod cli;
pub mod data;
pub mod refresh;
pub mod rpc;
pub mod server;
