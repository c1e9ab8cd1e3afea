//! Base node RPC access
//!
//! Everything the explorer knows about the chain comes through [`NodeClient`].

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{NodeClient, RpcError};
pub use types::{
    Block, BlockHeader, ChainMetadata, HeaderSorting, KernelSignature, MempoolTransaction,
    PaymentReferenceMatch, PowAlgo, TipInfo, ValidatorNode, VersionInfo,
};
