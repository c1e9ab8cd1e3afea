//! Wire types returned by the base node's JSON-RPC interface

use serde::{Deserialize, Serialize};

/// Node software version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub network: Option<String>,
}

/// Response of `get_tip_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipInfo {
    /// Absent while the node has no chain state to report (e.g. still syncing from genesis)
    #[serde(default)]
    pub metadata: Option<ChainMetadata>,
    #[serde(default)]
    pub initial_sync_achieved: bool,
}

/// Summary of the node's best chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub best_block_height: u64,
    pub best_block_hash: String,
    #[serde(default)]
    pub pruned_height: u64,
    #[serde(default)]
    pub accumulated_difficulty: String,
    /// Unix seconds of the tip block
    pub timestamp: u64,
}

/// Proof-of-work algorithm a block was mined with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PowAlgo {
    RandomX,
    Sha3x,
    Unknown,
}

impl From<String> for PowAlgo {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "randomx" => PowAlgo::RandomX,
            "sha3x" | "sha3" => PowAlgo::Sha3x,
            _ => PowAlgo::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    /// Unix seconds
    pub timestamp: u64,
    pub pow_algo: PowAlgo,
    #[serde(default)]
    pub num_kernels: u64,
    #[serde(default)]
    pub num_outputs: u64,
}

/// Order of headers returned by `list_headers`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderSorting {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub commitment: String,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionKernel {
    pub excess: String,
    pub excess_sig: KernelSignature,
    pub fee: u64,
    #[serde(default)]
    pub lock_height: u64,
}

/// Schnorr signature identifying a kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSignature {
    pub public_nonce: String,
    pub signature: String,
}

/// Full block as returned by `get_blocks` and the search calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub inputs: Vec<TransactionInput>,
    #[serde(default)]
    pub outputs: Vec<TransactionOutput>,
    #[serde(default)]
    pub kernels: Vec<TransactionKernel>,
}

/// Unconfirmed transaction in the node's mempool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTransaction {
    pub excess_sig: KernelSignature,
    pub fee: u64,
    #[serde(default)]
    pub weight: u64,
}

/// Output located through `search_payment_references`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReferenceMatch {
    pub payment_reference: String,
    pub block_height: u64,
    pub block_hash: String,
    pub commitment: String,
    #[serde(default)]
    pub mined_timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorNode {
    pub public_key: String,
    pub shard_key: String,
}
