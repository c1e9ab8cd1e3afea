//! Index data served on the explorer's front page
//!
//! The index is a window of recent block summaries plus aggregate statistics
//! over that window. It is what the background refresher keeps cached.

pub mod provider;

pub use provider::IndexProvider;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rpc::{BlockHeader, ChainMetadata, PowAlgo};

/// Cached summary of the chain tip and the most recent blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexData {
    /// Tip as reported by the node when this index was built
    pub tip: ChainMetadata,
    /// Newest block first
    pub blocks: Vec<BlockSummary>,
    pub stats: ChainStats,
    /// When this data was fetched
    pub fetched_at: DateTime<Utc>,
}

/// One row of the recent-blocks table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub pow_algo: PowAlgo,
    pub num_kernels: u64,
    pub num_outputs: u64,
}

impl From<&BlockHeader> for BlockSummary {
    fn from(header: &BlockHeader) -> Self {
        Self {
            height: header.height,
            hash: header.hash.clone(),
            timestamp: unix_to_utc(header.timestamp),
            pow_algo: header.pow_algo,
            num_kernels: header.num_kernels,
            num_outputs: header.num_outputs,
        }
    }
}

/// Aggregates over the block window of an [`IndexData`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub tip_height: u64,
    /// Number of blocks in the window
    pub block_count: u64,
    /// Mean seconds between consecutive blocks, if the window has at least two
    pub average_block_time_secs: Option<f64>,
    pub total_kernels: u64,
    pub total_outputs: u64,
    /// Blocks per mining algorithm
    pub blocks_by_algo: BTreeMap<PowAlgo, u64>,
    /// Transactions waiting in the node's mempool
    pub mempool_size: u64,
}

impl ChainStats {
    /// Compute statistics over `blocks`, in any order
    pub fn from_window(tip_height: u64, blocks: &[BlockSummary], mempool_size: u64) -> Self {
        let mut blocks_by_algo = BTreeMap::new();
        for block in blocks {
            *blocks_by_algo.entry(block.pow_algo).or_insert(0) += 1;
        }

        let average_block_time_secs = match (
            blocks.iter().map(|b| b.timestamp).min(),
            blocks.iter().map(|b| b.timestamp).max(),
        ) {
            (Some(oldest), Some(newest)) if blocks.len() > 1 => {
                let span = (newest - oldest).num_milliseconds() as f64 / 1000.0;
                Some(span / (blocks.len() - 1) as f64)
            }
            _ => None,
        };

        Self {
            tip_height,
            block_count: blocks.len() as u64,
            average_block_time_secs,
            total_kernels: blocks.iter().map(|b| b.num_kernels).sum(),
            total_outputs: blocks.iter().map(|b| b.num_outputs).sum(),
            blocks_by_algo,
            mempool_size,
        }
    }
}

/// Convert unix seconds to UTC, clamping out-of-range values to the epoch
fn unix_to_utc(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}
