//! Builds [`IndexData`] from live base node calls

use chrono::Utc;
use tracing::debug;

use super::{BlockSummary, ChainStats, IndexData};
use crate::refresh::{FetchError, Fetcher};
use crate::rpc::{HeaderSorting, NodeClient, RpcError};

/// Index-data provider backed by a [`NodeClient`]
#[derive(Debug, Clone)]
pub struct IndexProvider {
    client: NodeClient,
}

impl IndexProvider {
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &NodeClient {
        &self.client
    }

    /// Fetch `limit` headers ending `offset` blocks below the tip
    ///
    /// # Returns
    /// * `Ok(Some(IndexData))` - The assembled index
    /// * `Ok(None)` - The node has no chain metadata yet
    /// * `Err(RpcError)` - Any of the underlying calls failed
    pub async fn fetch_index(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Option<IndexData>, RpcError> {
        let tip = self.client.get_tip_info().await?;
        let Some(metadata) = tip.metadata else {
            debug!("Node reported no chain metadata");
            return Ok(None);
        };

        let tip_height = metadata.best_block_height;
        let blocks: Vec<BlockSummary> = match tip_height.checked_sub(offset) {
            Some(from_height) if limit > 0 => self
                .client
                .list_headers(from_height, limit, HeaderSorting::Descending)
                .await?
                .iter()
                .map(BlockSummary::from)
                .collect(),
            _ => Vec::new(),
        };
        let mempool = self.client.get_mempool_transactions().await?;

        let stats = ChainStats::from_window(tip_height, &blocks, mempool.len() as u64);
        Ok(Some(IndexData {
            tip: metadata,
            blocks,
            stats,
            fetched_at: Utc::now(),
        }))
    }

    /// Adapt this provider into the refresher's fetch collaborator
    pub fn into_fetcher(self) -> impl Fetcher<IndexData> {
        move |offset: u64, limit: u64| {
            let provider = self.clone();
            async move {
                provider
                    .fetch_index(offset, limit)
                    .await
                    .map_err(|err| Box::new(err) as FetchError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::{CycleOutcome, RefreshConfig, Refresher};
    use crate::rpc::testing::{spawn_fake_node, unreachable_client, Answer};
    use crate::rpc::PowAlgo;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn synced_node(method: &str, params: &Value) -> Answer {
        match method {
            "get_tip_info" => Ok(json!({
                "metadata": {
                    "best_block_height": 500,
                    "best_block_hash": "tip",
                    "timestamp": 1_700_000_240,
                },
                "initial_sync_achieved": true,
            })),
            "list_headers" => {
                let from = params["from_height"].as_u64().unwrap();
                let count = params["num_headers"].as_u64().unwrap();
                let headers: Vec<Value> = (0..count)
                    .map(|i| {
                        let height = from - i;
                        json!({
                            "height": height,
                            "hash": format!("h{}", height),
                            "prev_hash": format!("h{}", height - 1),
                            "timestamp": 1_700_000_000 + height * 120 - 500 * 120,
                            "pow_algo": if height % 2 == 0 { "sha3x" } else { "randomx" },
                            "num_kernels": 1,
                            "num_outputs": 2,
                        })
                    })
                    .collect();
                Ok(json!(headers))
            }
            "get_mempool_transactions" => Ok(json!([
                { "excess_sig": { "public_nonce": "n1", "signature": "s1" }, "fee": 100 },
                { "excess_sig": { "public_nonce": "n2", "signature": "s2" }, "fee": 250 },
            ])),
            other => Err((-32601, format!("unexpected method {}", other))),
        }
    }

    #[tokio::test]
    async fn test_fetch_index_builds_window_below_tip() {
        let node = spawn_fake_node(synced_node).await;
        let provider = IndexProvider::new(node.client.clone());

        let index = provider.fetch_index(10, 3).await.unwrap().unwrap();

        assert_eq!(index.tip.best_block_height, 500);
        let heights: Vec<u64> = index.blocks.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![490, 489, 488]);
        assert_eq!(index.stats.tip_height, 500);
        assert_eq!(index.stats.block_count, 3);
        assert_eq!(index.stats.average_block_time_secs, Some(120.0));
        assert_eq!(index.stats.mempool_size, 2);
        assert_eq!(index.stats.blocks_by_algo.get(&PowAlgo::Sha3x), Some(&2));
        assert_eq!(
            *node.methods.lock().unwrap(),
            vec!["get_tip_info", "list_headers", "get_mempool_transactions"]
        );
    }

    #[tokio::test]
    async fn test_fetch_index_without_metadata_is_empty() {
        let node = spawn_fake_node(|method: &str, _params: &Value| match method {
            "get_tip_info" => Ok(json!({ "metadata": null, "initial_sync_achieved": false })),
            other => Err((-32601, format!("unexpected method {}", other))),
        })
        .await;
        let provider = IndexProvider::new(node.client.clone());

        assert!(provider.fetch_index(0, 20).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offset_past_genesis_yields_no_blocks() {
        let node = spawn_fake_node(synced_node).await;
        let provider = IndexProvider::new(node.client.clone());

        let index = provider.fetch_index(501, 20).await.unwrap().unwrap();

        assert!(index.blocks.is_empty());
        assert!(!node
            .methods
            .lock()
            .unwrap()
            .contains(&"list_headers".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_index_propagates_rpc_errors() {
        let node = spawn_fake_node(|_method: &str, _params: &Value| {
            Err((-32000, "database locked".to_string()))
        })
        .await;
        let provider = IndexProvider::new(node.client.clone());

        let err = provider.fetch_index(0, 20).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_fetcher_feeds_refresher() {
        let node = spawn_fake_node(synced_node).await;
        let provider = IndexProvider::new(node.client.clone());
        let refresher = Refresher::new(RefreshConfig::default(), provider.into_fetcher());

        assert_eq!(
            refresher.run_cycle().await,
            CycleOutcome::Refreshed { attempts: 1 }
        );

        let snapshot = refresher.peek();
        let index = snapshot.payload.unwrap();
        assert_eq!(index.blocks.len(), 20);
        assert_eq!(index.blocks[0].height, 500);
    }

    #[tokio::test]
    async fn test_unreachable_node_exhausts_cycle() {
        let provider = IndexProvider::new(unreachable_client());
        let refresher = Refresher::new(
            RefreshConfig {
                max_attempts: 2,
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
            provider.into_fetcher(),
        );

        assert_eq!(
            refresher.run_cycle().await,
            CycleOutcome::Exhausted { attempts: 2 }
        );
        assert!(refresher.peek().payload.is_none());
        assert!(refresher
            .status()
            .last_error
            .unwrap()
            .starts_with("fetch failed: HTTP request failed"));
    }
}
