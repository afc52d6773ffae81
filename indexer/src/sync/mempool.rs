//! Message pool checker.
//!
//! Transactions submitted through the indexer are tracked as pending. The
//! node reports what happened to them in its message pool logs; anything
//! it rejected is marked failed, with the node's reason. Fragments that
//! make it into a block are picked up by chain sync instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::provider::NodeDataProvider;
use super::IndexerError;
use crate::crypto::{from_hex, Hash};
use crate::storage::StorageProcessor;

pub struct MempoolChecker {
    provider: Arc<dyn NodeDataProvider>,
    storage: Arc<dyn StorageProcessor>,
    interval: Duration,
}

impl MempoolChecker {
    pub fn new(
        provider: Arc<dyn NodeDataProvider>,
        storage: Arc<dyn StorageProcessor>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            storage,
            interval,
        }
    }

    /// One pass over the message pool logs. Returns how many pending
    /// transactions were marked failed.
    pub async fn check_once(&self) -> Result<usize, IndexerError> {
        let logs = self.provider.get_message_pool_logs().await?;

        let mut rejected: Vec<(Hash, String)> = Vec::new();
        for log in &logs {
            let Some(reason) = log.rejection() else {
                continue;
            };
            match from_hex(&log.fragment_id) {
                Some(hash) => rejected.push((hash, reason.to_string())),
                None => warn!(fragment = %log.fragment_id, "ignoring malformed fragment id"),
            }
        }
        debug!(entries = logs.len(), rejected = rejected.len(), "message pool checked");

        if rejected.is_empty() {
            return Ok(0);
        }
        Ok(self.storage.mark_failed(&rejected).await?)
    }

    /// Check every `interval` until shutdown or a storage failure.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        info!(interval_secs = self.interval.as_secs(), "message pool checker started");
        loop {
            match self.check_once().await {
                Ok(_) => {}
                Err(e) if !e.is_fatal() => warn!(error = %e, "message pool unavailable, retrying next cycle"),
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::model::{Block, Transaction, TxContext, TxStatus};
    use crate::storage::{IndexerDB, SledStorageProcessor};
    use crate::sync::provider::{FragmentLog, FragmentStatus, GenesisData, NodeStatus, TransportError};

    #[derive(Default)]
    struct PoolOnly {
        logs: Mutex<Option<Vec<FragmentLog>>>,
    }

    #[async_trait]
    impl NodeDataProvider for PoolOnly {
        async fn get_status(&self) -> Result<NodeStatus, TransportError> {
            Err(TransportError::NotFound("/status".into()))
        }

        async fn get_block_by_height(&self, _height: u64) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::NotFound("/height".into()))
        }

        async fn get_block(&self, _hash: &Hash) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::NotFound("/block".into()))
        }

        async fn get_epoch(&self, _epoch: u64) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::NotFound("/epoch".into()))
        }

        async fn get_genesis(&self, _hash: &str) -> Result<GenesisData, TransportError> {
            Ok(GenesisData::default())
        }

        async fn post_signed_tx(&self, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn get_message_pool_logs(&self) -> Result<Vec<FragmentLog>, TransportError> {
            self.logs.lock().clone().ok_or_else(|| TransportError::Request {
                url: "/fragment/logs".into(),
                reason: "connection refused".into(),
            })
        }
    }

    fn submitted(id: u8) -> Transaction {
        Transaction {
            id: [id; 32],
            inputs: Vec::new(),
            outputs: Vec::new(),
            certificate: None,
            body: vec![id],
            context: TxContext::default(),
            status: TxStatus::Pending,
        }
    }

    fn log(id: u8, status: FragmentStatus) -> FragmentLog {
        FragmentLog {
            fragment_id: hex::encode([id; 32]),
            status,
        }
    }

    fn checker(provider: &Arc<PoolOnly>) -> (MempoolChecker, IndexerDB, Arc<SledStorageProcessor>) {
        let db = IndexerDB::open_temporary().unwrap();
        let storage = Arc::new(SledStorageProcessor::new(db.clone()));
        let checker = MempoolChecker::new(
            provider.clone(),
            storage.clone(),
            Duration::from_millis(10),
        );
        (checker, db, storage)
    }

    #[tokio::test]
    async fn rejected_submissions_are_marked_failed() {
        let provider = Arc::new(PoolOnly::default());
        let (checker, db, storage) = checker(&provider);
        storage.store_pending_tx(submitted(1)).await.unwrap();
        storage.store_pending_tx(submitted(2)).await.unwrap();

        *provider.logs.lock() = Some(vec![
            log(1, FragmentStatus::Rejected { reason: "fee too low".into() }),
            log(2, FragmentStatus::Pending),
            log(3, FragmentStatus::Rejected { reason: "not ours".into() }),
            FragmentLog {
                fragment_id: "zz".into(),
                status: FragmentStatus::Rejected { reason: String::new() },
            },
        ]);

        assert_eq!(checker.check_once().await.unwrap(), 1);
        let failed = db.pending_transaction(&[1; 32]).unwrap().unwrap();
        assert_eq!(failed.tx.status, TxStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("fee too low"));
        assert_eq!(
            db.pending_transaction(&[2; 32]).unwrap().unwrap().tx.status,
            TxStatus::Pending
        );

        // The log keeps reporting the rejection; nothing changes twice.
        assert_eq!(checker.check_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn included_submission_is_not_failed_later() {
        let provider = Arc::new(PoolOnly::default());
        let (checker, db, storage) = checker(&provider);
        let tx = submitted(4);
        storage.store_pending_tx(tx.clone()).await.unwrap();

        let block = Block {
            hash: [0xb1; 32],
            prev_hash: [0; 32],
            epoch: 0,
            slot: Some(1),
            height: 1,
            is_epoch_boundary: false,
            time: Utc::now(),
            transactions: vec![Transaction {
                status: TxStatus::Success,
                ..tx
            }],
            update: None,
        };
        storage.commit_blocks(&[block]).await.unwrap();

        *provider.logs.lock() = Some(vec![log(4, FragmentStatus::Rejected { reason: "late".into() })]);
        assert_eq!(checker.check_once().await.unwrap(), 0);
        assert!(db.pending_transaction(&[4; 32]).unwrap().is_none());
        assert_eq!(
            db.transaction(&[4; 32]).unwrap().unwrap().tx.status,
            TxStatus::Success
        );
    }

    #[tokio::test]
    async fn unreachable_pool_is_retryable() {
        let provider = Arc::new(PoolOnly::default());
        let (checker, _db, _storage) = checker(&provider);
        let err = checker.check_once().await.unwrap_err();
        assert!(!err.is_fatal());

        let checker = Arc::new(checker);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(checker.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
