//! Per-process client construction.
//!
//! Credentials and region resolve once into a shared SDK config; every
//! service client is built from it explicitly. Nothing here is global or
//! lazily initialized behind the caller's back.

use std::sync::Arc;
use std::time::Instant;

use aws_config::BehaviorVersion;
use aws_config::Region;
use awsprim_blob::BlobStore;
use awsprim_blob::BlobStoreConfig;
use awsprim_blob::TransferConfig;
use awsprim_core::ToolConfig;
use awsprim_messaging::SnsTopics;
use awsprim_messaging::SqsQueues;
use awsprim_store::dynamo::DynamoConfig;
use awsprim_store::DynamoItemStore;
use awsprim_store::TableAdmin;

/// Resolved configuration plus the shared SDK config.
pub struct ToolContext {
    pub config: ToolConfig,
    /// Absolute deadline derived from `--timeout` at startup.
    pub deadline: Option<Instant>,
    sdk_config: aws_config::SdkConfig,
}

impl ToolContext {
    /// Resolve credentials/region once and build the context.
    pub async fn connect(config: ToolConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        let deadline = config.timeout.map(|t| Instant::now() + t);
        Self {
            config,
            deadline,
            sdk_config,
        }
    }

    /// The coordination-table item store.
    pub fn item_store(&self) -> Arc<DynamoItemStore> {
        Arc::new(DynamoItemStore::new(&self.sdk_config, DynamoConfig {
            table: self.config.table.clone(),
            region: self.config.region.clone(),
            endpoint: None,
            timeout: self.config.timeout,
        }))
    }

    /// Table administration over the same client.
    pub fn table_admin(&self) -> TableAdmin {
        let store = DynamoItemStore::new(&self.sdk_config, DynamoConfig {
            table: self.config.table.clone(),
            region: self.config.region.clone(),
            endpoint: None,
            timeout: self.config.timeout,
        });
        TableAdmin::new(store.client().clone(), self.config.table.clone())
    }

    /// The object store.
    pub fn blob_store(&self) -> BlobStore {
        BlobStore::new(&self.sdk_config, BlobStoreConfig {
            region: self.config.region.clone(),
            endpoint: None,
            timeout: None, // the transfer engine enforces the deadline itself
        })
    }

    /// Transfer-engine knobs from the resolved configuration.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            multipart_threshold: self.config.multipart_threshold,
            chunk_size: self.config.chunk_size,
            concurrency: self.config.max_concurrency,
            deadline: self.deadline,
        }
    }

    /// The topic service.
    pub fn topics(&self) -> SnsTopics {
        SnsTopics::new(&self.sdk_config)
    }

    /// The message-queue service.
    pub fn queues(&self) -> SqsQueues {
        SqsQueues::new(&self.sdk_config)
    }
}
