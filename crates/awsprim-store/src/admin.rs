//! Table administration: create, drop, describe.
//!
//! The coordination table has a `PK`/`SK` string key schema, pay-per-request
//! billing, TTL on the `ttl` attribute, and the `type-index` secondary
//! index on `(type, updated_at)` for cross-collection enumeration.

use std::time::Duration;

use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::AttributeDefinition;
use aws_sdk_dynamodb::types::BillingMode;
use aws_sdk_dynamodb::types::GlobalSecondaryIndex;
use aws_sdk_dynamodb::types::KeySchemaElement;
use aws_sdk_dynamodb::types::KeyType;
use aws_sdk_dynamodb::types::Projection;
use aws_sdk_dynamodb::types::ProjectionType;
use aws_sdk_dynamodb::types::ScalarAttributeType;
use aws_sdk_dynamodb::types::TimeToLiveSpecification;
use aws_sdk_dynamodb::Client;
use tracing::debug;
use tracing::info;

use crate::dynamo::TYPE_INDEX_NAME;
use crate::error::StoreError;

/// How long to wait for a new table to become ACTIVE.
const CREATE_WAIT: Duration = Duration::from_secs(120);
/// Poll interval while waiting for table state changes.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Summary of a described table.
#[derive(Debug, Clone)]
pub struct TableSummary {
    pub table: String,
    pub status: String,
    pub item_count: i64,
    pub size_bytes: i64,
    pub billing_mode: String,
    pub ttl_enabled: bool,
    pub type_index_status: Option<String>,
}

/// Table administration operations.
pub struct TableAdmin {
    client: Client,
    table: String,
}

impl TableAdmin {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn classify<E>(&self, err: &SdkError<E>) -> StoreError
    where
        E: ProvideErrorMetadata + std::fmt::Debug,
    {
        match err {
            SdkError::ServiceError(ctx) => {
                let code = ctx.err().code().unwrap_or_default();
                let message = ctx.err().message().unwrap_or("no detail").to_string();
                match code {
                    "ResourceNotFoundException" => StoreError::TableMissing {
                        table: self.table.clone(),
                    },
                    "ResourceInUseException" => StoreError::Conflict { message },
                    "AccessDeniedException" => StoreError::Forbidden { message },
                    "ThrottlingException" | "LimitExceededException" => {
                        StoreError::Throttled { message }
                    }
                    other => StoreError::Service {
                        message: format!("{other}: {message}"),
                    },
                }
            }
            other => StoreError::Service {
                message: format!("{other:?}"),
            },
        }
    }

    /// Create the table and block until it is ACTIVE with TTL enabled.
    ///
    /// Fails with `Conflict` when the table already exists.
    pub async fn create(&self) -> Result<TableSummary, StoreError> {
        let string_attr = |name: &str| {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| StoreError::InvalidRequest {
                    message: format!("attribute definition: {e}"),
                })
        };
        let number_attr = |name: &str| {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::N)
                .build()
                .map_err(|e| StoreError::InvalidRequest {
                    message: format!("attribute definition: {e}"),
                })
        };
        let key = |name: &str, key_type: KeyType| {
            KeySchemaElement::builder()
                .attribute_name(name)
                .key_type(key_type)
                .build()
                .map_err(|e| StoreError::InvalidRequest {
                    message: format!("key schema: {e}"),
                })
        };

        let type_index = GlobalSecondaryIndex::builder()
            .index_name(TYPE_INDEX_NAME)
            .key_schema(key("type", KeyType::Hash)?)
            .key_schema(key("updated_at", KeyType::Range)?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .build()
            .map_err(|e| StoreError::InvalidRequest {
                message: format!("index definition: {e}"),
            })?;

        self.client
            .create_table()
            .table_name(&self.table)
            .attribute_definitions(string_attr("PK")?)
            .attribute_definitions(string_attr("SK")?)
            .attribute_definitions(string_attr("type")?)
            .attribute_definitions(number_attr("updated_at")?)
            .key_schema(key("PK", KeyType::Hash)?)
            .key_schema(key("SK", KeyType::Range)?)
            .global_secondary_indexes(type_index)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        info!(table = %self.table, "table created, waiting for ACTIVE");
        self.wait_until_active().await?;

        // TTL can only be enabled once the table is ACTIVE.
        self.client
            .update_time_to_live()
            .table_name(&self.table)
            .time_to_live_specification(
                TimeToLiveSpecification::builder()
                    .attribute_name("ttl")
                    .enabled(true)
                    .build()
                    .map_err(|e| StoreError::InvalidRequest {
                        message: format!("ttl specification: {e}"),
                    })?,
            )
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        self.describe().await
    }

    /// Delete the table.
    pub async fn drop(&self) -> Result<(), StoreError> {
        self.client
            .delete_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        info!(table = %self.table, "table deleted");
        Ok(())
    }

    /// Describe the table.
    pub async fn describe(&self) -> Result<TableSummary, StoreError> {
        let response = self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        let description = response.table().ok_or_else(|| StoreError::Service {
            message: "describe returned no table description".to_string(),
        })?;

        let ttl = self
            .client
            .describe_time_to_live()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        let ttl_enabled = ttl
            .time_to_live_description()
            .and_then(|d| d.time_to_live_status())
            .map(|s| s.as_str() == "ENABLED")
            .unwrap_or(false);

        Ok(TableSummary {
            table: self.table.clone(),
            status: description
                .table_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            item_count: description.item_count().unwrap_or(0),
            size_bytes: description.table_size_bytes().unwrap_or(0),
            billing_mode: description
                .billing_mode_summary()
                .and_then(|b| b.billing_mode())
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "PROVISIONED".to_string()),
            ttl_enabled,
            type_index_status: description
                .global_secondary_indexes()
                .iter()
                .find(|i| i.index_name() == Some(TYPE_INDEX_NAME))
                .and_then(|i| i.index_status())
                .map(|s| s.as_str().to_string()),
        })
    }

    async fn wait_until_active(&self) -> Result<(), StoreError> {
        let deadline = std::time::Instant::now() + CREATE_WAIT;
        loop {
            let summary = self.describe().await?;
            if summary.status == "ACTIVE" {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(StoreError::Service {
                    message: format!(
                        "table '{}' did not become ACTIVE within {}s (status {})",
                        self.table,
                        CREATE_WAIT.as_secs(),
                        summary.status
                    ),
                });
            }
            debug!(table = %self.table, status = %summary.status, "waiting for table");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
