//! DynamoDB implementation of the item-store driver.
//!
//! Renders the typed conditions and updates into condition/update
//! expressions, decodes every returned attribute map into a typed
//! [`ItemRecord`], and classifies SDK failures into the driver error
//! contract. `value`, `type`, and `ttl` are reserved words in DynamoDB
//! expressions, so every expression goes through attribute-name aliases.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::types::ConditionCheck;
use aws_sdk_dynamodb::types::Delete;
use aws_sdk_dynamodb::types::Get;
use aws_sdk_dynamodb::types::Put;
use aws_sdk_dynamodb::types::ReturnValue;
use aws_sdk_dynamodb::types::Select;
use aws_sdk_dynamodb::types::TransactGetItem;
use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::types::Update;
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use awsprim_core::now_unix_secs;
use awsprim_core::ItemMetadata;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use tracing::debug;

use crate::error::StoreError;
use crate::op::ItemKey;
use crate::op::QuerySpec;
use crate::op::TransactAction;
use crate::op::UpdateAction;
use crate::op::WriteCondition;
use crate::validate_transaction;
use crate::ItemStore;

const ATTR_PK: &str = "PK";
const ATTR_SK: &str = "SK";
const ATTR_VALUE: &str = "value";
const ATTR_TYPE: &str = "type";
const ATTR_TTL: &str = "ttl";
const ATTR_METADATA: &str = "metadata";
const ATTR_CREATED_AT: &str = "created_at";
const ATTR_UPDATED_AT: &str = "updated_at";
const ATTR_VERSION: &str = "version";

/// Name of the `(type, updated_at)` secondary index.
pub const TYPE_INDEX_NAME: &str = "type-index";

type Item = HashMap<String, AttributeValue>;

/// DynamoDB connection settings.
#[derive(Debug, Clone, Default)]
pub struct DynamoConfig {
    /// Table name.
    pub table: String,
    /// Optional region override.
    pub region: Option<String>,
    /// Optional endpoint override (e.g. a local emulator).
    pub endpoint: Option<String>,
    /// Operation timeout, including SDK retries.
    pub timeout: Option<Duration>,
}

/// Production item store over DynamoDB.
#[derive(Clone)]
pub struct DynamoItemStore {
    client: Client,
    table: String,
}

impl std::fmt::Debug for DynamoItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoItemStore").field("table", &self.table).finish()
    }
}

impl DynamoItemStore {
    /// Build a store from a shared SDK config plus per-store overrides.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout) = config.timeout {
            builder = builder
                .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }
        Self {
            client: Client::from_conf(builder.build()),
            table: config.table,
        }
    }

    /// Wrap a pre-built client (used by table administration and tests).
    pub fn from_client(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// The underlying SDK client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The table this store operates on.
    pub fn table(&self) -> &str {
        &self.table
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
                    "ConditionalCheckFailedException" => StoreError::Conflict { message },
                    "ProvisionedThroughputExceededException"
                    | "ThrottlingException"
                    | "RequestLimitExceeded"
                    | "LimitExceededException" => StoreError::Throttled { message },
                    "ResourceNotFoundException" => StoreError::TableMissing {
                        table: self.table.clone(),
                    },
                    "AccessDeniedException"
                    | "UnrecognizedClientException"
                    | "MissingAuthenticationTokenException" => StoreError::Forbidden { message },
                    "ValidationException" => StoreError::InvalidRequest { message },
                    other => StoreError::Service {
                        message: format!("{other}: {message}"),
                    },
                }
            }
            SdkError::TimeoutError(_) => StoreError::Service {
                message: "request timed out".to_string(),
            },
            SdkError::DispatchFailure(e) => StoreError::Service {
                message: format!("connection failure: {e:?}"),
            },
            other => StoreError::Service {
                message: format!("{other:?}"),
            },
        }
    }
}

/// Rendered expression fragments.
#[derive(Debug, Default)]
struct Expr {
    condition: Option<String>,
    update: Option<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Expr {
    fn name(&mut self, alias: &str, attr: &str) {
        self.names.insert(alias.to_string(), attr.to_string());
    }

    fn value(&mut self, placeholder: &str, value: AttributeValue) {
        self.values.insert(placeholder.to_string(), value);
    }
}

/// Render a write condition into expression form.
fn render_condition(condition: &WriteCondition, expr: &mut Expr) {
    let rendered = match condition {
        WriteCondition::None => return,
        WriteCondition::Absent => format!("attribute_not_exists({ATTR_PK})"),
        WriteCondition::Exists => format!("attribute_exists({ATTR_PK})"),
        WriteCondition::ValueEquals(value) => {
            expr.name("#v", ATTR_VALUE);
            expr.value(":cond_value", json_to_attr(value));
            "#v = :cond_value".to_string()
        }
        WriteCondition::AbsentOrValueEquals(value) => {
            expr.name("#v", ATTR_VALUE);
            expr.value(":cond_value", json_to_attr(value));
            format!("attribute_not_exists({ATTR_PK}) OR #v = :cond_value")
        }
        WriteCondition::AbsentOrExpired { now } => {
            expr.name("#ttl", ATTR_TTL);
            expr.value(":cond_now", AttributeValue::N(now.to_string()));
            format!("attribute_not_exists({ATTR_PK}) OR #ttl <= :cond_now")
        }
        WriteCondition::AbsentOrValueEqualsOrExpired { value, now } => {
            expr.name("#v", ATTR_VALUE);
            expr.name("#ttl", ATTR_TTL);
            expr.value(":cond_value", json_to_attr(value));
            expr.value(":cond_now", AttributeValue::N(now.to_string()));
            format!("attribute_not_exists({ATTR_PK}) OR #v = :cond_value OR #ttl <= :cond_now")
        }
        WriteCondition::ValueEqualsAndNotExpired { value, now } => {
            expr.name("#v", ATTR_VALUE);
            expr.name("#ttl", ATTR_TTL);
            expr.value(":cond_value", json_to_attr(value));
            expr.value(":cond_now", AttributeValue::N(now.to_string()));
            "#v = :cond_value AND #ttl > :cond_now".to_string()
        }
        WriteCondition::VersionEquals(version) => {
            expr.value(":cond_version", AttributeValue::N(version.to_string()));
            format!("{ATTR_VERSION} = :cond_version")
        }
        WriteCondition::VisibilityUnchanged { observed } => {
            expr.name("#md", ATTR_METADATA);
            expr.name("#vd", "visibility_deadline");
            match observed {
                None => format!("attribute_exists({ATTR_PK}) AND attribute_not_exists(#md.#vd)"),
                Some(deadline) => {
                    expr.value(":cond_deadline", AttributeValue::N(deadline.to_string()));
                    "#md.#vd = :cond_deadline".to_string()
                }
            }
        }
    };
    expr.condition = Some(rendered);
}

/// Render an update action into expression form.
fn render_update(update: &UpdateAction, expr: &mut Expr) -> Result<(), StoreError> {
    let now = now_unix_secs();
    expr.value(":now", AttributeValue::N(now.to_string()));

    let rendered = match update {
        UpdateAction::Increment { by, item_type } => {
            expr.name("#v", ATTR_VALUE);
            expr.name("#t", ATTR_TYPE);
            expr.value(":by", AttributeValue::N(by.to_string()));
            expr.value(":type", AttributeValue::S(item_type.as_str().to_string()));
            expr.value(":zero", AttributeValue::N("0".to_string()));
            expr.value(":one", AttributeValue::N("1".to_string()));
            format!(
                "ADD #v :by \
                 SET #t = if_not_exists(#t, :type), \
                 {ATTR_CREATED_AT} = if_not_exists({ATTR_CREATED_AT}, :now), \
                 {ATTR_UPDATED_AT} = :now, \
                 {ATTR_VERSION} = if_not_exists({ATTR_VERSION}, :zero) + :one"
            )
        }
        UpdateAction::ExtendTtl { expires_at } => {
            expr.name("#ttl", ATTR_TTL);
            expr.value(":ttl", AttributeValue::N(expires_at.to_string()));
            format!("SET #ttl = :ttl, {ATTR_UPDATED_AT} = :now")
        }
        UpdateAction::SetVisibility { deadline } => {
            expr.name("#md", ATTR_METADATA);
            expr.name("#vd", "visibility_deadline");
            expr.value(":deadline", AttributeValue::N(deadline.to_string()));
            format!("SET #md.#vd = :deadline, {ATTR_UPDATED_AT} = :now")
        }
        UpdateAction::Claim {
            value,
            item_type,
            ttl,
            metadata,
        } => {
            expr.name("#v", ATTR_VALUE);
            expr.name("#t", ATTR_TYPE);
            expr.name("#md", ATTR_METADATA);
            expr.value(":value", json_to_attr(value));
            expr.value(":type", AttributeValue::S(item_type.as_str().to_string()));
            expr.value(":md", metadata_to_attr(metadata)?);
            expr.value(":zero", AttributeValue::N("0".to_string()));
            expr.value(":one", AttributeValue::N("1".to_string()));
            let mut parts = format!(
                "SET #v = :value, #t = :type, #md = :md, \
                 {ATTR_CREATED_AT} = if_not_exists({ATTR_CREATED_AT}, :now), \
                 {ATTR_UPDATED_AT} = :now, \
                 {ATTR_VERSION} = if_not_exists({ATTR_VERSION}, :zero) + :one"
            );
            if let Some(expires_at) = ttl {
                expr.name("#ttl", ATTR_TTL);
                expr.value(":ttl", AttributeValue::N(expires_at.to_string()));
                parts.push_str(", #ttl = :ttl");
            }
            parts
        }
        UpdateAction::SetValue { value, item_type } => {
            expr.name("#v", ATTR_VALUE);
            expr.name("#t", ATTR_TYPE);
            expr.value(":value", json_to_attr(value));
            expr.value(":type", AttributeValue::S(item_type.as_str().to_string()));
            expr.value(":zero", AttributeValue::N("0".to_string()));
            expr.value(":one", AttributeValue::N("1".to_string()));
            format!(
                "SET #v = :value, #t = :type, \
                 {ATTR_CREATED_AT} = if_not_exists({ATTR_CREATED_AT}, :now), \
                 {ATTR_UPDATED_AT} = :now, \
                 {ATTR_VERSION} = if_not_exists({ATTR_VERSION}, :zero) + :one"
            )
        }
    };
    expr.update = Some(rendered);
    Ok(())
}

// ── Attribute codec ──────────────────────────────────────────────────────

fn key_item(key: &ItemKey) -> Item {
    HashMap::from([
        (ATTR_PK.to_string(), AttributeValue::S(key.partition_key.clone())),
        (ATTR_SK.to_string(), AttributeValue::S(key.sort_key.clone())),
    ])
}

fn encode_record(record: &ItemRecord) -> Result<Item, StoreError> {
    let mut item = HashMap::from([
        (ATTR_PK.to_string(), AttributeValue::S(record.partition_key.clone())),
        (ATTR_SK.to_string(), AttributeValue::S(record.sort_key.clone())),
        (ATTR_VALUE.to_string(), json_to_attr(&record.value)),
        (ATTR_TYPE.to_string(), AttributeValue::S(record.item_type.as_str().to_string())),
        (ATTR_CREATED_AT.to_string(), AttributeValue::N(record.created_at.to_string())),
        (ATTR_UPDATED_AT.to_string(), AttributeValue::N(record.updated_at.to_string())),
        (ATTR_VERSION.to_string(), AttributeValue::N(record.version.to_string())),
    ]);
    if let Some(ttl) = record.ttl {
        item.insert(ATTR_TTL.to_string(), AttributeValue::N(ttl.to_string()));
    }
    if !record.metadata.is_empty() {
        item.insert(ATTR_METADATA.to_string(), metadata_to_attr(&record.metadata)?);
    }
    Ok(item)
}

fn decode_record(item: &Item) -> Result<ItemRecord, StoreError> {
    let partition_key = string_attr(item, ATTR_PK)?;
    let sort_key = string_attr(item, ATTR_SK)?;
    let type_str = string_attr(item, ATTR_TYPE)?;
    let item_type = ItemType::parse(&type_str).ok_or_else(|| StoreError::Service {
        message: format!("item {partition_key}/{sort_key} has unknown type '{type_str}'"),
    })?;

    let metadata = match item.get(ATTR_METADATA) {
        Some(attr) => {
            let json = attr_to_json(attr);
            serde_json::from_value::<ItemMetadata>(json).map_err(|e| StoreError::Service {
                message: format!("item {partition_key}/{sort_key} has malformed metadata: {e}"),
            })?
        }
        None => ItemMetadata::default(),
    };

    Ok(ItemRecord {
        value: item.get(ATTR_VALUE).map(attr_to_json).unwrap_or(serde_json::Value::Null),
        item_type,
        ttl: number_attr(item, ATTR_TTL),
        metadata,
        created_at: number_attr(item, ATTR_CREATED_AT).unwrap_or(0),
        updated_at: number_attr(item, ATTR_UPDATED_AT).unwrap_or(0),
        version: number_attr(item, ATTR_VERSION).unwrap_or(1),
        partition_key,
        sort_key,
    })
}

fn string_attr(item: &Item, attr: &str) -> Result<String, StoreError> {
    item.get(attr)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| StoreError::Service {
            message: format!("item is missing required string attribute '{attr}'"),
        })
}

fn number_attr(item: &Item, attr: &str) -> Option<u64> {
    item.get(attr).and_then(|v| v.as_n().ok()).and_then(|s| s.parse().ok())
}

fn metadata_to_attr(metadata: &ItemMetadata) -> Result<AttributeValue, StoreError> {
    let json = serde_json::to_value(metadata).map_err(|e| StoreError::InvalidRequest {
        message: format!("unserializable metadata: {e}"),
    })?;
    Ok(json_to_attr(&json))
}

fn json_to_attr(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null(true),
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => AttributeValue::N(n.to_string()),
        serde_json::Value::String(s) => AttributeValue::S(s.clone()),
        serde_json::Value::Array(items) => {
            AttributeValue::L(items.iter().map(json_to_attr).collect())
        }
        serde_json::Value::Object(map) => AttributeValue::M(
            map.iter().map(|(k, v)| (k.clone(), json_to_attr(v))).collect(),
        ),
    }
}

fn attr_to_json(attr: &AttributeValue) -> serde_json::Value {
    match attr {
        AttributeValue::S(s) => serde_json::Value::String(s.clone()),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                serde_json::Value::Number(i.into())
            } else if let Some(f) = n.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                serde_json::Value::Number(f)
            } else {
                serde_json::Value::String(n.clone())
            }
        }
        AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
        AttributeValue::Null(_) => serde_json::Value::Null,
        AttributeValue::L(items) => {
            serde_json::Value::Array(items.iter().map(attr_to_json).collect())
        }
        AttributeValue::M(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), attr_to_json(v))).collect(),
        ),
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

// ── Transact item builders ───────────────────────────────────────────────

fn build_transact_item(table: &str, action: &TransactAction) -> Result<TransactWriteItem, StoreError> {
    let invalid = |e: &dyn std::fmt::Display| StoreError::InvalidRequest {
        message: format!("malformed transact item: {e}"),
    };

    match action {
        TransactAction::Put { record, condition } => {
            let mut expr = Expr::default();
            render_condition(condition, &mut expr);
            let mut put = Put::builder().table_name(table).set_item(Some(encode_record(record)?));
            if let Some(cond) = expr.condition {
                put = put.condition_expression(cond);
            }
            if !expr.names.is_empty() {
                put = put.set_expression_attribute_names(Some(expr.names));
            }
            if !expr.values.is_empty() {
                put = put.set_expression_attribute_values(Some(expr.values));
            }
            Ok(TransactWriteItem::builder()
                .put(put.build().map_err(|e| invalid(&e))?)
                .build())
        }
        TransactAction::Update { key, update, condition } => {
            let mut expr = Expr::default();
            render_condition(condition, &mut expr);
            render_update(update, &mut expr)?;
            let update_expr = expr.update.unwrap_or_default();
            let mut upd = Update::builder()
                .table_name(table)
                .set_key(Some(key_item(key)))
                .update_expression(update_expr);
            if let Some(cond) = expr.condition {
                upd = upd.condition_expression(cond);
            }
            if !expr.names.is_empty() {
                upd = upd.set_expression_attribute_names(Some(expr.names));
            }
            if !expr.values.is_empty() {
                upd = upd.set_expression_attribute_values(Some(expr.values));
            }
            Ok(TransactWriteItem::builder()
                .update(upd.build().map_err(|e| invalid(&e))?)
                .build())
        }
        TransactAction::Delete { key, condition } => {
            let mut expr = Expr::default();
            render_condition(condition, &mut expr);
            let mut del = Delete::builder().table_name(table).set_key(Some(key_item(key)));
            if let Some(cond) = expr.condition {
                del = del.condition_expression(cond);
            }
            if !expr.names.is_empty() {
                del = del.set_expression_attribute_names(Some(expr.names));
            }
            if !expr.values.is_empty() {
                del = del.set_expression_attribute_values(Some(expr.values));
            }
            Ok(TransactWriteItem::builder()
                .delete(del.build().map_err(|e| invalid(&e))?)
                .build())
        }
        TransactAction::ConditionCheck { key, condition } => {
            let mut expr = Expr::default();
            render_condition(condition, &mut expr);
            let cond = expr.condition.ok_or_else(|| StoreError::InvalidRequest {
                message: "condition-check action requires a condition".to_string(),
            })?;
            let mut check = ConditionCheck::builder()
                .table_name(table)
                .set_key(Some(key_item(key)))
                .condition_expression(cond);
            if !expr.names.is_empty() {
                check = check.set_expression_attribute_names(Some(expr.names));
            }
            if !expr.values.is_empty() {
                check = check.set_expression_attribute_values(Some(expr.values));
            }
            Ok(TransactWriteItem::builder()
                .condition_check(check.build().map_err(|e| invalid(&e))?)
                .build())
        }
    }
}

fn cancellation_reasons(err: &SdkError<TransactWriteItemsError>) -> Option<Vec<String>> {
    if let SdkError::ServiceError(ctx) = err {
        if let TransactWriteItemsError::TransactionCanceledException(canceled) = ctx.err() {
            let reasons = canceled
                .cancellation_reasons()
                .iter()
                .enumerate()
                .map(|(i, reason)| {
                    format!(
                        "action {i}: {}",
                        reason.code().unwrap_or("None")
                    )
                })
                .collect();
            return Some(reasons);
        }
    }
    None
}

// ── ItemStore implementation ─────────────────────────────────────────────

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn put(&self, record: ItemRecord, condition: WriteCondition) -> Result<(), StoreError> {
        let mut expr = Expr::default();
        render_condition(&condition, &mut expr);

        let mut request = self
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(encode_record(&record)?));
        if let Some(cond) = expr.condition {
            request = request.condition_expression(cond);
        }
        if !expr.names.is_empty() {
            request = request.set_expression_attribute_names(Some(expr.names));
        }
        if !expr.values.is_empty() {
            request = request.set_expression_attribute_values(Some(expr.values));
        }

        request.send().await.map_err(|e| self.classify(&e))?;
        debug!(pk = %record.partition_key, sk = %record.sort_key, "item written");
        Ok(())
    }

    async fn get(&self, key: &ItemKey, consistent: bool) -> Result<Option<ItemRecord>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(key_item(key)))
            .consistent_read(consistent)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        match response.item() {
            None => Ok(None),
            Some(item) => {
                let record = decode_record(item)?;
                if record.is_expired_at(now_unix_secs()) {
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
        }
    }

    async fn update(
        &self,
        key: &ItemKey,
        update: UpdateAction,
        condition: WriteCondition,
    ) -> Result<ItemRecord, StoreError> {
        let mut expr = Expr::default();
        render_condition(&condition, &mut expr);
        render_update(&update, &mut expr)?;
        let update_expr = expr.update.unwrap_or_default();

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table)
            .set_key(Some(key_item(key)))
            .update_expression(update_expr)
            .return_values(ReturnValue::AllNew);
        if let Some(cond) = expr.condition {
            request = request.condition_expression(cond);
        }
        if !expr.names.is_empty() {
            request = request.set_expression_attribute_names(Some(expr.names));
        }
        if !expr.values.is_empty() {
            request = request.set_expression_attribute_values(Some(expr.values));
        }

        let response = request.send().await.map_err(|e| self.classify(&e))?;
        let attributes = response.attributes().ok_or_else(|| StoreError::Service {
            message: "update returned no attributes".to_string(),
        })?;
        decode_record(attributes)
    }

    async fn delete(&self, key: &ItemKey, condition: WriteCondition) -> Result<(), StoreError> {
        let mut expr = Expr::default();
        render_condition(&condition, &mut expr);

        let mut request = self
            .client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(key_item(key)));
        if let Some(cond) = expr.condition {
            request = request.condition_expression(cond);
        }
        if !expr.names.is_empty() {
            request = request.set_expression_attribute_names(Some(expr.names));
        }
        if !expr.values.is_empty() {
            request = request.set_expression_attribute_values(Some(expr.values));
        }

        request.send().await.map_err(|e| self.classify(&e))?;
        Ok(())
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<ItemRecord>, StoreError> {
        let now = now_unix_secs();
        let mut records = Vec::new();
        let mut last_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .scan_index_forward(spec.ascending)
                .consistent_read(spec.consistent)
                .expression_attribute_values(
                    ":pk",
                    AttributeValue::S(spec.partition_key.clone()),
                );
            request = match &spec.sort_key_prefix {
                Some(prefix) => request
                    .key_condition_expression("PK = :pk AND begins_with(SK, :skp)")
                    .expression_attribute_values(":skp", AttributeValue::S(prefix.clone())),
                None => request.key_condition_expression("PK = :pk"),
            };
            if let Some(limit) = spec.limit {
                request = request.limit(limit as i32);
            }
            if let Some(key) = last_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| self.classify(&e))?;
            for item in response.items() {
                let record = decode_record(item)?;
                if record.is_expired_at(now) {
                    continue;
                }
                records.push(record);
                if let Some(limit) = spec.limit {
                    if records.len() >= limit as usize {
                        return Ok(records);
                    }
                }
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    async fn count(
        &self,
        partition_key: &str,
        sort_key_prefix: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut total = 0u64;
        let mut last_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .select(Select::Count)
                .expression_attribute_values(":pk", AttributeValue::S(partition_key.to_string()));
            request = match sort_key_prefix {
                Some(prefix) => request
                    .key_condition_expression("PK = :pk AND begins_with(SK, :skp)")
                    .expression_attribute_values(":skp", AttributeValue::S(prefix.to_string())),
                None => request.key_condition_expression("PK = :pk"),
            };
            if let Some(key) = last_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| self.classify(&e))?;
            total += response.count() as u64;

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(total)
    }

    async fn query_type_index(
        &self,
        item_type: ItemType,
        limit: Option<u32>,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let now = now_unix_secs();
        let mut records = Vec::new();
        let mut last_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(TYPE_INDEX_NAME)
                .key_condition_expression("#t = :t")
                .expression_attribute_names("#t", ATTR_TYPE)
                .expression_attribute_values(
                    ":t",
                    AttributeValue::S(item_type.as_str().to_string()),
                )
                .scan_index_forward(false);
            if let Some(limit) = limit {
                request = request.limit(limit as i32);
            }
            if let Some(key) = last_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| self.classify(&e))?;
            for item in response.items() {
                let record = decode_record(item)?;
                if record.is_expired_at(now) {
                    continue;
                }
                records.push(record);
                if let Some(limit) = limit {
                    if records.len() >= limit as usize {
                        return Ok(records);
                    }
                }
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    async fn count_type(&self, item_type: ItemType) -> Result<u64, StoreError> {
        let mut total = 0u64;
        let mut last_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(TYPE_INDEX_NAME)
                .select(Select::Count)
                .key_condition_expression("#t = :t")
                .expression_attribute_names("#t", ATTR_TYPE)
                .expression_attribute_values(
                    ":t",
                    AttributeValue::S(item_type.as_str().to_string()),
                );
            if let Some(key) = last_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| self.classify(&e))?;
            total += response.count() as u64;

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(total)
    }

    async fn transact_write(&self, actions: Vec<TransactAction>) -> Result<(), StoreError> {
        validate_transaction(&actions)?;

        let mut request = self.client.transact_write_items();
        for action in &actions {
            request = request.transact_items(build_transact_item(&self.table, action)?);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => match cancellation_reasons(&e) {
                Some(reasons) => Err(StoreError::TransactionCanceled { reasons }),
                None => Err(self.classify(&e)),
            },
        }
    }

    async fn transact_get(&self, keys: Vec<ItemKey>) -> Result<Vec<Option<ItemRecord>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() > awsprim_core::constants::MAX_TRANSACT_ACTIONS {
            return Err(StoreError::InvalidRequest {
                message: format!("transactional read of {} keys exceeds the maximum", keys.len()),
            });
        }

        let mut request = self.client.transact_get_items();
        for key in &keys {
            let get = Get::builder()
                .table_name(&self.table)
                .set_key(Some(key_item(key)))
                .build()
                .map_err(|e| StoreError::InvalidRequest {
                    message: format!("malformed transact get: {e}"),
                })?;
            request = request.transact_items(TransactGetItem::builder().get(get).build());
        }

        let response = request.send().await.map_err(|e| self.classify(&e))?;
        let now = now_unix_secs();
        let mut records = Vec::with_capacity(keys.len());
        for item_response in response.responses() {
            match item_response.item() {
                Some(item) if !item.is_empty() => {
                    let record = decode_record(item)?;
                    records.push((!record.is_expired_at(now)).then_some(record));
                }
                _ => records.push(None),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_codec_round_trips() {
        let mut metadata = ItemMetadata::default();
        metadata.owner = Some("host-1".to_string());
        metadata.acquired_at = Some(1_700_000_000_000_000);

        let record = ItemRecord::new("lock:build", "lock:build", "host-1".into(), ItemType::Lock)
            .with_ttl_in(300)
            .with_metadata(metadata);

        let encoded = encode_record(&record).unwrap();
        let decoded = decode_record(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn records_without_metadata_decode_cleanly() {
        let record = ItemRecord::new("kv:a", "kv:a", serde_json::json!({"n": 3}), ItemType::Kv);
        let decoded = decode_record(&encode_record(&record).unwrap()).unwrap();
        assert_eq!(decoded.metadata, ItemMetadata::default());
        assert_eq!(decoded.value, serde_json::json!({"n": 3}));
    }

    #[test]
    fn condition_rendering_covers_every_variant() {
        let conditions = [
            WriteCondition::Absent,
            WriteCondition::Exists,
            WriteCondition::ValueEquals("x".into()),
            WriteCondition::AbsentOrValueEquals("x".into()),
            WriteCondition::AbsentOrExpired { now: 10 },
            WriteCondition::AbsentOrValueEqualsOrExpired { value: "x".into(), now: 10 },
            WriteCondition::ValueEqualsAndNotExpired { value: "x".into(), now: 10 },
            WriteCondition::VersionEquals(7),
            WriteCondition::VisibilityUnchanged { observed: None },
            WriteCondition::VisibilityUnchanged { observed: Some(99) },
        ];
        for condition in conditions {
            let mut expr = Expr::default();
            render_condition(&condition, &mut expr);
            let rendered = expr.condition.expect("rendered");
            assert!(!rendered.is_empty());
            // Reserved words never appear bare in a rendered expression.
            for reserved in ["value ", "ttl ", "type "] {
                assert!(!rendered.starts_with(reserved));
            }
        }
    }

    #[test]
    fn update_values_do_not_collide_with_condition_values() {
        let mut expr = Expr::default();
        render_condition(
            &WriteCondition::AbsentOrValueEqualsOrExpired { value: "o".into(), now: 5 },
            &mut expr,
        );
        render_update(
            &UpdateAction::Claim {
                value: "o".into(),
                item_type: ItemType::Lock,
                ttl: Some(500),
                metadata: ItemMetadata::default(),
            },
            &mut expr,
        )
        .unwrap();
        // Condition placeholders are :cond_-prefixed, update placeholders are not.
        assert!(expr.values.contains_key(":cond_value"));
        assert!(expr.values.contains_key(":value"));
        assert!(expr.values.contains_key(":ttl"));
    }
}
