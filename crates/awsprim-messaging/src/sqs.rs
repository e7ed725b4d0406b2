//! SQS message-queue adapter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_sqs::error::ProvideErrorMetadata;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::types::QueueAttributeName;
use aws_sdk_sqs::Client;
use awsprim_core::PrimitiveError;
use tracing::debug;

use crate::contract::is_ordered_name;
use crate::contract::require_group_for_ordered;
use crate::contract::require_ordered_suffix;
use crate::contract::MessageQueueService;
use crate::contract::QueueInfo;
use crate::contract::QueueSpec;
use crate::contract::ReceiveOptions;
use crate::contract::ReceivedMessage;
use crate::contract::SentMessage;
use crate::contract::SubscriptionInfo;

/// Message-queue service over SQS. Carries an SNS client as well so a
/// queue can be wired to a topic in one call (subscription plus queue
/// policy).
#[derive(Clone)]
pub struct SqsQueues {
    client: Client,
    sns: aws_sdk_sns::Client,
}

impl std::fmt::Debug for SqsQueues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsQueues").finish()
    }
}

impl SqsQueues {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            sns: aws_sdk_sns::Client::new(sdk_config),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve a queue name or URL to the queue URL.
    async fn resolve_url(&self, queue: &str) -> Result<String, PrimitiveError> {
        if queue.starts_with("https://") {
            return Ok(queue.to_string());
        }
        let output = self
            .client
            .get_queue_url()
            .queue_name(queue)
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| PrimitiveError::NotFound {
                message: format!("queue '{queue}' not found"),
                solution: format!("Create it with 'awsprim mq create {queue}'."),
            })
    }

    async fn queue_arn(&self, queue_url: &str) -> Result<String, PrimitiveError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| classify(&e, queue_url))?;
        output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| PrimitiveError::Service {
                message: format!("queue '{queue_url}' reported no ARN"),
            })
    }
}

fn classify<E>(err: &SdkError<E>, what: &str) -> PrimitiveError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or_default();
            let message = ctx.err().message().unwrap_or("no detail").to_string();
            match code {
                "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
                    PrimitiveError::NotFound {
                        message: format!("queue '{what}' does not exist"),
                        solution: format!("Create it with 'awsprim mq create {what}'."),
                    }
                }
                "QueueAlreadyExists" | "QueueNameExists" => PrimitiveError::AlreadyExists {
                    message: format!("queue '{what}' already exists with different settings"),
                    solution: "Delete the existing queue or create it with matching attributes."
                        .to_string(),
                },
                "ThrottlingException" | "Throttling" | "RequestThrottled" => {
                    PrimitiveError::Throttled { message }
                }
                "AccessDeniedException" | "AccessDenied" => {
                    PrimitiveError::PermissionDenied { message }
                }
                "InvalidParameterValue" | "InvalidAttributeName" | "ValidationError" => {
                    PrimitiveError::InvalidArgument {
                        message: format!("'{what}': {message}"),
                        solution: "Fix the request parameters and retry.".to_string(),
                    }
                }
                other => PrimitiveError::Service {
                    message: format!("'{what}': {other}: {message}"),
                },
            }
        }
        other => PrimitiveError::Service {
            message: format!("'{what}': {other:?}"),
        },
    }
}

#[async_trait]
impl MessageQueueService for SqsQueues {
    async fn create(&self, name: &str, spec: QueueSpec) -> Result<QueueInfo, PrimitiveError> {
        if spec.ordered {
            require_ordered_suffix("queue", name)?;
        } else if is_ordered_name(name) {
            return Err(PrimitiveError::invalid(
                format!("queue '{name}' carries the '.fifo' suffix but --ordered was not set"),
                "Either pass --ordered or drop the suffix.",
            ));
        }

        let mut attributes: Vec<(QueueAttributeName, String)> = Vec::new();
        if spec.ordered {
            attributes.push((QueueAttributeName::FifoQueue, "true".to_string()));
            if spec.content_dedup {
                attributes.push((
                    QueueAttributeName::ContentBasedDeduplication,
                    "true".to_string(),
                ));
            }
        }
        if let Some(secs) = spec.visibility_timeout_secs {
            attributes.push((QueueAttributeName::VisibilityTimeout, secs.to_string()));
        }
        if let Some(secs) = spec.retention_secs {
            attributes.push((QueueAttributeName::MessageRetentionPeriod, secs.to_string()));
        }
        if let Some(secs) = spec.delivery_delay_secs {
            attributes.push((QueueAttributeName::DelaySeconds, secs.to_string()));
        }
        if let Some(secs) = spec.receive_wait_secs {
            attributes.push((
                QueueAttributeName::ReceiveMessageWaitTimeSeconds,
                secs.to_string(),
            ));
        }
        if let Some((dlq_name, max_receive)) = &spec.dead_letter {
            let dlq_url = self.resolve_url(dlq_name).await?;
            let dlq_arn = self.queue_arn(&dlq_url).await?;
            let policy = serde_json::json!({
                "deadLetterTargetArn": dlq_arn,
                "maxReceiveCount": max_receive,
            });
            attributes.push((QueueAttributeName::RedrivePolicy, policy.to_string()));
        }

        let mut request = self.client.create_queue().queue_name(name);
        for (key, value) in attributes {
            request = request.attributes(key, value);
        }
        let output = request.send().await.map_err(|e| classify(&e, name))?;
        let url = output.queue_url().unwrap_or_default().to_string();
        debug!(name, url, ordered = spec.ordered, "queue created");
        Ok(QueueInfo {
            name: name.to_string(),
            url,
            ordered: spec.ordered,
        })
    }

    async fn send(
        &self,
        queue: &str,
        body: &str,
        group_id: Option<&str>,
        dedup_id: Option<&str>,
        delay_secs: Option<u64>,
        attributes: &[(String, String)],
    ) -> Result<SentMessage, PrimitiveError> {
        require_group_for_ordered("queue", queue, group_id)?;
        let url = self.resolve_url(queue).await?;

        let mut request = self.client.send_message().queue_url(&url).message_body(body);
        if let Some(group) = group_id {
            request = request.message_group_id(group);
        }
        if let Some(dedup) = dedup_id {
            request = request.message_deduplication_id(dedup);
        }
        if let Some(delay) = delay_secs {
            request = request.delay_seconds(delay as i32);
        }
        for (key, value) in attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| PrimitiveError::invalid(
                    format!("invalid message attribute '{key}': {e}"),
                    "Attributes are KEY=VALUE string pairs.",
                ))?;
            request = request.message_attributes(key, attribute);
        }

        let output = request.send().await.map_err(|e| classify(&e, queue))?;
        Ok(SentMessage {
            queue: queue.to_string(),
            message_id: output.message_id().unwrap_or_default().to_string(),
            sequence_number: output.sequence_number().map(str::to_string),
        })
    }

    async fn receive(
        &self,
        queue: &str,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, PrimitiveError> {
        if !(1..=10).contains(&options.max) {
            return Err(PrimitiveError::invalid(
                format!("--max must be between 1 and 10, got {}", options.max),
                "The service returns at most 10 messages per receive.",
            ));
        }
        if options.wait_secs > 20 {
            return Err(PrimitiveError::invalid(
                format!("--wait must be between 0 and 20 seconds, got {}", options.wait_secs),
                "Long polling is capped at 20 seconds per call.",
            ));
        }

        let url = self.resolve_url(queue).await?;
        let mut request = self
            .client
            .receive_message()
            .queue_url(&url)
            .max_number_of_messages(options.max as i32)
            .wait_time_seconds(options.wait_secs as i32)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names("All");
        if let Some(secs) = options.visibility_timeout_secs {
            request = request.visibility_timeout(secs as i32);
        }

        let output = request.send().await.map_err(|e| classify(&e, queue))?;
        let mut messages = Vec::new();
        for message in output.messages() {
            let receipt = message.receipt_handle().unwrap_or_default().to_string();
            let attributes: BTreeMap<String, String> = message
                .attributes()
                .map(|attrs| {
                    attrs
                        .iter()
                        .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            if options.auto_delete && !receipt.is_empty() {
                self.client
                    .delete_message()
                    .queue_url(&url)
                    .receipt_handle(&receipt)
                    .send()
                    .await
                    .map_err(|e| classify(&e, queue))?;
            }
            messages.push(ReceivedMessage {
                message_id: message.message_id().unwrap_or_default().to_string(),
                body: message.body().unwrap_or_default().to_string(),
                receipt,
                attributes,
            });
        }
        debug!(queue, count = messages.len(), "messages received");
        Ok(messages)
    }

    async fn delete_message(&self, queue: &str, receipt: &str) -> Result<(), PrimitiveError> {
        let url = self.resolve_url(queue).await?;
        self.client
            .delete_message()
            .queue_url(&url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;
        Ok(())
    }

    async fn purge(&self, queue: &str) -> Result<(), PrimitiveError> {
        let url = self.resolve_url(queue).await?;
        self.client
            .purge_queue()
            .queue_url(&url)
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), PrimitiveError> {
        let url = self.resolve_url(queue).await?;
        self.client
            .delete_queue()
            .queue_url(&url)
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;
        debug!(queue, "queue deleted");
        Ok(())
    }

    async fn attributes(&self, queue: &str) -> Result<BTreeMap<String, String>, PrimitiveError> {
        let url = self.resolve_url(queue).await?;
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;
        Ok(output
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_attributes(
        &self,
        queue: &str,
        attributes: &[(String, String)],
    ) -> Result<(), PrimitiveError> {
        let url = self.resolve_url(queue).await?;
        let mut request = self.client.set_queue_attributes().queue_url(&url);
        for (key, value) in attributes {
            let name = QueueAttributeName::from(key.as_str());
            request = request.attributes(name, value);
        }
        request.send().await.map_err(|e| classify(&e, queue))?;
        Ok(())
    }

    async fn subscribe_to_topic(
        &self,
        queue: &str,
        topic_arn: &str,
        raw_delivery: bool,
        filter_policy: Option<&str>,
        filter_scope: Option<&str>,
    ) -> Result<SubscriptionInfo, PrimitiveError> {
        // An ordered topic may only fan out to ordered queues.
        if is_ordered_name(topic_arn) && !is_ordered_name(queue) {
            return Err(PrimitiveError::invalid(
                format!(
                    "ordered topic '{topic_arn}' cannot deliver to non-ordered queue '{queue}'"
                ),
                "Subscribe a '.fifo' queue, or use a non-ordered topic.",
            ));
        }

        let url = self.resolve_url(queue).await?;
        let queue_arn = self.queue_arn(&url).await?;

        // Allow the topic to deliver into the queue before subscribing.
        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Service": "sns.amazonaws.com"},
                "Action": "sqs:SendMessage",
                "Resource": queue_arn,
                "Condition": {"ArnEquals": {"aws:SourceArn": topic_arn}},
            }],
        });
        self.client
            .set_queue_attributes()
            .queue_url(&url)
            .attributes(QueueAttributeName::Policy, policy.to_string())
            .send()
            .await
            .map_err(|e| classify(&e, queue))?;

        let mut request = self
            .sns
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("sqs")
            .endpoint(&queue_arn)
            .return_subscription_arn(true);
        if raw_delivery {
            request = request.attributes("RawMessageDelivery", "true");
        }
        if let Some(policy) = filter_policy {
            serde_json::from_str::<serde_json::Value>(policy).map_err(|e| {
                PrimitiveError::invalid(
                    format!("filter policy is not valid JSON: {e}"),
                    "Pass the filter policy as a JSON document.",
                )
            })?;
            request = request.attributes("FilterPolicy", policy);
        }
        if let Some(scope) = filter_scope {
            request = request.attributes("FilterPolicyScope", scope);
        }

        let output = request.send().await.map_err(|e| sns_classify(&e, queue))?;
        debug!(queue, topic_arn, "queue subscribed to topic");
        Ok(SubscriptionInfo {
            arn: output.subscription_arn().unwrap_or_default().to_string(),
            protocol: "sqs".to_string(),
            endpoint: queue_arn,
        })
    }
}

fn sns_classify<E>(err: &SdkError<E>, what: &str) -> PrimitiveError
where
    E: aws_sdk_sns::error::ProvideErrorMetadata + std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or_default();
            let message = ctx.err().message().unwrap_or("no detail").to_string();
            match code {
                "NotFound" | "NotFoundException" => PrimitiveError::NotFound {
                    message: format!("'{what}': {message}"),
                    solution: "Check the topic ARN.".to_string(),
                },
                "AuthorizationError" => PrimitiveError::PermissionDenied { message },
                _ => PrimitiveError::Service {
                    message: format!("'{what}': {code}: {message}"),
                },
            }
        }
        other => PrimitiveError::Service {
            message: format!("'{what}': {other:?}"),
        },
    }
}
