//! SNS topic adapter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_sns::error::ProvideErrorMetadata;
use aws_sdk_sns::error::SdkError;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client;
use awsprim_core::PrimitiveError;
use tracing::debug;

use crate::contract::is_ordered_name;
use crate::contract::require_group_for_ordered;
use crate::contract::require_ordered_suffix;
use crate::contract::PublishedMessage;
use crate::contract::SubscriptionInfo;
use crate::contract::TopicInfo;
use crate::contract::TopicService;

/// Topic service over SNS.
#[derive(Clone)]
pub struct SnsTopics {
    client: Client,
}

impl std::fmt::Debug for SnsTopics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnsTopics").finish()
    }
}

impl SnsTopics {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve a topic name or ARN to the topic ARN.
    pub async fn resolve_arn(&self, topic: &str) -> Result<String, PrimitiveError> {
        if topic.starts_with("arn:") {
            return Ok(topic.to_string());
        }
        let suffix = format!(":{topic}");
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.client.list_topics();
            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }
            let response = request.send().await.map_err(|e| classify(&e, topic))?;
            for entry in response.topics() {
                if let Some(arn) = entry.topic_arn() {
                    if arn.ends_with(&suffix) {
                        return Ok(arn.to_string());
                    }
                }
            }
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => {
                    return Err(PrimitiveError::NotFound {
                        message: format!("topic '{topic}' not found"),
                        solution: format!("Create it with 'awsprim topic create {topic}'."),
                    })
                }
            }
        }
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
                "NotFound" | "NotFoundException" | "ResourceNotFoundException" => {
                    PrimitiveError::NotFound {
                        message: format!("'{what}': {message}"),
                        solution: "Check the topic name; list topics to see what exists."
                            .to_string(),
                    }
                }
                "Throttling" | "ThrottledException" | "ThrottlingException" => {
                    PrimitiveError::Throttled { message }
                }
                "AuthorizationError" | "AccessDeniedException" => {
                    PrimitiveError::PermissionDenied { message }
                }
                "InvalidParameter" | "InvalidParameterValue" | "ValidationError" => {
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
impl TopicService for SnsTopics {
    async fn create(
        &self,
        name: &str,
        ordered: bool,
        content_dedup: bool,
    ) -> Result<TopicInfo, PrimitiveError> {
        if ordered {
            require_ordered_suffix("topic", name)?;
        } else if is_ordered_name(name) {
            return Err(PrimitiveError::invalid(
                format!("topic '{name}' carries the '.fifo' suffix but --ordered was not set"),
                "Either pass --ordered or drop the suffix.",
            ));
        }

        let mut request = self.client.create_topic().name(name);
        if ordered {
            request = request.attributes("FifoTopic", "true");
            if content_dedup {
                request = request.attributes("ContentBasedDeduplication", "true");
            }
        }
        let output = request.send().await.map_err(|e| classify(&e, name))?;
        let arn = output.topic_arn().unwrap_or_default().to_string();
        debug!(name, arn, ordered, "topic created");
        Ok(TopicInfo {
            name: name.to_string(),
            arn,
            ordered,
        })
    }

    async fn publish(
        &self,
        topic: &str,
        body: &str,
        group_id: Option<&str>,
        dedup_id: Option<&str>,
        subject: Option<&str>,
        attributes: &[(String, String)],
    ) -> Result<PublishedMessage, PrimitiveError> {
        let arn = self.resolve_arn(topic).await?;
        require_group_for_ordered("topic", &arn, group_id)?;

        let mut request = self.client.publish().topic_arn(&arn).message(body);
        if let Some(subject) = subject {
            request = request.subject(subject);
        }
        if let Some(group) = group_id {
            request = request.message_group_id(group);
        }
        if let Some(dedup) = dedup_id {
            request = request.message_deduplication_id(dedup);
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

        let output = request.send().await.map_err(|e| classify(&e, topic))?;
        Ok(PublishedMessage {
            topic: topic.to_string(),
            message_id: output.message_id().unwrap_or_default().to_string(),
            sequence_number: output.sequence_number().map(str::to_string),
        })
    }

    async fn list(&self) -> Result<Vec<String>, PrimitiveError> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.client.list_topics();
            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }
            let response = request.send().await.map_err(|e| classify(&e, "topics"))?;
            arns.extend(
                response
                    .topics()
                    .iter()
                    .filter_map(|t| t.topic_arn())
                    .map(str::to_string),
            );
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(arns)
    }

    async fn delete(&self, topic: &str) -> Result<(), PrimitiveError> {
        let arn = self.resolve_arn(topic).await?;
        self.client
            .delete_topic()
            .topic_arn(&arn)
            .send()
            .await
            .map_err(|e| classify(&e, topic))?;
        debug!(topic, "topic deleted");
        Ok(())
    }

    async fn attributes(&self, topic: &str) -> Result<BTreeMap<String, String>, PrimitiveError> {
        let arn = self.resolve_arn(topic).await?;
        let output = self
            .client
            .get_topic_attributes()
            .topic_arn(&arn)
            .send()
            .await
            .map_err(|e| classify(&e, topic))?;
        Ok(output
            .attributes()
            .map(|attrs| attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn subscriptions(&self, topic: &str) -> Result<Vec<SubscriptionInfo>, PrimitiveError> {
        let arn = self.resolve_arn(topic).await?;
        let mut subscriptions = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.client.list_subscriptions_by_topic().topic_arn(&arn);
            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }
            let response = request.send().await.map_err(|e| classify(&e, topic))?;
            subscriptions.extend(response.subscriptions().iter().map(|s| SubscriptionInfo {
                arn: s.subscription_arn().unwrap_or_default().to_string(),
                protocol: s.protocol().unwrap_or_default().to_string(),
                endpoint: s.endpoint().unwrap_or_default().to_string(),
            }));
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(subscriptions)
    }

    async fn set_access_policy(&self, topic: &str, policy: &str) -> Result<(), PrimitiveError> {
        serde_json::from_str::<serde_json::Value>(policy).map_err(|e| {
            PrimitiveError::invalid(
                format!("access policy is not valid JSON: {e}"),
                "Pass an IAM policy document as JSON.",
            )
        })?;
        let arn = self.resolve_arn(topic).await?;
        self.client
            .set_topic_attributes()
            .topic_arn(&arn)
            .attribute_name("Policy")
            .attribute_value(policy)
            .send()
            .await
            .map_err(|e| classify(&e, topic))?;
        Ok(())
    }
}
