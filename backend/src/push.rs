//! Push notification delivery.
//!
//! [`PushSender`] is the multicast seam the dispatcher talks to. The
//! production implementation sends through Apple Push Notification Service;
//! [`RecordingPushSender`] keeps every batch in memory.
//!
//! Delivery is best-effort: per-token outcomes are reported back so that
//! dead tokens can be cleaned up, nothing is retried.

use crate::config::Config;
use a2::request::payload::Payload;
use a2::response::ErrorReason;
use a2::{
    Client, ClientConfig, DefaultNotificationBuilder, Endpoint, NotificationBuilder,
    NotificationOptions, Priority, PushType,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Maximum number of tokens in one multicast call.
pub const MULTICAST_LIMIT: usize = 500;

/// Result of one token within a multicast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The push service no longer accepts this token.
    InvalidToken,
    /// Any other failure; the token is kept.
    Failed(String),
}

impl SendOutcome {
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, SendOutcome::InvalidToken)
    }
}

/// Errors that fail a whole multicast
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push delivery is not configured")]
    Disabled,

    #[error("multicast exceeds {MULTICAST_LIMIT} tokens (got {0})")]
    TooManyTokens(usize),
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Send the same data message to every token.
    ///
    /// Returns one outcome per token, in input order.
    async fn send_multicast(
        &self,
        tokens: &[String],
        data: &BTreeMap<String, String>,
    ) -> Result<Vec<SendOutcome>, PushError>;
}

/// APNS-backed sender
pub struct ApnsPushSender {
    client: Option<Client>,
    bundle_id: String,
}

impl ApnsPushSender {
    /// Build a sender from configuration. Disabled (with a warning) when
    /// credentials are missing or unreadable.
    pub async fn new(config: &Config) -> Self {
        let Some(apns) = config.apns.as_ref() else {
            warn!("APNS not configured - push notifications disabled");
            return Self::disabled();
        };

        let key_pem = match tokio::fs::read(&apns.key_path).await {
            Ok(pem) => pem,
            Err(e) => {
                error!(path = %apns.key_path.display(), error = %e, "Failed to read APNS key file");
                return Self::disabled();
            }
        };

        let endpoint = if apns.sandbox {
            Endpoint::Sandbox
        } else {
            Endpoint::Production
        };

        let client = match Client::token(
            &mut &key_pem[..],
            &apns.key_id,
            &apns.team_id,
            ClientConfig::new(endpoint),
        ) {
            Ok(c) => Some(c),
            Err(e) => {
                error!(error = %e, "Failed to create APNS client");
                None
            }
        };

        if client.is_some() {
            debug!(sandbox = apns.sandbox, "APNS client initialized");
        }

        Self {
            client,
            bundle_id: apns.bundle_id.clone(),
        }
    }

    fn disabled() -> Self {
        Self {
            client: None,
            bundle_id: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn send_one(
        &self,
        client: &Client,
        token: &str,
        data: &BTreeMap<String, String>,
    ) -> SendOutcome {
        let payload = match data_payload(token, &self.bundle_id, data) {
            Ok(payload) => payload,
            Err(e) => return SendOutcome::Failed(e.to_string()),
        };

        match client.send(payload).await {
            Ok(_) => SendOutcome::Delivered,
            Err(a2::Error::ResponseError(response)) => {
                let reason = response.error.map(|body| body.reason);
                match reason {
                    Some(
                        ErrorReason::Unregistered
                        | ErrorReason::BadDeviceToken
                        | ErrorReason::DeviceTokenNotForTopic,
                    ) => SendOutcome::InvalidToken,
                    other => SendOutcome::Failed(format!(
                        "APNS rejected push (status {}, reason {:?})",
                        response.code, other
                    )),
                }
            }
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }
}

/// Silent data-only push: content-available with the data map as custom
/// keys and no alert. The app renders the notification itself.
fn data_payload<'a>(
    token: &'a str,
    topic: &'a str,
    data: &'a BTreeMap<String, String>,
) -> Result<Payload<'a>, a2::Error> {
    let options = NotificationOptions {
        apns_priority: Some(Priority::Normal),
        apns_topic: Some(topic),
        apns_push_type: Some(PushType::Background),
        ..Default::default()
    };

    let mut payload = DefaultNotificationBuilder::new()
        .set_content_available()
        .build(token, options);
    for (key, value) in data {
        payload.add_custom_data(key, value)?;
    }
    Ok(payload)
}

#[async_trait]
impl PushSender for ApnsPushSender {
    async fn send_multicast(
        &self,
        tokens: &[String],
        data: &BTreeMap<String, String>,
    ) -> Result<Vec<SendOutcome>, PushError> {
        let client = self.client.as_ref().ok_or(PushError::Disabled)?;
        if tokens.len() > MULTICAST_LIMIT {
            return Err(PushError::TooManyTokens(tokens.len()));
        }

        let sends = tokens.iter().map(|t| self.send_one(client, t, data));
        let outcomes = futures::future::join_all(sends).await;

        let delivered = outcomes
            .iter()
            .filter(|o| **o == SendOutcome::Delivered)
            .count();
        debug!(total = tokens.len(), delivered, "Sent multicast");

        Ok(outcomes)
    }
}

/// Create the configured sender
pub async fn create_sender(config: &Config) -> Arc<dyn PushSender> {
    Arc::new(ApnsPushSender::new(config).await)
}

/// One recorded multicast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBatch {
    pub tokens: Vec<String>,
    pub data: BTreeMap<String, String>,
}

/// In-memory sender for tests and offline runs.
///
/// Tokens registered with [`RecordingPushSender::reject_token`] come back
/// as [`SendOutcome::InvalidToken`].
#[derive(Debug, Default)]
pub struct RecordingPushSender {
    batches: Mutex<Vec<SentBatch>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_token(&self, token: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(token.to_string());
        }
    }

    /// Every multicast so far, in send order.
    pub fn batches(&self) -> Vec<SentBatch> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send_multicast(
        &self,
        tokens: &[String],
        data: &BTreeMap<String, String>,
    ) -> Result<Vec<SendOutcome>, PushError> {
        if tokens.len() > MULTICAST_LIMIT {
            return Err(PushError::TooManyTokens(tokens.len()));
        }

        let outcomes = match self.rejected.lock() {
            Ok(rejected) => tokens
                .iter()
                .map(|t| {
                    if rejected.contains(t) {
                        SendOutcome::InvalidToken
                    } else {
                        SendOutcome::Delivered
                    }
                })
                .collect(),
            Err(_) => vec![SendOutcome::Delivered; tokens.len()],
        };

        if let Ok(mut batches) = self.batches.lock() {
            batches.push(SentBatch {
                tokens: tokens.to_vec(),
                data: data.clone(),
            });
        }

        Ok(outcomes)
    }
}
