//! `signatureSubscribe` push channel over the node's websocket

use async_trait::async_trait;
use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcSignatureSubscribeConfig;
use solana_client::rpc_response::RpcSignatureResult;
use solana_sdk::signature::Signature;
use tracing::{debug, info};

use super::{SignatureNotification, SignatureSubscriber};
use crate::rpc_manager::rpc_client::redact_endpoint;
use crate::rpc_manager::{ConfirmationLevel, NodeTransactionError, RpcManagerError};

/// Websocket subscriber backed by [`PubsubClient`]
pub struct PubsubSignatureSubscriber {
    client: PubsubClient,
    endpoint: String,
}

impl PubsubSignatureSubscriber {
    /// Connect to the websocket endpoint
    pub async fn connect(ws_url: &str) -> Result<Self, RpcManagerError> {
        let endpoint = redact_endpoint(ws_url);
        info!(endpoint = %endpoint, "Connecting signature subscriber");

        let client = PubsubClient::new(ws_url)
            .await
            .map_err(|e| RpcManagerError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }
}

impl std::fmt::Debug for PubsubSignatureSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubSignatureSubscriber")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl SignatureSubscriber for PubsubSignatureSubscriber {
    async fn wait_for_signature(
        &self,
        signature: &Signature,
        level: ConfirmationLevel,
    ) -> Result<SignatureNotification, RpcManagerError> {
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(level.commitment_config()),
            enable_received_notification: Some(false),
        };

        let (mut notifications, unsubscribe) = self
            .client
            .signature_subscribe(signature, Some(config))
            .await
            .map_err(|e| RpcManagerError::Transport {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;

        debug!(signature = %signature, level = %level, "Signature subscription active");

        let result = loop {
            match notifications.next().await {
                Some(response) => match response.value {
                    RpcSignatureResult::ProcessedSignature(processed) => {
                        break Ok(SignatureNotification {
                            slot: response.context.slot,
                            err: processed.err.as_ref().map(NodeTransactionError::decode),
                        });
                    }
                    RpcSignatureResult::ReceivedSignature(_) => continue,
                },
                None => {
                    break Err(RpcManagerError::Transport {
                        endpoint: self.endpoint.clone(),
                        message: "signature subscription closed".to_string(),
                    });
                }
            }
        };

        drop(notifications);
        unsubscribe().await;
        result
    }
}
