//! HTTP transport for the aggregation endpoint.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ProblemDetail, ProblemEnvelope, QueryError, QueryResult};
use crate::logging::truncate_field;

/// Sends JSON requests to the aggregation endpoint.
///
/// Each call is a single attempt: there is no retry, no response caching and
/// no de-duplication of identical concurrent requests. Cloning is cheap and
/// shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct AggregationClient {
    config: Arc<ClientConfig>,
    client: Client,
}

impl AggregationClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: ClientConfig) -> QueryResult<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            QueryError::invalid_config(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POSTs `body` as JSON to `endpoint` and decodes the JSON response.
    ///
    /// Cancelling `cancellation` aborts the in-flight request and yields
    /// [`QueryError::Cancelled`]; a token that is already cancelled prevents
    /// the request from being sent at all.
    #[instrument(skip(self, body, cancellation), fields(base_url = %self.config.base_url()))]
    pub async fn post_json<B, T>(
        &self,
        endpoint: &str,
        body: &B,
        cancellation: &CancellationToken,
    ) -> QueryResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if cancellation.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let url = self.config.endpoint_url(endpoint)?;
        let log = self.config.log_config();
        if log.log_request_bodies {
            let json = serde_json::to_string(body)?;
            debug!(endpoint, body = %truncate_field(&json, log.max_field_length), "sending request");
        }
        let request = self.client.post(url).json(body);

        let exchange = async {
            let response = request.send().await.map_err(|e| QueryError::Network {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
            self.handle_response(endpoint, response).await
        };

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                debug!(endpoint, "request cancelled");
                Err(QueryError::Cancelled)
            }
            result = exchange => result,
        }
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> QueryResult<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| QueryError::Serialization(format!("{endpoint}: {e}")))
        } else {
            Err(self.error_from_response(endpoint, response).await)
        }
    }

    /// Convert an error response to a [`QueryError::RemoteRequest`].
    async fn error_from_response(&self, endpoint: &str, response: reqwest::Response) -> QueryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let problem = match serde_json::from_str::<ProblemEnvelope>(&body) {
            Ok(envelope) => envelope.error,
            Err(_) => ProblemDetail {
                title: status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string(),
                detail: (!body.trim().is_empty()).then_some(body),
                status: Some(status.as_u16()),
            },
        };

        warn!(
            endpoint,
            status = status.as_u16(),
            problem = %truncate_field(&problem.to_string(), self.config.log_config().max_field_length),
            "aggregation endpoint rejected request"
        );

        QueryError::RemoteRequest {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            problem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_for(url: &str) -> AggregationClient {
        AggregationClient::new(ClientConfig::new(url).unwrap()).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = client_for("http://localhost:1");
        assert_eq!(client.config().base_url().as_str(), "http://localhost:1/");
    }

    #[tokio::test]
    async fn test_cancelled_token_sends_nothing() {
        let client = client_for("http://localhost:1");
        let token = CancellationToken::new();
        token.cancel();

        let result: QueryResult<serde_json::Value> =
            client.post_json("aggregated", &json!({}), &token).await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = client_for("http://localhost:1");
        let result: QueryResult<serde_json::Value> = client
            .post_json("aggregated", &json!({}), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(QueryError::Network { .. })));
    }
}
