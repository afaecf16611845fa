use std::time::Duration;

use async_trait::async_trait;

use crate::{GraphQLRequest, GraphQLResponse, error::LinkError};

/// A transport bound to one remote GraphQL endpoint. Introspection and every
/// delegated sub-operation go through the same link.
#[async_trait]
pub trait Link: Send + Sync {
    fn uri(&self) -> &str;

    async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError>;
}

pub struct HttpLink {
    client: reqwest::Client,
    uri: String,
}

impl HttpLink {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self, LinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LinkError::Client)?;
        Ok(HttpLink {
            client,
            uri: uri.into(),
        })
    }
}

#[async_trait]
impl Link for HttpLink {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
        tracing::debug!(uri = %self.uri, operation = ?request.operation_name, "Sending remote operation");

        let response = self
            .client
            .post(&self.uri)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|source| LinkError::Unreachable {
                uri: self.uri.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|source| LinkError::Body {
            uri: self.uri.clone(),
            source,
        })?;

        // GraphQL-over-HTTP servers may answer 4xx with a regular GraphQL
        // error body; only fall back to the status when there is none.
        match serde_json::from_slice::<GraphQLResponse>(&body) {
            Ok(graphql_response) => Ok(graphql_response),
            Err(_) if !status.is_success() => Err(LinkError::Status {
                uri: self.uri.clone(),
                status,
            }),
            Err(source) => Err(LinkError::Decode {
                uri: self.uri.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_reported() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let link = HttpLink::new("http://127.0.0.1:9/graphql", Duration::from_secs(2)).unwrap();
        let err = link
            .execute(GraphQLRequest::new("{ __typename }"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Unreachable { .. }), "{err}");
        assert_eq!(link.uri(), "http://127.0.0.1:9/graphql");
    }
}
