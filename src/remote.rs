use std::sync::Arc;

use graphql_tools::introspection::IntrospectionQuery;

use crate::{
    GraphQLRequest,
    error::IntrospectionError,
    introspection::{INTROSPECTION_QUERY, introspection_to_document},
    link::Link,
    type_system::TypeSystem,
};

/// The local shadow of a schema served by another process, together with the
/// link used to reach it. Built once at startup and never refreshed.
pub struct RemoteSchema {
    type_system: TypeSystem,
    link: Arc<dyn Link>,
}

impl RemoteSchema {
    pub fn type_system(&self) -> &TypeSystem {
        &self.type_system
    }

    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }
}

impl std::fmt::Debug for RemoteSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSchema")
            .field("uri", &self.link.uri())
            .finish_non_exhaustive()
    }
}

/// Sends the introspection query through `link` and converts the result.
/// One shot: no retries, and the result is never refreshed.
pub async fn introspect_schema(link: Arc<dyn Link>) -> Result<RemoteSchema, IntrospectionError> {
    tracing::info!("Introspecting remote schema at {}", link.uri());

    let mut request = GraphQLRequest::new(INTROSPECTION_QUERY);
    request.operation_name = Some("IntrospectionQuery".to_string());
    let response = link.execute(request).await?;

    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(IntrospectionError::Rejected(messages.join("; ")));
    }

    let data = response
        .data
        .ok_or_else(|| IntrospectionError::Malformed("response has no data".to_string()))?;
    let introspection: IntrospectionQuery =
        serde_json::from_value(data).map_err(|e| IntrospectionError::Malformed(e.to_string()))?;
    let document = introspection_to_document(introspection)?;
    let type_system = TypeSystem::from_document(document)
        .map_err(|e| IntrospectionError::Malformed(e.to_string()))?;

    tracing::info!(
        "Remote schema at {} exposes {} types",
        link.uri(),
        type_system.types().count()
    );

    Ok(RemoteSchema { type_system, link })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GraphQLResponse, RemoteError, error::LinkError};
    use async_trait::async_trait;

    struct Canned(Result<GraphQLResponse, ()>);

    #[async_trait]
    impl Link for Canned {
        fn uri(&self) -> &str {
            "canned://remote"
        }

        async fn execute(&self, _request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
            match &self.0 {
                Ok(response) => Ok(response.clone()),
                Err(()) => Err(LinkError::Status {
                    uri: self.uri().to_string(),
                    status: reqwest::StatusCode::BAD_GATEWAY,
                }),
            }
        }
    }

    #[tokio::test]
    async fn transport_failure_is_remote_unavailable() {
        let err = introspect_schema(Arc::new(Canned(Err(())))).await.unwrap_err();
        assert!(matches!(err, IntrospectionError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn graphql_errors_reject_introspection() {
        let response = GraphQLResponse {
            data: None,
            errors: vec![RemoteError::new("introspection is disabled")],
        };
        let err = introspect_schema(Arc::new(Canned(Ok(response)))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote service rejected the introspection query: introspection is disabled"
        );
    }

    #[tokio::test]
    async fn unexpected_data_is_malformed() {
        let response = GraphQLResponse {
            data: Some(serde_json::json!({ "hello": "world" })),
            errors: vec![],
        };
        let err = introspect_schema(Arc::new(Canned(Ok(response)))).await.unwrap_err();
        assert!(matches!(err, IntrospectionError::Malformed(_)));
    }
}
