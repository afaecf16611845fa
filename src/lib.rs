pub mod composer;
pub mod config;
pub mod delegation;
pub mod error;
pub mod executable;
pub mod introspection;
pub mod link;
pub mod local_schema;
pub mod logging;
pub mod remote;
pub mod resolvers;
pub mod server;
pub mod store;
pub mod type_system;

pub use composer::{Variant, compose, compose_authors, compose_local, compose_stitched};
pub use link::{HttpLink, Link};
pub use server::{FrontDoor, Server, ShutdownSignal};
pub use store::Library;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GraphQL operation as sent over a [`Link`].
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }
}

/// A GraphQL response received over a [`Link`].
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct GraphQLResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RemoteError>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        RemoteError {
            message: message.into(),
            path: Vec::new(),
        }
    }
}
