use std::{io, net::SocketAddr};

use reqwest::StatusCode;

use crate::type_system::FieldCoordinate;

/// Failures of the transport [`Link`](crate::link::Link).
#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("failed to reach {uri}: {source}")]
    Unreachable { uri: String, source: reqwest::Error },
    #[error("failed to read response body from {uri}: {source}")]
    Body { uri: String, source: reqwest::Error },
    #[error("unexpected HTTP status {status} from {uri}")]
    Status { uri: String, status: StatusCode },
    #[error("malformed GraphQL response from {uri}: {source}")]
    Decode {
        uri: String,
        source: serde_json::Error,
    },
}

/// Reasons a remote schema could not be introspected.
#[derive(thiserror::Error, Debug)]
pub enum IntrospectionError {
    #[error("remote schema unavailable: {0}")]
    RemoteUnavailable(#[from] LinkError),
    #[error("remote service rejected the introspection query: {0}")]
    Rejected(String),
    #[error("malformed introspection result: {0}")]
    Malformed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to read data file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse library data: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Everything that can abort initialization. None of these are recovered:
/// the process never binds its listener once one has occurred.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Introspection(#[from] IntrospectionError),
    #[error("failed to parse schema document `{name}`: {message}")]
    SchemaParse { name: String, message: String },
    #[error("type `{0}` is defined by both the local and the remote schema")]
    TypeCollision(String),
    #[error("field `{0}` is defined more than once")]
    FieldCollision(FieldCoordinate),
    #[error("cannot extend unknown type `{0}`")]
    UnknownExtensionTarget(String),
    #[error("type `{type_name}` references unknown type `{referenced}`")]
    UnknownTypeReference {
        type_name: String,
        referenced: String,
    },
    #[error("resolver bound to unknown field `{0}`")]
    UnknownField(FieldCoordinate),
    #[error("field `{0}` already has a resolver")]
    DuplicateBinding(FieldCoordinate),
    #[error("root field `{0}` has no resolver")]
    MissingResolver(FieldCoordinate),
    #[error("delegation for `{coordinate}` requires unknown parent field `{field}`")]
    UnknownRequiredField {
        coordinate: FieldCoordinate,
        field: String,
    },
    #[error("delegation for `{coordinate}` targets unknown remote field `{target}`")]
    UnknownDelegationTarget {
        coordinate: FieldCoordinate,
        target: String,
    },
    #[error("delegation for `{coordinate}` maps unknown remote argument `{argument}`")]
    UnknownDelegationArgument {
        coordinate: FieldCoordinate,
        argument: String,
    },
    #[error("failed to build executable schema: {0}")]
    Build(#[from] async_graphql::dynamic::SchemaError),
}

/// Top-level failures of the `bookshelf` process; any of them exits with 1.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("failed to install signal handlers: {0}")]
    Signal(io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}
