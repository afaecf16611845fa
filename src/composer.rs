//! Builds the executable schema of each variant. Composition runs exactly
//! once, before the listener is bound; a failure at any stage aborts it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::dynamic::Schema;
use tracing::Instrument;

use crate::{
    delegation::Delegation,
    error::InitError,
    executable::build_schema,
    link::{HttpLink, Link},
    local_schema::{self, BOOK_AUTHOR_SDL},
    remote::{RemoteSchema, introspect_schema},
    resolvers::{Resolver, ResolverMap},
    store::Library,
    type_system::{OperationKind, TypeSystem},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Books and authors served from one process, no remote.
    Local,
    /// The authors service other gateways stitch in.
    Authors,
    /// Local books stitched with the remote authors service.
    Stitched { remote_url: String, timeout: Duration },
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Local => f.write_str("local"),
            Variant::Authors => f.write_str("authors"),
            Variant::Stitched { .. } => f.write_str("stitched"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Start,
    Introspecting,
    Merging,
    Ready,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Introspecting => "introspecting",
            Stage::Merging => "merging",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage) {
    tracing::debug!(%stage, "Composition stage");
}

fn finish(result: Result<Schema, InitError>) -> Result<Schema, InitError> {
    match &result {
        Ok(_) => enter(Stage::Ready),
        Err(e) => tracing::error!(stage = %Stage::Failed, "Schema composition failed: {}", e),
    }
    result
}

pub async fn compose(variant: &Variant, library: Arc<Library>) -> Result<Schema, InitError> {
    match variant {
        Variant::Local => compose_local(library),
        Variant::Authors => compose_authors(library),
        Variant::Stitched {
            remote_url,
            timeout,
        } => {
            let link = HttpLink::new(remote_url.as_str(), *timeout)?;
            compose_stitched(library, Arc::new(link)).await
        }
    }
}

pub fn compose_local(library: Arc<Library>) -> Result<Schema, InitError> {
    let _span = tracing::info_span!("compose", variant = "local").entered();
    enter(Stage::Start);
    finish(local_schema::bookshelf(library).and_then(|schema| {
        enter(Stage::Merging);
        build_schema(schema.type_system, schema.resolvers)
    }))
}

pub fn compose_authors(library: Arc<Library>) -> Result<Schema, InitError> {
    let _span = tracing::info_span!("compose", variant = "authors").entered();
    enter(Stage::Start);
    finish(
        local_schema::authors(library)
            .and_then(|schema| build_schema(schema.type_system, schema.resolvers)),
    )
}

/// Introspects the schema behind `link`, merges it with the local books
/// schema and delegates `Book.author` to the remote `author(id:)` field.
pub async fn compose_stitched(
    library: Arc<Library>,
    link: Arc<dyn Link>,
) -> Result<Schema, InitError> {
    let span = tracing::info_span!("compose", variant = "stitched", remote = %link.uri());
    async move {
        enter(Stage::Start);
        finish(stitch(library, link).await)
    }
    .instrument(span)
    .await
}

async fn stitch(library: Arc<Library>, link: Arc<dyn Link>) -> Result<Schema, InitError> {
    let local = local_schema::books(library)?;

    enter(Stage::Introspecting);
    let remote = Arc::new(introspect_schema(link).await?);

    enter(Stage::Merging);
    let type_system = local
        .type_system
        .merge(remote.type_system().clone())?
        .extend("book_author.graphql", BOOK_AUTHOR_SDL)?;

    let resolvers = forward_remote_roots(local.resolvers, &type_system, &remote)?.delegate(
        "Book",
        "author",
        Delegation::to_field(Arc::clone(&remote), OperationKind::Query, "author")
            .requires(["authorId"])
            .map_argument("id", "authorId"),
    )?;

    tracing::info!(
        "Merged schema has {} types ({} from the remote)",
        type_system.types().count(),
        remote.type_system().types().count()
    );
    for (coordinate, resolver) in resolvers.iter() {
        if let Resolver::Delegate(delegation) = resolver {
            tracing::debug!(
                "{} delegates to remote `{}`, requires {:?}",
                coordinate,
                delegation.target_field(),
                delegation.required_fields()
            );
        }
    }
    tracing::debug!("Merged schema:\n{}", type_system.sdl());
    build_schema(type_system, resolvers)
}

/// Binds every remote root field, under the merged root type of the same
/// role, to a delegation passing the client's arguments through.
fn forward_remote_roots(
    mut resolvers: ResolverMap,
    merged: &TypeSystem,
    remote: &Arc<RemoteSchema>,
) -> Result<ResolverMap, InitError> {
    for operation in [OperationKind::Query, OperationKind::Mutation] {
        let (Some(remote_root), Some(merged_root)) = (
            remote.type_system().root_type(operation),
            merged.root_type(operation),
        ) else {
            continue;
        };
        for field in remote.type_system().fields(remote_root).unwrap_or_default() {
            resolvers = resolvers.delegate(
                merged_root,
                &field.name,
                Delegation::forward(Arc::clone(remote), operation, &field.name),
            )?;
        }
    }
    Ok(resolvers)
}
