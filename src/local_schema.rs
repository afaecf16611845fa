//! Schemas resolved entirely in-process from the [`Library`].

use std::sync::Arc;

use async_graphql::Value;

use crate::{
    error::InitError,
    resolvers::{ResolverMap, int_argument, parent_field, to_value},
    store::Library,
    type_system::TypeSystem,
};

pub const BOOKS_SDL: &str = include_str!(concat!(env!("OUT_SCHEMAS"), "/books.graphql"));
pub const AUTHORS_SDL: &str = include_str!(concat!(env!("OUT_SCHEMAS"), "/authors.graphql"));
pub const BOOK_AUTHOR_SDL: &str =
    include_str!(concat!(env!("OUT_SCHEMAS"), "/book_author.graphql"));

/// A type system together with the resolvers that serve it.
#[derive(Debug)]
pub struct LocalSchema {
    pub type_system: TypeSystem,
    pub resolvers: ResolverMap,
}

/// `Query { books }` over the books table.
pub fn books(library: Arc<Library>) -> Result<LocalSchema, InitError> {
    let type_system = TypeSystem::parse("books.graphql", BOOKS_SDL)?;
    let resolvers = ResolverMap::new().local("Query", "books", move |_| {
        tracing::info!("Fetching books");
        let books = library.books().map(to_value).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Value::List(books)))
    })?;

    Ok(LocalSchema {
        type_system,
        resolvers,
    })
}

/// `Query { author(id), authors }` over the authors table. This is what the
/// `authors` service exposes for other gateways to introspect.
pub fn authors(library: Arc<Library>) -> Result<LocalSchema, InitError> {
    let type_system = TypeSystem::parse("authors.graphql", AUTHORS_SDL)?;
    let by_id = Arc::clone(&library);
    let resolvers = ResolverMap::new()
        .local("Query", "author", move |ctx| {
            let Some(id) = int_argument(ctx, "id")? else {
                return Ok(None);
            };
            tracing::debug!("Fetching author {}", id);
            match by_id.author(id) {
                Some(author) => Ok(Some(to_value(author)?)),
                None => Err(async_graphql::Error::new(format!("no author with id {id}"))),
            }
        })?
        .local("Query", "authors", move |_| {
            let authors = library.authors().map(to_value).collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Value::List(authors)))
        })?;

    Ok(LocalSchema {
        type_system,
        resolvers,
    })
}

/// Books and authors in one process, with `Book.author` looked up directly
/// in the authors table.
pub fn bookshelf(library: Arc<Library>) -> Result<LocalSchema, InitError> {
    let books = books(Arc::clone(&library))?;
    let authors = authors(Arc::clone(&library))?;

    let type_system = books
        .type_system
        .merge(authors.type_system)?
        .extend("book_author.graphql", BOOK_AUTHOR_SDL)?;
    let resolvers = books
        .resolvers
        .merge(authors.resolvers)?
        .local("Book", "author", move |ctx| {
            let id = match parent_field(ctx, "authorId") {
                Some(Value::Number(id)) => id.as_i64(),
                _ => None,
            };
            let author = id
                .and_then(|id| i32::try_from(id).ok())
                .and_then(|id| library.author(id));
            author.map(to_value).transpose()
        })?;

    Ok(LocalSchema {
        type_system,
        resolvers,
    })
}
