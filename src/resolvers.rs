//! The typed `(TypeName, FieldName) → Resolver` mapping attached to a type
//! system.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_graphql::{Value, dynamic::ResolverContext};
use serde::Serialize;

use crate::{
    delegation::Delegation,
    error::InitError,
    type_system::{FieldCoordinate, TypeSystem},
};

type ResolveFn =
    dyn Fn(&ResolverContext<'_>) -> async_graphql::Result<Option<Value>> + Send + Sync;

/// An in-process resolver. Returns the field value, or `None` for null.
#[derive(Clone)]
pub struct LocalResolver(Arc<ResolveFn>);

impl LocalResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&ResolverContext<'_>) -> async_graphql::Result<Option<Value>> + Send + Sync + 'static,
    {
        LocalResolver(Arc::new(resolve))
    }

    pub fn resolve(&self, ctx: &ResolverContext<'_>) -> async_graphql::Result<Option<Value>> {
        (self.0)(ctx)
    }
}

#[derive(Clone)]
pub enum Resolver {
    Local(LocalResolver),
    Delegate(Delegation),
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolver::Local(_) => f.write_str("Local"),
            Resolver::Delegate(delegation) => write!(f, "Delegate({delegation:?})"),
        }
    }
}

/// Fields without a binding resolve by reading the same-named property of
/// their parent value. Root fields have no parent and must be bound.
#[derive(Clone, Debug, Default)]
pub struct ResolverMap {
    bindings: BTreeMap<FieldCoordinate, Resolver>,
}

impl ResolverMap {
    pub fn new() -> Self {
        ResolverMap::default()
    }

    pub fn bind(&mut self, coordinate: FieldCoordinate, resolver: Resolver) -> Result<(), InitError> {
        if self.bindings.contains_key(&coordinate) {
            return Err(InitError::DuplicateBinding(coordinate));
        }
        self.bindings.insert(coordinate, resolver);
        Ok(())
    }

    pub fn local<F>(mut self, type_name: &str, field_name: &str, resolve: F) -> Result<Self, InitError>
    where
        F: Fn(&ResolverContext<'_>) -> async_graphql::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.bind(
            FieldCoordinate::new(type_name, field_name),
            Resolver::Local(LocalResolver::new(resolve)),
        )?;
        Ok(self)
    }

    pub fn delegate(
        mut self,
        type_name: &str,
        field_name: &str,
        delegation: Delegation,
    ) -> Result<Self, InitError> {
        self.bind(
            FieldCoordinate::new(type_name, field_name),
            Resolver::Delegate(delegation),
        )?;
        Ok(self)
    }

    pub fn merge(mut self, other: ResolverMap) -> Result<Self, InitError> {
        for (coordinate, resolver) in other.bindings {
            self.bind(coordinate, resolver)?;
        }
        Ok(self)
    }

    pub fn get(&self, coordinate: &FieldCoordinate) -> Option<&Resolver> {
        self.bindings.get(coordinate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldCoordinate, &Resolver)> {
        self.bindings.iter()
    }

    /// Every binding must name a declared field, and every delegation must
    /// agree with both the merged and the remote type system.
    pub fn validate(&self, type_system: &TypeSystem) -> Result<(), InitError> {
        for (coordinate, resolver) in &self.bindings {
            if type_system
                .field(&coordinate.type_name, &coordinate.field_name)
                .is_none()
            {
                return Err(InitError::UnknownField(coordinate.clone()));
            }
            if let Resolver::Delegate(delegation) = resolver {
                delegation.validate(coordinate, type_system)?;
            }
        }
        Ok(())
    }
}

/// A property of the parent object, when the parent is a plain value.
pub fn parent_field<'a>(ctx: &ResolverContext<'a>, name: &str) -> Option<&'a Value> {
    match ctx.parent_value.as_value()? {
        Value::Object(object) => object.get(name),
        _ => None,
    }
}

/// An optional `Int` argument; `None` when absent or null.
pub fn int_argument(ctx: &ResolverContext<'_>, name: &str) -> async_graphql::Result<Option<i32>> {
    match ctx.args.get(name) {
        Some(value) if !value.is_null() => Ok(Some(i32::try_from(value.i64()?)?)),
        _ => Ok(None),
    }
}

pub fn to_value<T: Serialize>(record: &T) -> async_graphql::Result<Value> {
    Ok(Value::from_json(serde_json::to_value(record)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn type_system() -> TypeSystem {
        TypeSystem::parse(
            "books",
            "type Query { books: [Book] } type Book { title: String! authorId: Int }",
        )
        .unwrap()
    }

    #[test]
    fn second_binding_for_a_field_is_rejected() {
        let err = ResolverMap::new()
            .local("Query", "books", |_| Ok(None))
            .unwrap()
            .local("Query", "books", |_| Ok(None))
            .unwrap_err();
        assert_eq!(err.to_string(), "field `Query.books` already has a resolver");
    }

    #[test]
    fn merge_rejects_overlapping_bindings() {
        let left = ResolverMap::new().local("Query", "books", |_| Ok(None)).unwrap();
        let right = ResolverMap::new().local("Query", "books", |_| Ok(None)).unwrap();
        assert!(matches!(
            left.merge(right),
            Err(InitError::DuplicateBinding(_))
        ));
    }

    #[test]
    fn bindings_must_name_declared_fields() {
        let resolvers = ResolverMap::new()
            .local("Book", "isbn", |_| Ok(None))
            .unwrap();
        let err = resolvers.validate(&type_system()).unwrap_err();
        assert!(matches!(err, InitError::UnknownField(c) if c.to_string() == "Book.isbn"));
    }

    #[test]
    fn declared_bindings_validate() {
        let resolvers = ResolverMap::new()
            .local("Query", "books", |_| Ok(Some(Value::List(vec![]))))
            .unwrap();
        resolvers.validate(&type_system()).unwrap();
        assert_eq!(resolvers.iter().count(), 1);
    }
}
