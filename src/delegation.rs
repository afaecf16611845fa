//! Field resolution delegated to a remote schema.
//!
//! A [`Delegation`] is a declarative rule: which remote root field to call,
//! which parent fields must be present before the call, and how the remote
//! arguments are filled. At query time it turns the client's sub-selection
//! into a standalone operation, sends it through the remote schema's link and
//! hands back the remote field value unchanged.

use std::fmt;
use std::sync::Arc;

use async_graphql::{PathSegment, SelectionField, ServerError, Value, dynamic::ResolverContext};
use graphql_parser::query::{
    Definition, Document, Field, InlineFragment, Mutation, OperationDefinition, Query,
    Selection, SelectionSet, TypeCondition, VariableDefinition,
};

use crate::{
    GraphQLRequest, RemoteError,
    error::InitError,
    remote::RemoteSchema,
    resolvers::parent_field,
    type_system::{FieldCoordinate, OperationKind, SchemaField, TypeSystem, named_type},
};

type QueryValue = graphql_parser::query::Value<'static, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgumentMapping {
    pub argument: String,
    pub parent_field: String,
}

#[derive(Clone)]
pub struct Delegation {
    remote: Arc<RemoteSchema>,
    operation: OperationKind,
    target_field: String,
    requires: Vec<String>,
    arguments: Vec<ArgumentMapping>,
    forward_arguments: bool,
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("operation", &self.operation)
            .field("target_field", &self.target_field)
            .field("requires", &self.requires)
            .field("arguments", &self.arguments)
            .field("forward_arguments", &self.forward_arguments)
            .finish()
    }
}

impl Delegation {
    /// Delegates to `target_field` on the remote root of `operation`. Remote
    /// arguments come only from [`Delegation::map_argument`].
    pub fn to_field(
        remote: Arc<RemoteSchema>,
        operation: OperationKind,
        target_field: impl Into<String>,
    ) -> Self {
        Delegation {
            remote,
            operation,
            target_field: target_field.into(),
            requires: Vec::new(),
            arguments: Vec::new(),
            forward_arguments: false,
        }
    }

    /// Exposes a remote root field as-is, passing the client's arguments
    /// through.
    pub fn forward(
        remote: Arc<RemoteSchema>,
        operation: OperationKind,
        target_field: impl Into<String>,
    ) -> Self {
        Delegation {
            forward_arguments: true,
            ..Delegation::to_field(remote, operation, target_field)
        }
    }

    /// Parent fields that must be fetched before the delegation runs.
    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.requires.contains(&field) {
                self.requires.push(field);
            }
        }
        self
    }

    /// Sets the remote `argument` from the parent's `parent_field`, which
    /// becomes a required field.
    pub fn map_argument(mut self, argument: impl Into<String>, parent_field: impl Into<String>) -> Self {
        let parent_field = parent_field.into();
        self = self.requires([parent_field.clone()]);
        self.arguments.push(ArgumentMapping {
            argument: argument.into(),
            parent_field,
        });
        self
    }

    pub fn required_fields(&self) -> &[String] {
        &self.requires
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    pub fn validate(&self, coordinate: &FieldCoordinate, merged: &TypeSystem) -> Result<(), InitError> {
        for field in &self.requires {
            if merged.field(&coordinate.type_name, field).is_none() {
                return Err(InitError::UnknownRequiredField {
                    coordinate: coordinate.clone(),
                    field: field.clone(),
                });
            }
        }

        let target = self.target().ok_or_else(|| InitError::UnknownDelegationTarget {
            coordinate: coordinate.clone(),
            target: format!("{} {}", self.operation, self.target_field),
        })?;

        for mapping in &self.arguments {
            if !target.arguments.iter().any(|arg| arg.name == mapping.argument) {
                return Err(InitError::UnknownDelegationArgument {
                    coordinate: coordinate.clone(),
                    argument: mapping.argument.clone(),
                });
            }
        }

        Ok(())
    }

    fn target(&self) -> Option<&SchemaField> {
        let remote = self.remote.type_system();
        remote.field(remote.root_type(self.operation)?, &self.target_field)
    }

    /// Runs the delegation for one parent value. A failed call is an error of
    /// this field only. Errors the remote reports next to partial data are
    /// added to the response under this field's path.
    pub async fn resolve(&self, ctx: &ResolverContext<'_>) -> async_graphql::Result<Option<Value>> {
        let Some(request) = self.build_request(ctx)? else {
            return Ok(None);
        };

        tracing::debug!(
            "Delegating {} to {}:\n{}",
            self.target_field,
            self.remote.link().uri(),
            request.query
        );

        let response = self.remote.link().execute(request).await.map_err(|e| {
            tracing::warn!("Delegation of `{}` failed: {}", self.target_field, e);
            async_graphql::Error::new(e.to_string())
        })?;

        let data = response
            .data
            .and_then(|mut data| data.get_mut(&self.target_field).map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null);

        if data.is_null() && !response.errors.is_empty() {
            let message = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(async_graphql::Error::new(message));
        }

        for error in &response.errors {
            tracing::debug!(
                "Remote returned a partial result for `{}`: {}",
                self.target_field,
                error.message
            );
            ctx.ctx.add_error(self.rebase_error(ctx, error));
        }

        if data.is_null() {
            return Ok(None);
        }
        Ok(Some(Value::from_json(data)?))
    }

    // The remote path starts at the delegated root field, which is this
    // field in the client's response.
    fn rebase_error(&self, ctx: &ResolverContext<'_>, error: &RemoteError) -> ServerError {
        let mut rebased = ctx.ctx.set_error_path(ServerError::new(error.message.clone(), None));
        rebased
            .path
            .extend(error.path.iter().skip(1).filter_map(|segment| match segment {
                serde_json::Value::String(key) => Some(PathSegment::Field(key.clone())),
                serde_json::Value::Number(index) => index
                    .as_u64()
                    .and_then(|index| usize::try_from(index).ok())
                    .map(PathSegment::Index),
                _ => None,
            }));
        rebased
    }

    /// Builds the remote operation, or `None` when a mapped argument is null
    /// and there is nothing to delegate.
    fn build_request(&self, ctx: &ResolverContext<'_>) -> async_graphql::Result<Option<GraphQLRequest>> {
        for field in &self.requires {
            if parent_field(ctx, field).is_none() {
                return Err(async_graphql::Error::new(format!(
                    "required parent field `{field}` is missing"
                )));
            }
        }

        let remote = self.remote.type_system();
        let target = self.target().ok_or_else(|| {
            async_graphql::Error::new(format!("remote field `{}` is unknown", self.target_field))
        })?;

        let mut operation = OperationBuilder::default();
        let mut arguments = Vec::new();
        for mapping in &self.arguments {
            match parent_field(ctx, &mapping.parent_field) {
                Some(Value::Null) | None => return Ok(None),
                Some(value) => {
                    arguments.push(operation.argument(target, &mapping.argument, value.clone())?)
                }
            }
        }
        let selection = ctx.ctx.field();
        if self.forward_arguments {
            for (name, value) in selection.arguments()? {
                arguments.push(operation.argument(target, name.as_str(), value)?);
            }
        }

        let selection_set = render_selection(
            remote,
            &mut operation,
            named_type(&target.field_type),
            selection.selection_set(),
        )?;
        let root_field = Field {
            position: Default::default(),
            alias: None,
            name: self.target_field.clone(),
            arguments,
            directives: vec![],
            selection_set,
        };
        let selection_set = SelectionSet {
            span: Default::default(),
            items: vec![Selection::Field(root_field)],
        };
        let definition = match self.operation {
            OperationKind::Query => OperationDefinition::Query(Query {
                position: Default::default(),
                name: None,
                variable_definitions: operation.definitions,
                directives: vec![],
                selection_set,
            }),
            OperationKind::Mutation => OperationDefinition::Mutation(Mutation {
                position: Default::default(),
                name: None,
                variable_definitions: operation.definitions,
                directives: vec![],
                selection_set,
            }),
        };
        let document: Document<'static, String> = Document {
            definitions: vec![Definition::Operation(definition)],
        };

        Ok(Some(GraphQLRequest {
            query: document.to_string(),
            variables: Some(serde_json::Value::Object(operation.variables)),
            operation_name: None,
        }))
    }
}

/// Variables of the delegated operation. Every argument value is sent as a
/// variable typed with the remote argument's own type, so values reach the
/// remote exactly as the gateway coerced them.
#[derive(Default)]
struct OperationBuilder {
    definitions: Vec<VariableDefinition<'static, String>>,
    variables: serde_json::Map<String, serde_json::Value>,
}

impl OperationBuilder {
    fn argument(
        &mut self,
        field: &SchemaField,
        argument: &str,
        value: Value,
    ) -> async_graphql::Result<(String, QueryValue)> {
        let definition = field
            .arguments
            .iter()
            .find(|arg| arg.name == argument)
            .ok_or_else(|| async_graphql::Error::new(format!("unknown remote argument `{argument}`")))?;

        let mut name = argument.to_string();
        let mut suffix = 1;
        while self.variables.contains_key(&name) {
            suffix += 1;
            name = format!("{argument}_{suffix}");
        }

        self.definitions.push(VariableDefinition {
            position: Default::default(),
            name: name.clone(),
            var_type: definition.value_type.clone(),
            default_value: None,
        });
        self.variables.insert(name.clone(), value.into_json()?);
        Ok((argument.to_string(), QueryValue::Variable(name)))
    }
}

/// Renders the client's selection below a delegated field for the remote
/// type `type_name`. Fields unknown to the remote are dropped, `__typename`
/// is always requested, and fields of concrete types below an abstract type
/// are wrapped in inline fragments.
fn render_selection<'a>(
    remote: &TypeSystem,
    operation: &mut OperationBuilder,
    type_name: &str,
    fields: impl Iterator<Item = SelectionField<'a>>,
) -> async_graphql::Result<SelectionSet<'static, String>> {
    let mut items = Vec::new();
    if remote.fields(type_name).is_none() && !remote.is_abstract(type_name) {
        return Ok(SelectionSet {
            span: Default::default(),
            items,
        });
    }

    items.push(Selection::Field(leaf_field("__typename", None)));
    for selected in fields {
        let name = selected.name();
        if name == "__typename" {
            if let Some(alias) = selected.alias() {
                items.push(Selection::Field(leaf_field(name, Some(alias))));
            }
            continue;
        }

        if let Some(definition) = remote.field(type_name, name) {
            items.push(Selection::Field(render_field(remote, operation, definition, &selected)?));
            continue;
        }

        let mut matched = false;
        for possible in remote.possible_types(type_name) {
            if let Some(definition) = remote.field(possible, name) {
                matched = true;
                items.push(Selection::InlineFragment(InlineFragment {
                    position: Default::default(),
                    type_condition: Some(TypeCondition::On(possible.to_string())),
                    directives: vec![],
                    selection_set: SelectionSet {
                        span: Default::default(),
                        items: vec![Selection::Field(render_field(
                            remote, operation, definition, &selected,
                        )?)],
                    },
                }));
            }
        }
        if !matched {
            tracing::debug!("Field `{}.{}` is not served remotely, skipping", type_name, name);
        }
    }

    Ok(SelectionSet {
        span: Default::default(),
        items,
    })
}

fn render_field(
    remote: &TypeSystem,
    operation: &mut OperationBuilder,
    definition: &SchemaField,
    selected: &SelectionField<'_>,
) -> async_graphql::Result<Field<'static, String>> {
    let mut arguments = Vec::new();
    for (name, value) in selected.arguments()? {
        arguments.push(operation.argument(definition, name.as_str(), value)?);
    }

    Ok(Field {
        position: Default::default(),
        alias: selected.alias().map(str::to_string),
        name: definition.name.clone(),
        arguments,
        directives: vec![],
        selection_set: render_selection(
            remote,
            operation,
            named_type(&definition.field_type),
            selected.selection_set(),
        )?,
    })
}

fn leaf_field(name: &str, alias: Option<&str>) -> Field<'static, String> {
    Field {
        position: Default::default(),
        alias: alias.map(str::to_string),
        name: name.to_string(),
        arguments: vec![],
        directives: vec![],
        selection_set: SelectionSet {
            span: Default::default(),
            items: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GraphQLResponse, error::LinkError, link::Link, remote::introspect_schema};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    async fn remote() -> Arc<RemoteSchema> {
        let schema = crate::compose_authors(Arc::new(crate::Library::default())).unwrap();
        let introspection = schema
            .execute(crate::introspection::INTROSPECTION_QUERY)
            .await
            .data
            .into_json()
            .unwrap();

        struct Introspected(serde_json::Value);

        #[async_trait]
        impl Link for Introspected {
            fn uri(&self) -> &str {
                "memory://authors"
            }

            async fn execute(&self, _request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
                Ok(GraphQLResponse {
                    data: Some(self.0.clone()),
                    errors: vec![],
                })
            }
        }

        Arc::new(introspect_schema(Arc::new(Introspected(introspection))).await.unwrap())
    }

    fn books() -> TypeSystem {
        TypeSystem::parse(
            "books",
            "type Query { books: [Book] } type Book { title: String! authorId: Int }",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn mapped_argument_must_exist_remotely() {
        let delegation = Delegation::to_field(remote().await, OperationKind::Query, "author")
            .map_argument("authorId", "authorId");
        let err = delegation
            .validate(&FieldCoordinate::new("Book", "title"), &books())
            .unwrap_err();
        assert!(matches!(err, InitError::UnknownDelegationArgument { argument, .. } if argument == "authorId"));
    }

    #[tokio::test]
    async fn required_fields_must_exist_on_parent() {
        let delegation = Delegation::to_field(remote().await, OperationKind::Query, "author")
            .requires(["isbn"]);
        let err = delegation
            .validate(&FieldCoordinate::new("Book", "title"), &books())
            .unwrap_err();
        assert!(matches!(err, InitError::UnknownRequiredField { field, .. } if field == "isbn"));
    }

    #[tokio::test]
    async fn target_must_exist_remotely() {
        let delegation = Delegation::to_field(remote().await, OperationKind::Mutation, "author");
        let err = delegation
            .validate(&FieldCoordinate::new("Book", "title"), &books())
            .unwrap_err();
        assert!(matches!(err, InitError::UnknownDelegationTarget { .. }));
    }

    #[tokio::test]
    async fn mapping_an_argument_requires_its_parent_field() {
        let delegation = Delegation::to_field(remote().await, OperationKind::Query, "author")
            .requires(["authorId"])
            .map_argument("id", "authorId");
        assert_eq!(delegation.required_fields(), ["authorId".to_string()]);
        assert_eq!(delegation.target_field(), "author");
        delegation
            .validate(&FieldCoordinate::new("Book", "title"), &books())
            .unwrap();
    }

    #[test]
    fn argument_values_travel_as_typed_variables() {
        let type_system = TypeSystem::parse(
            "counter",
            "type Query { add(amount: BigInt!, by: Int): BigInt } scalar BigInt",
        )
        .unwrap();
        let add = type_system.field("Query", "add").unwrap();

        let mut operation = OperationBuilder::default();
        let first = operation
            .argument(add, "amount", Value::from(5_000_000_000_i64))
            .unwrap();
        let second = operation.argument(add, "amount", Value::from(7)).unwrap();

        assert_eq!(first, ("amount".to_string(), QueryValue::Variable("amount".to_string())));
        assert_eq!(second, ("amount".to_string(), QueryValue::Variable("amount_2".to_string())));
        assert_eq!(
            serde_json::Value::Object(operation.variables.clone()),
            serde_json::json!({ "amount": 5_000_000_000_i64, "amount_2": 7 })
        );
        let types: Vec<String> = operation
            .definitions
            .iter()
            .map(|definition| definition.var_type.to_string())
            .collect();
        assert_eq!(types, vec!["BigInt!", "BigInt!"]);
        assert!(operation.argument(add, "step", Value::Null).is_err());
    }
}
