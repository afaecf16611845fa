//! Rebuilds a type system from the result of the standard introspection query.

use graphql_parser::schema::{
    Definition, Document, EnumType, EnumValue, Field, InputObjectType, InputValue, InterfaceType,
    ObjectType, ScalarType, SchemaDefinition, Type, TypeDefinition, UnionType, Value,
};
use graphql_tools::introspection::{
    IntrospectionInputTypeRef, IntrospectionInputValue, IntrospectionOutputTypeRef,
    IntrospectionQuery, IntrospectionType,
};

use crate::error::IntrospectionError;

// Adapted from graphql-js `getIntrospectionQuery`, without directive
// repeatability and deprecation details we have no use for.
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
    directives {
      name
      description
      locations
      args {
        ...InputValue
      }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
    isDeprecated
    deprecationReason
  }
  inputFields {
    ...InputValue
  }
  interfaces {
    ...TypeRef
  }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes {
    ...TypeRef
  }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}"#;

type Doc = Document<'static, String>;

/// Converts an introspection result into an SDL document. Directive
/// definitions are dropped: the stitched schema only carries types.
pub fn introspection_to_document(introspection: IntrospectionQuery) -> Result<Doc, IntrospectionError> {
    let schema = introspection.__schema;
    let mut definitions = vec![Definition::SchemaDefinition(SchemaDefinition {
        position: Default::default(),
        directives: vec![],
        query: Some(schema.query_type.name),
        mutation: schema.mutation_type.map(|t| t.name),
        subscription: schema.subscription_type.map(|t| t.name),
    })];

    for introspected in schema.types {
        let typedef = match introspected {
            IntrospectionType::SCALAR(scalar) => TypeDefinition::Scalar(ScalarType {
                position: Default::default(),
                description: scalar.description,
                name: scalar.name,
                directives: vec![],
            }),
            IntrospectionType::OBJECT(object) => TypeDefinition::Object(ObjectType {
                position: Default::default(),
                description: object.description,
                name: object.name,
                implements_interfaces: object.interfaces.into_iter().map(|i| i.name).collect(),
                directives: vec![],
                fields: object
                    .fields
                    .into_iter()
                    .map(|field| {
                        Ok(Field {
                            position: Default::default(),
                            description: field.description,
                            name: field.name,
                            arguments: input_values(field.args)?,
                            field_type: output_type(&field.type_ref)?,
                            directives: vec![],
                        })
                    })
                    .collect::<Result<_, IntrospectionError>>()?,
            }),
            IntrospectionType::INTERFACE(interface) => TypeDefinition::Interface(InterfaceType {
                position: Default::default(),
                description: interface.description,
                name: interface.name,
                implements_interfaces: vec![],
                directives: vec![],
                fields: interface
                    .fields
                    .into_iter()
                    .map(|field| {
                        Ok(Field {
                            position: Default::default(),
                            description: field.description,
                            name: field.name,
                            arguments: input_values(field.args)?,
                            field_type: output_type(&field.type_ref)?,
                            directives: vec![],
                        })
                    })
                    .collect::<Result<_, IntrospectionError>>()?,
            }),
            IntrospectionType::UNION(union) => TypeDefinition::Union(UnionType {
                position: Default::default(),
                description: union.description,
                name: union.name,
                directives: vec![],
                types: union.possible_types.into_iter().map(|t| t.name).collect(),
            }),
            IntrospectionType::ENUM(enum_type) => TypeDefinition::Enum(EnumType {
                position: Default::default(),
                description: enum_type.description,
                name: enum_type.name,
                directives: vec![],
                values: enum_type
                    .enum_values
                    .into_iter()
                    .map(|value| EnumValue {
                        position: Default::default(),
                        description: value.description,
                        name: value.name,
                        directives: vec![],
                    })
                    .collect(),
            }),
            IntrospectionType::INPUT_OBJECT(input) => TypeDefinition::InputObject(InputObjectType {
                position: Default::default(),
                description: input.description,
                name: input.name,
                directives: vec![],
                fields: input_values(input.input_fields)?,
            }),
        };
        definitions.push(Definition::TypeDefinition(typedef));
    }

    Ok(Document { definitions })
}

fn input_values(
    values: Vec<IntrospectionInputValue>,
) -> Result<Vec<InputValue<'static, String>>, IntrospectionError> {
    values
        .into_iter()
        .map(|value| {
            let type_ref = value.type_ref.as_ref().ok_or_else(|| {
                IntrospectionError::Malformed(format!("argument `{}` has no type", value.name))
            })?;
            Ok(InputValue {
                position: Default::default(),
                value_type: input_type(type_ref)?,
                default_value: value.default_value.and_then(default_value),
                description: value.description,
                name: value.name,
                directives: vec![],
            })
        })
        .collect()
}

fn wrapped_type<R>(
    of_type: Option<&R>,
    convert: fn(&R) -> Result<Type<'static, String>, IntrospectionError>,
) -> Result<Box<Type<'static, String>>, IntrospectionError> {
    let inner = of_type
        .ok_or_else(|| IntrospectionError::Malformed("wrapping type without ofType".to_string()))?;
    Ok(Box::new(convert(inner)?))
}

fn input_type(type_ref: &IntrospectionInputTypeRef) -> Result<Type<'static, String>, IntrospectionError> {
    Ok(match type_ref {
        IntrospectionInputTypeRef::SCALAR(t) => Type::NamedType(t.name.clone()),
        IntrospectionInputTypeRef::ENUM(t) => Type::NamedType(t.name.clone()),
        IntrospectionInputTypeRef::INPUT_OBJECT(t) => Type::NamedType(t.name.clone()),
        IntrospectionInputTypeRef::NON_NULL { of_type } => {
            Type::NonNullType(wrapped_type(of_type.as_deref(), input_type)?)
        }
        IntrospectionInputTypeRef::LIST { of_type } => {
            Type::ListType(wrapped_type(of_type.as_deref(), input_type)?)
        }
    })
}

fn output_type(type_ref: &IntrospectionOutputTypeRef) -> Result<Type<'static, String>, IntrospectionError> {
    Ok(match type_ref {
        IntrospectionOutputTypeRef::SCALAR(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::OBJECT(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::INTERFACE(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::UNION(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::ENUM(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::INPUT_OBJECT(t) => Type::NamedType(t.name.clone()),
        IntrospectionOutputTypeRef::NON_NULL { of_type } => {
            Type::NonNullType(wrapped_type(of_type.as_deref(), output_type)?)
        }
        IntrospectionOutputTypeRef::LIST { of_type } => {
            Type::ListType(wrapped_type(of_type.as_deref(), output_type)?)
        }
    })
}

// `defaultValue` is a GraphQL literal printed as a string. JSON-compatible
// literals and bare enum names are recovered; anything else is dropped and
// the remote applies its own default.
fn default_value(literal: serde_json::Value) -> Option<Value<'static, String>> {
    match literal {
        serde_json::Value::String(text) => match serde_json::from_str(&text) {
            Ok(json) => Some(json_to_literal(json)),
            Err(_) if is_name(&text) => Some(Value::Enum(text)),
            Err(_) => None,
        },
        other => Some(json_to_literal(other)),
    }
}

fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn json_to_literal(json: serde_json::Value) -> Value<'static, String> {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64().map(i32::try_from) {
            Some(Ok(int)) => Value::Int(int.into()),
            _ => Value::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_literal).collect()),
        serde_json::Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, json_to_literal(v)))
                .collect(),
        ),
    }
}
