//! Turns a type system plus its resolver map into an executable schema.
//!
//! Query parsing, validation and execution are left to async-graphql's
//! dynamic schema; this module only declares the types and installs one
//! resolver per field.

use std::sync::Arc;

use async_graphql::{
    Name, Value,
    dynamic::{
        Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface,
        InterfaceField, Object, ResolverContext, Scalar, Schema, TypeRef, Union,
    },
};
use graphql_parser::schema::TypeDefinition;

use crate::{
    error::InitError,
    resolvers::{Resolver, ResolverMap},
    type_system::{FieldCoordinate, SchemaField, SchemaType, TypeSystem},
};

type SdlValue = graphql_parser::schema::Value<'static, String>;
type SdlInputValue = graphql_parser::schema::InputValue<'static, String>;

/// Builds the executable schema. Fails when the type system references
/// unknown types, a binding names an unknown field, or a root field has no
/// resolver.
pub fn build_schema(type_system: TypeSystem, resolvers: ResolverMap) -> Result<Schema, InitError> {
    type_system.validate()?;
    resolvers.validate(&type_system)?;

    let type_system = Arc::new(type_system);
    let mut builder = Schema::build(
        type_system.query_type(),
        type_system.mutation_type(),
        None,
    );

    for typedef in type_system.types() {
        builder = match typedef {
            TypeDefinition::Object(object) => {
                let mut output = Object::new(&object.name);
                if let Some(description) = &object.description {
                    output = output.description(description);
                }
                for interface in &object.implements_interfaces {
                    output = output.implement(interface);
                }
                for field in &object.fields {
                    let coordinate = FieldCoordinate::new(&object.name, &field.name);
                    output = output.field(output_field(coordinate, field, &type_system, &resolvers)?);
                }
                builder.register(output)
            }
            TypeDefinition::Interface(interface) => {
                let mut output = Interface::new(&interface.name);
                if let Some(description) = &interface.description {
                    output = output.description(description);
                }
                for field in &interface.fields {
                    let mut interface_field =
                        InterfaceField::new(&field.name, type_ref(&field.field_type));
                    for argument in &field.arguments {
                        interface_field = interface_field.argument(input_value(argument));
                    }
                    output = output.field(interface_field);
                }
                builder.register(output)
            }
            TypeDefinition::Union(union) => {
                let mut output = Union::new(&union.name);
                for member in &union.types {
                    output = output.possible_type(member);
                }
                builder.register(output)
            }
            TypeDefinition::Enum(enum_type) => {
                let mut output = Enum::new(&enum_type.name);
                if let Some(description) = &enum_type.description {
                    output = output.description(description);
                }
                for value in &enum_type.values {
                    output = output.item(EnumItem::new(&value.name));
                }
                builder.register(output)
            }
            TypeDefinition::InputObject(input) => {
                let mut output = InputObject::new(&input.name);
                for field in &input.fields {
                    output = output.field(input_value(field));
                }
                builder.register(output)
            }
            TypeDefinition::Scalar(scalar) => {
                let mut output = Scalar::new(&scalar.name);
                if let Some(description) = &scalar.description {
                    output = output.description(description);
                }
                builder.register(output)
            }
        };
    }

    Ok(builder.finish()?)
}

fn output_field(
    coordinate: FieldCoordinate,
    field: &SchemaField,
    type_system: &Arc<TypeSystem>,
    resolvers: &ResolverMap,
) -> Result<Field, InitError> {
    let shape = Arc::new(OutputShape {
        ty: field.field_type.clone(),
        type_system: Arc::clone(type_system),
    });
    let ty = type_ref(&field.field_type);

    let mut output = match resolvers.get(&coordinate).cloned() {
        Some(Resolver::Local(local)) => Field::new(&field.name, ty, move |ctx| {
            let local = local.clone();
            let shape = Arc::clone(&shape);
            FieldFuture::new(async move {
                let value = local.resolve(&ctx)?;
                Ok(shape.field_value(value, Origin::Local))
            })
        }),
        Some(Resolver::Delegate(delegation)) => Field::new(&field.name, ty, move |ctx| {
            let delegation = delegation.clone();
            let shape = Arc::clone(&shape);
            FieldFuture::new(async move {
                let value = delegation.resolve(&ctx).await?;
                Ok(shape.field_value(value, Origin::Remote))
            })
        }),
        None if type_system.is_root(&coordinate.type_name) => {
            return Err(InitError::MissingResolver(coordinate));
        }
        None => {
            let field_name = field.name.clone();
            Field::new(&field.name, ty, move |ctx| {
                let shape = Arc::clone(&shape);
                let (value, origin) = property(&ctx, &field_name);
                FieldFuture::new(async move { Ok(shape.field_value(value, origin)) })
            })
        }
    };

    if let Some(description) = &field.description {
        output = output.description(description);
    }
    for argument in &field.arguments {
        output = output.argument(input_value(argument));
    }
    Ok(output)
}

/// Where a value was produced. Local records are keyed by field name, while
/// objects fetched through a delegation are keyed by the response keys of the
/// delegated selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

/// An object value returned by a delegation.
struct RemoteObject(Value);

/// Reads the field from the parent object.
fn property(ctx: &ResolverContext<'_>, field_name: &str) -> (Option<Value>, Origin) {
    if let Some(RemoteObject(Value::Object(object))) = ctx.parent_value.downcast_ref::<RemoteObject>() {
        let selection = ctx.ctx.field();
        let key = selection.alias().unwrap_or(field_name);
        return (object.get(key).cloned(), Origin::Remote);
    }

    match ctx.parent_value.as_value() {
        Some(Value::Object(object)) => (object.get(field_name).cloned(), Origin::Local),
        _ => (None, Origin::Local),
    }
}

/// What the engine expects for a value of the field's declared type: enum
/// values as enum names, abstract values tagged with their concrete type.
struct OutputShape {
    ty: SchemaType,
    type_system: Arc<TypeSystem>,
}

impl OutputShape {
    fn field_value(&self, value: Option<Value>, origin: Origin) -> Option<FieldValue<'static>> {
        self.shape(value?, &self.ty, origin)
    }

    fn shape(&self, value: Value, ty: &SchemaType, origin: Origin) -> Option<FieldValue<'static>> {
        match (ty, value) {
            (_, Value::Null) => None,
            (SchemaType::NonNullType(inner), value) => self.shape(value, inner, origin),
            (SchemaType::ListType(inner), Value::List(items)) => Some(FieldValue::list(
                items
                    .into_iter()
                    .map(|item| self.shape(item, inner, origin).unwrap_or(FieldValue::NULL)),
            )),
            (SchemaType::ListType(_), value) => Some(FieldValue::value(value)),
            (SchemaType::NamedType(name), Value::String(text)) if self.type_system.is_enum(name) => {
                Some(FieldValue::value(Value::Enum(Name::new(text))))
            }
            (SchemaType::NamedType(name), Value::Object(object))
                if self.type_system.is_abstract(name) =>
            {
                let concrete = match object.get("__typename") {
                    Some(Value::String(typename)) => Some(typename.clone()),
                    _ => None,
                };
                let value = object_value(Value::Object(object), origin);
                Some(match concrete {
                    Some(typename) => value.with_type(typename),
                    None => value,
                })
            }
            (SchemaType::NamedType(name), value @ Value::Object(_))
                if self.type_system.fields(name).is_some() =>
            {
                Some(object_value(value, origin))
            }
            (SchemaType::NamedType(_), value) => Some(FieldValue::value(value)),
        }
    }
}

fn object_value(object: Value, origin: Origin) -> FieldValue<'static> {
    match origin {
        Origin::Local => FieldValue::value(object),
        Origin::Remote => FieldValue::owned_any(RemoteObject(object)),
    }
}

fn type_ref(ty: &SchemaType) -> TypeRef {
    match ty {
        SchemaType::NamedType(name) => TypeRef::Named(name.clone().into()),
        SchemaType::ListType(inner) => TypeRef::List(Box::new(type_ref(inner))),
        SchemaType::NonNullType(inner) => TypeRef::NonNull(Box::new(type_ref(inner))),
    }
}

fn input_value(argument: &SdlInputValue) -> InputValue {
    let mut input = InputValue::new(&argument.name, type_ref(&argument.value_type));
    if let Some(description) = &argument.description {
        input = input.description(description);
    }
    if let Some(default) = &argument.default_value {
        input = input.default_value(const_value(default));
    }
    input
}

fn const_value(value: &SdlValue) -> Value {
    match value {
        SdlValue::Variable(_) | SdlValue::Null => Value::Null,
        SdlValue::Int(number) => number
            .as_i64()
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        SdlValue::Float(float) => serde_json::Number::from_f64(*float)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SdlValue::String(s) => Value::String(s.clone()),
        SdlValue::Boolean(b) => Value::Boolean(*b),
        SdlValue::Enum(name) => Value::Enum(Name::new(name)),
        SdlValue::List(items) => Value::List(items.iter().map(const_value).collect()),
        SdlValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (Name::new(name), const_value(value)))
                .collect(),
        ),
    }
}
