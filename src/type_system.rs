//! Type system descriptors: the types and fields a schema declares, without
//! any resolvers attached.

use std::collections::BTreeMap;
use std::fmt;

use graphql_parser::schema::{
    Definition, Document, Field, ObjectType, SchemaDefinition, TypeDefinition, TypeExtension,
    parse_schema,
};

use crate::error::InitError;

pub type SchemaType = graphql_parser::schema::Type<'static, String>;
pub type SchemaField = Field<'static, String>;
pub type SchemaTypeDefinition = TypeDefinition<'static, String>;

pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

const DEFAULT_QUERY_TYPE: &str = "Query";
const DEFAULT_MUTATION_TYPE: &str = "Mutation";

/// `Type.field`, the key resolvers are bound under.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldCoordinate {
    pub type_name: String,
    pub field_name: String,
}

impl FieldCoordinate {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        FieldCoordinate {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => f.write_str("query"),
            OperationKind::Mutation => f.write_str("mutation"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeSystem {
    query_type: String,
    mutation_type: Option<String>,
    types: BTreeMap<String, SchemaTypeDefinition>,
}

impl TypeSystem {
    /// Parses an SDL document. Type extensions are not allowed here; apply
    /// them with [`TypeSystem::extend`] once every base type is known.
    pub fn parse(name: &str, sdl: &str) -> Result<Self, InitError> {
        let document = parse_document(name, sdl)?;
        let mut type_system = TypeSystem {
            query_type: DEFAULT_QUERY_TYPE.to_string(),
            mutation_type: None,
            types: BTreeMap::new(),
        };
        let mut explicit_roots = false;

        for definition in document.definitions {
            match definition {
                Definition::SchemaDefinition(schema) => {
                    type_system.apply_schema_definition(schema);
                    explicit_roots = true;
                }
                Definition::TypeDefinition(typedef) => type_system.insert(typedef)?,
                Definition::TypeExtension(extension) => {
                    return Err(InitError::SchemaParse {
                        name: name.to_string(),
                        message: format!(
                            "unexpected extension of `{}` in a base schema",
                            extension_name(&extension)
                        ),
                    });
                }
                Definition::DirectiveDefinition(directive) => {
                    tracing::debug!("Ignoring directive @{} in {}", directive.name, name);
                }
            }
        }

        if !explicit_roots && type_system.types.contains_key(DEFAULT_MUTATION_TYPE) {
            type_system.mutation_type = Some(DEFAULT_MUTATION_TYPE.to_string());
        }

        Ok(type_system)
    }

    /// Builds a type system from an already parsed document, such as the one
    /// reconstructed from an introspection result.
    pub fn from_document(document: Document<'static, String>) -> Result<Self, InitError> {
        let mut type_system = TypeSystem {
            query_type: DEFAULT_QUERY_TYPE.to_string(),
            mutation_type: None,
            types: BTreeMap::new(),
        };

        for definition in document.definitions {
            match definition {
                Definition::SchemaDefinition(schema) => type_system.apply_schema_definition(schema),
                Definition::TypeDefinition(typedef) => type_system.insert(typedef)?,
                _ => {}
            }
        }

        Ok(type_system)
    }

    fn apply_schema_definition(&mut self, schema: SchemaDefinition<'static, String>) {
        if let Some(query) = schema.query {
            self.query_type = query;
        }
        self.mutation_type = schema.mutation;
        if let Some(subscription) = schema.subscription {
            tracing::warn!("Subscription root `{}` will not be exposed", subscription);
        }
    }

    fn insert(&mut self, typedef: SchemaTypeDefinition) -> Result<(), InitError> {
        let name = type_definition_name(&typedef).to_string();
        if name.starts_with("__") || BUILTIN_SCALARS.contains(&name.as_str()) {
            return Ok(());
        }
        if self.types.contains_key(&name) {
            return Err(InitError::TypeCollision(name));
        }
        self.types.insert(name, typedef);
        Ok(())
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn root_type(&self, operation: OperationKind) -> Option<&str> {
        match operation {
            OperationKind::Query => Some(self.query_type()),
            OperationKind::Mutation => self.mutation_type(),
        }
    }

    pub fn is_root(&self, type_name: &str) -> bool {
        type_name == self.query_type || self.mutation_type.as_deref() == Some(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&SchemaTypeDefinition> {
        self.types.get(type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &SchemaTypeDefinition> {
        self.types.values()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        BUILTIN_SCALARS.contains(&type_name) || self.types.contains_key(type_name)
    }

    /// Fields of an object or interface type.
    pub fn fields(&self, type_name: &str) -> Option<&[SchemaField]> {
        match self.types.get(type_name)? {
            TypeDefinition::Object(object) => Some(&object.fields),
            TypeDefinition::Interface(interface) => Some(&interface.fields),
            _ => None,
        }
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&SchemaField> {
        self.fields(type_name)?
            .iter()
            .find(|field| field.name == field_name)
    }

    pub fn is_enum(&self, type_name: &str) -> bool {
        matches!(self.types.get(type_name), Some(TypeDefinition::Enum(_)))
    }

    pub fn is_abstract(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name),
            Some(TypeDefinition::Interface(_) | TypeDefinition::Union(_))
        )
    }

    /// Object types a value of an interface or union type can have.
    pub fn possible_types(&self, type_name: &str) -> Vec<&str> {
        match self.types.get(type_name) {
            Some(TypeDefinition::Union(union)) => union.types.iter().map(String::as_str).collect(),
            Some(TypeDefinition::Interface(_)) => self
                .types
                .values()
                .filter_map(|typedef| match typedef {
                    TypeDefinition::Object(object)
                        if object.implements_interfaces.iter().any(|i| i == type_name) =>
                    {
                        Some(object.name.as_str())
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Merges `other` into `self`. Root operation types are merged field by
    /// field; any other type defined on both sides is a collision.
    pub fn merge(mut self, other: TypeSystem) -> Result<Self, InitError> {
        let TypeSystem {
            query_type,
            mutation_type,
            mut types,
        } = other;

        if let Some(TypeDefinition::Object(remote_query)) = types.remove(&query_type) {
            let local_query = self.query_type.clone();
            self.merge_root_fields(&local_query, remote_query)?;
        }

        if let Some(remote_mutation_name) = mutation_type {
            if let Some(TypeDefinition::Object(remote_mutation)) =
                types.remove(&remote_mutation_name)
            {
                let local_mutation = self
                    .mutation_type
                    .get_or_insert_with(|| remote_mutation_name.clone())
                    .clone();
                self.merge_root_fields(&local_mutation, remote_mutation)?;
            }
        }

        for typedef in types.into_values() {
            self.insert(typedef)?;
        }

        Ok(self)
    }

    fn merge_root_fields(
        &mut self,
        root_name: &str,
        mut incoming: ObjectType<'static, String>,
    ) -> Result<(), InitError> {
        match self.types.get_mut(root_name) {
            Some(TypeDefinition::Object(existing)) => {
                for field in incoming.fields {
                    if existing.fields.iter().any(|f| f.name == field.name) {
                        return Err(InitError::FieldCollision(FieldCoordinate::new(
                            root_name, field.name,
                        )));
                    }
                    existing.fields.push(field);
                }
            }
            Some(_) => return Err(InitError::TypeCollision(root_name.to_string())),
            None => {
                incoming.name = root_name.to_string();
                self.types
                    .insert(root_name.to_string(), TypeDefinition::Object(incoming));
            }
        }
        Ok(())
    }

    /// Applies an SDL document of `extend type` definitions. New type
    /// definitions in the same document are added as well.
    pub fn extend(mut self, name: &str, sdl: &str) -> Result<Self, InitError> {
        let document = parse_document(name, sdl)?;

        for definition in document.definitions {
            match definition {
                Definition::TypeDefinition(typedef) => self.insert(typedef)?,
                Definition::TypeExtension(TypeExtension::Object(extension)) => {
                    let Some(TypeDefinition::Object(object)) = self.types.get_mut(&extension.name)
                    else {
                        return Err(InitError::UnknownExtensionTarget(extension.name));
                    };
                    for field in extension.fields {
                        if object.fields.iter().any(|f| f.name == field.name) {
                            return Err(InitError::FieldCollision(FieldCoordinate::new(
                                &object.name,
                                field.name,
                            )));
                        }
                        object.fields.push(field);
                    }
                    object
                        .implements_interfaces
                        .extend(extension.implements_interfaces);
                }
                Definition::TypeExtension(other) => {
                    return Err(InitError::SchemaParse {
                        name: name.to_string(),
                        message: format!(
                            "only object type extensions are supported, found `{}`",
                            extension_name(&other)
                        ),
                    });
                }
                _ => {}
            }
        }

        Ok(self)
    }

    /// Checks that every named type referenced anywhere is defined.
    pub fn validate(&self) -> Result<(), InitError> {
        let dangling = |type_name: &str, referenced: &str| InitError::UnknownTypeReference {
            type_name: type_name.to_string(),
            referenced: referenced.to_string(),
        };

        if !matches!(self.types.get(&self.query_type), Some(TypeDefinition::Object(_))) {
            return Err(dangling("schema", &self.query_type));
        }

        for typedef in self.types.values() {
            let owner = type_definition_name(typedef);
            let mut referenced: Vec<&str> = Vec::new();
            match typedef {
                TypeDefinition::Object(object) => {
                    referenced.extend(object.implements_interfaces.iter().map(String::as_str));
                    collect_field_types(&object.fields, &mut referenced);
                }
                TypeDefinition::Interface(interface) => {
                    collect_field_types(&interface.fields, &mut referenced);
                }
                TypeDefinition::Union(union) => {
                    referenced.extend(union.types.iter().map(String::as_str));
                }
                TypeDefinition::InputObject(input) => {
                    referenced.extend(input.fields.iter().map(|f| named_type(&f.value_type)));
                }
                TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) => {}
            }
            if let Some(missing) = referenced.into_iter().find(|name| !self.contains(name)) {
                return Err(dangling(owner, missing));
            }
        }

        Ok(())
    }

    /// Prints the type system back as SDL.
    pub fn sdl(&self) -> String {
        let mut definitions = vec![Definition::SchemaDefinition(SchemaDefinition {
            position: Default::default(),
            directives: vec![],
            query: Some(self.query_type.clone()),
            mutation: self.mutation_type.clone(),
            subscription: None,
        })];
        definitions.extend(self.types.values().cloned().map(Definition::TypeDefinition));
        Document { definitions }.to_string()
    }
}

fn parse_document(name: &str, sdl: &str) -> Result<Document<'static, String>, InitError> {
    parse_schema::<String>(sdl)
        .map(|document| document.into_static())
        .map_err(|e| InitError::SchemaParse {
            name: name.to_string(),
            message: e.to_string(),
        })
}

fn collect_field_types<'a>(fields: &'a [SchemaField], into: &mut Vec<&'a str>) {
    for field in fields {
        into.push(named_type(&field.field_type));
        into.extend(field.arguments.iter().map(|arg| named_type(&arg.value_type)));
    }
}

pub fn type_definition_name(typedef: &SchemaTypeDefinition) -> &str {
    match typedef {
        TypeDefinition::Scalar(scalar) => &scalar.name,
        TypeDefinition::Object(object) => &object.name,
        TypeDefinition::Interface(interface) => &interface.name,
        TypeDefinition::Union(union) => &union.name,
        TypeDefinition::Enum(enum_type) => &enum_type.name,
        TypeDefinition::InputObject(input) => &input.name,
    }
}

fn extension_name<'a>(extension: &'a TypeExtension<'static, String>) -> &'a str {
    match extension {
        TypeExtension::Scalar(scalar) => &scalar.name,
        TypeExtension::Object(object) => &object.name,
        TypeExtension::Interface(interface) => &interface.name,
        TypeExtension::Union(union) => &union.name,
        TypeExtension::Enum(enum_type) => &enum_type.name,
        TypeExtension::InputObject(input) => &input.name,
    }
}

/// The innermost named type of a (possibly wrapped) type reference.
pub fn named_type(ty: &SchemaType) -> &str {
    match ty {
        SchemaType::NamedType(name) => name,
        SchemaType::ListType(inner) | SchemaType::NonNullType(inner) => named_type(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOOKS: &str = r#"
        type Query { books: [Book] }
        type Book { title: String! authorId: Int }
    "#;

    const AUTHORS: &str = r#"
        type Query { author(id: Int): Author authors: [Author] }
        type Author { name: String }
    "#;

    fn field_names(type_system: &TypeSystem, type_name: &str) -> Vec<String> {
        type_system
            .fields(type_name)
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    #[test]
    fn merge_combines_root_fields_and_keeps_both_sides_types() {
        let books = TypeSystem::parse("books", BOOKS).unwrap();
        let authors = TypeSystem::parse("authors", AUTHORS).unwrap();

        let merged = books.merge(authors).unwrap();

        assert_eq!(field_names(&merged, "Query"), vec!["books", "author", "authors"]);
        assert!(merged.get("Book").is_some());
        assert!(merged.get("Author").is_some());
        merged.validate().unwrap();
    }

    #[test]
    fn merge_maps_remote_root_by_role_not_name() {
        let books = TypeSystem::parse("books", BOOKS).unwrap();
        let remote = TypeSystem::parse(
            "remote",
            r#"
            schema { query: RootQuery }
            type RootQuery { author(id: Int): Author }
            type Author { name: String }
            "#,
        )
        .unwrap();

        let merged = books.merge(remote).unwrap();

        assert_eq!(field_names(&merged, "Query"), vec!["books", "author"]);
        assert!(merged.get("RootQuery").is_none());
    }

    #[test]
    fn colliding_types_are_rejected() {
        let books = TypeSystem::parse("books", BOOKS).unwrap();
        let remote = TypeSystem::parse(
            "remote",
            "type Query { other: Book } type Book { isbn: String }",
        )
        .unwrap();

        let err = books.merge(remote).unwrap_err();
        assert!(matches!(err, InitError::TypeCollision(name) if name == "Book"));
    }

    #[test]
    fn colliding_root_fields_are_rejected() {
        let books = TypeSystem::parse("books", BOOKS).unwrap();
        let remote =
            TypeSystem::parse("remote", "type Query { books: [String] }").unwrap();

        let err = books.merge(remote).unwrap_err();
        assert_eq!(err.to_string(), "field `Query.books` is defined more than once");
    }

    #[test]
    fn extension_adds_field_to_existing_type() {
        let merged = TypeSystem::parse("books", BOOKS)
            .unwrap()
            .merge(TypeSystem::parse("authors", AUTHORS).unwrap())
            .unwrap()
            .extend("book_author", "extend type Book { author: Author }")
            .unwrap();

        assert_eq!(field_names(&merged, "Book"), vec!["title", "authorId", "author"]);
        let author = merged.field("Book", "author").unwrap();
        assert_eq!(named_type(&author.field_type), "Author");
        merged.validate().unwrap();
    }

    #[test]
    fn extension_of_unknown_type_fails() {
        let err = TypeSystem::parse("books", BOOKS)
            .unwrap()
            .extend("ext", "extend type Magazine { issue: Int }")
            .unwrap_err();
        assert!(matches!(err, InitError::UnknownExtensionTarget(name) if name == "Magazine"));
    }

    #[test]
    fn dangling_reference_fails_validation() {
        let unmerged = TypeSystem::parse("books", BOOKS)
            .unwrap()
            .extend("book_author", "extend type Book { author: Author }")
            .unwrap();

        let err = unmerged.validate().unwrap_err();
        assert!(matches!(
            err,
            InitError::UnknownTypeReference { type_name, referenced }
                if type_name == "Book" && referenced == "Author"
        ));
    }

    #[test]
    fn base_schema_rejects_extensions() {
        let err = TypeSystem::parse("books", "extend type Book { x: Int }").unwrap_err();
        assert!(matches!(err, InitError::SchemaParse { .. }));
    }

    #[test]
    fn possible_types_of_interface() {
        let type_system = TypeSystem::parse(
            "media",
            r#"
            type Query { media: [Media] }
            interface Media { title: String }
            type Book implements Media { title: String }
            type Film implements Media { title: String }
            union Anything = Book | Film
            enum Format { HARDCOVER PAPERBACK }
            "#,
        )
        .unwrap();

        assert_eq!(type_system.possible_types("Media"), vec!["Book", "Film"]);
        assert_eq!(type_system.possible_types("Anything"), vec!["Book", "Film"]);
        assert!(type_system.is_abstract("Media"));
        assert!(type_system.is_enum("Format"));
        assert!(!type_system.is_abstract("Book"));
    }

    #[test]
    fn sdl_round_trips_through_the_parser() {
        let original = TypeSystem::parse("books", BOOKS).unwrap();
        let reparsed = TypeSystem::parse("printed", &original.sdl()).unwrap();
        assert_eq!(field_names(&reparsed, "Book"), vec!["title", "authorId"]);
        assert_eq!(reparsed.query_type(), "Query");
    }
}
