use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

/// Primitive EDM type kinds the writer distinguishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum PrimitiveKind {
    Binary,
    Boolean,
    Byte,
    Date,
    DateTimeOffset,
    Decimal,
    Double,
    Duration,
    Guid,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    Stream,
    String,
    TimeOfDay,
}

impl PrimitiveKind {
    /// Parse a qualified primitive type name, such as "Edm.Int32".
    pub fn from_name(name: &str) -> Option<Self> {
        use PrimitiveKind::*;

        Some(match name.strip_prefix("Edm.")? {
            "Binary" => Binary,
            "Boolean" => Boolean,
            "Byte" => Byte,
            "Date" => Date,
            "DateTimeOffset" => DateTimeOffset,
            "Decimal" => Decimal,
            "Double" => Double,
            "Duration" => Duration,
            "Guid" => Guid,
            "Int16" => Int16,
            "Int32" => Int32,
            "Int64" => Int64,
            "SByte" => SByte,
            "Single" => Single,
            "Stream" => Stream,
            "String" => String,
            "TimeOfDay" => TimeOfDay,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use PrimitiveKind::*;

        match self {
            Binary => "Edm.Binary",
            Boolean => "Edm.Boolean",
            Byte => "Edm.Byte",
            Date => "Edm.Date",
            DateTimeOffset => "Edm.DateTimeOffset",
            Decimal => "Edm.Decimal",
            Double => "Edm.Double",
            Duration => "Edm.Duration",
            Guid => "Edm.Guid",
            Int16 => "Edm.Int16",
            Int32 => "Edm.Int32",
            Int64 => "Edm.Int64",
            SByte => "Edm.SByte",
            Single => "Edm.Single",
            Stream => "Edm.Stream",
            String => "Edm.String",
            TimeOfDay => "Edm.TimeOfDay",
        }
    }
}

/// TypeRef names a type as it appears at a usage site: a primitive kind,
/// a qualified structured (entity or complex) type, a collection thereof,
/// or the untyped wildcard.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum TypeRef {
    Primitive(PrimitiveKind),
    Structured(String),
    Collection(Box<TypeRef>),
    Untyped,
}

impl TypeRef {
    /// Parse a type name as it appears in payloads and schemas:
    /// "Collection(Ns.Type)", "Edm.Int32", "Edm.Untyped", or "Ns.Type".
    pub fn parse(name: &str) -> TypeRef {
        if let Some(inner) = name
            .strip_prefix("Collection(")
            .and_then(|n| n.strip_suffix(')'))
        {
            return TypeRef::Collection(Box::new(TypeRef::parse(inner)));
        }
        if name == "Edm.Untyped" {
            return TypeRef::Untyped;
        }
        match PrimitiveKind::from_name(name) {
            Some(kind) => TypeRef::Primitive(kind),
            None => TypeRef::Structured(name.to_string()),
        }
    }

    pub fn collection_of(element: TypeRef) -> TypeRef {
        TypeRef::Collection(Box::new(element))
    }

    /// Element type of a collection reference.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Collection(inner) => Some(inner),
            _ => None,
        }
    }

    /// Qualified name of the structured type this reference names, if any.
    pub fn structured_name(&self) -> Option<&str> {
        match self {
            TypeRef::Structured(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, TypeRef::Untyped)
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(kind) => f.write_str(kind.name()),
            TypeRef::Structured(name) => f.write_str(name),
            TypeRef::Collection(inner) => write!(f, "Collection({inner})"),
            TypeRef::Untyped => f.write_str("Edm.Untyped"),
        }
    }
}

/// A structural (non-navigation) property of a structured type.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Property {
    pub name: String,
    pub ty: TypeRef,
    /// Sub-type names permitted at this position, when constrained.
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl Property {
    pub fn new(name: &str, ty: TypeRef) -> Property {
        Property {
            name: name.to_string(),
            ty,
            derived_type_constraints: None,
        }
    }
}

/// A navigation property relating one entity type to another.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NavigationProperty {
    pub name: String,
    /// Qualified name of the target entity type.
    pub target_type: String,
    pub collection: bool,
    /// True for containment navigations: targets live under the source path.
    pub contains_target: bool,
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl NavigationProperty {
    pub fn new(name: &str, target_type: &str, collection: bool) -> NavigationProperty {
        NavigationProperty {
            name: name.to_string(),
            target_type: target_type.to_string(),
            collection,
            contains_target: false,
            derived_type_constraints: None,
        }
    }

    pub fn contained(mut self) -> Self {
        self.contains_target = true;
        self
    }
}

/// Whether a structured type is an entity type (with a key) or a complex type.
#[derive(Debug, Clone, serde::Serialize)]
pub enum StructuredKind {
    Entity { key: Vec<String> },
    Complex,
}

/// An entity or complex type: named, optionally derived, optionally open.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StructuredType {
    /// Qualified name, e.g. "NS.Customer".
    pub name: String,
    pub kind: StructuredKind,
    pub base_type: Option<String>,
    /// Open types accept undeclared properties.
    pub open: bool,
    pub properties: BTreeMap<String, Property>,
    pub navigation_properties: BTreeMap<String, NavigationProperty>,
}

impl StructuredType {
    pub fn entity(name: &str, key: &[&str]) -> StructuredType {
        StructuredType {
            name: name.to_string(),
            kind: StructuredKind::Entity {
                key: key.iter().map(|k| k.to_string()).collect(),
            },
            base_type: None,
            open: false,
            properties: BTreeMap::new(),
            navigation_properties: BTreeMap::new(),
        }
    }

    pub fn complex(name: &str) -> StructuredType {
        StructuredType {
            name: name.to_string(),
            kind: StructuredKind::Complex,
            base_type: None,
            open: false,
            properties: BTreeMap::new(),
            navigation_properties: BTreeMap::new(),
        }
    }

    pub fn derived_from(mut self, base: &str) -> Self {
        self.base_type = Some(base.to_string());
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationProperty) -> Self {
        self.navigation_properties
            .insert(navigation.name.clone(), navigation);
        self
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, StructuredKind::Entity { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_type_ref_parsing() {
        assert_eq!(
            TypeRef::parse("Edm.Int32"),
            TypeRef::Primitive(PrimitiveKind::Int32)
        );
        assert_eq!(
            TypeRef::parse("NS.Customer"),
            TypeRef::Structured("NS.Customer".to_string())
        );
        assert_eq!(
            TypeRef::parse("Collection(NS.Order)"),
            TypeRef::collection_of(TypeRef::Structured("NS.Order".to_string()))
        );
        assert_eq!(TypeRef::parse("Edm.Untyped"), TypeRef::Untyped);
        assert_eq!(
            TypeRef::parse("Collection(Edm.Untyped)").element(),
            Some(&TypeRef::Untyped)
        );
    }

    #[test]
    fn test_type_ref_display_round_trips() {
        for name in [
            "Edm.String",
            "NS.Customer",
            "Collection(NS.Order)",
            "Collection(Collection(Edm.Int32))",
            "Edm.Untyped",
        ] {
            assert_eq!(TypeRef::parse(name).to_string(), name);
        }
    }
}
