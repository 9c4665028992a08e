use edm::NavigationSourceKind;
use serde_json::Value;
use url::Url;

/// An instance annotation attached to a payload item.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Qualified name, e.g. "custom.hint".
    pub name: String,
    pub value: Value,
}

impl Annotation {
    pub fn new(name: &str, value: Value) -> Annotation {
        Annotation {
            name: name.to_string(),
            value,
        }
    }
}

/// Caller-supplied hints that stand in for model metadata when a payload is
/// written without (or beyond) a bound navigation source. Failures to
/// interpret these hints are silently dropped, matching long-standing
/// behavior callers depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializationInfo {
    pub navigation_source_name: Option<String>,
    pub navigation_source_kind: Option<NavigationSourceKind>,
    pub navigation_source_entity_type_name: Option<String>,
    pub expected_type_name: Option<String>,
}

/// A structured record: an entity or complex value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    /// Qualified concrete type name; resolved against the model when given.
    pub type_name: Option<String>,
    pub id: Option<Url>,
    /// Primitive properties carried inline, in write order.
    pub properties: Vec<(String, Value)>,
    pub serialization_info: Option<SerializationInfo>,
    pub annotations: Vec<Annotation>,
}

impl Resource {
    pub fn new() -> Resource {
        Resource::default()
    }

    pub fn of_type(type_name: &str) -> Resource {
        Resource {
            type_name: Some(type_name.to_string()),
            ..Resource::default()
        }
    }

    pub fn with_id(mut self, id: Url) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.push((name.to_string(), value));
        self
    }

    /// Value of a named inline property, when present.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Why a deleted resource left the set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeletedReason {
    /// The resource no longer matches the set's filter.
    Changed,
    /// The resource was deleted outright.
    Deleted,
}

/// A resource reported as removed within a delta resource set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletedResource {
    pub id: Option<Url>,
    pub reason: Option<DeletedReason>,
    pub type_name: Option<String>,
    pub properties: Vec<(String, Value)>,
    pub serialization_info: Option<SerializationInfo>,
    pub annotations: Vec<Annotation>,
}

impl DeletedResource {
    pub fn new() -> DeletedResource {
        DeletedResource::default()
    }

    pub fn with_id(mut self, id: Url) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_reason(mut self, reason: DeletedReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.push((name.to_string(), value));
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// An ordered sequence of resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    /// Declared collection type name, e.g. "Collection(NS.Order)".
    pub type_name: Option<String>,
    pub count: Option<i64>,
    pub next_page_link: Option<Url>,
    pub delta_link: Option<Url>,
    pub serialization_info: Option<SerializationInfo>,
    pub annotations: Vec<Annotation>,
}

impl ResourceSet {
    pub fn new() -> ResourceSet {
        ResourceSet::default()
    }

    pub fn of_type(type_name: &str) -> ResourceSet {
        ResourceSet {
            type_name: Some(type_name.to_string()),
            ..ResourceSet::default()
        }
    }
}

/// A resource set representing a change feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaResourceSet {
    pub count: Option<i64>,
    pub next_page_link: Option<Url>,
    pub delta_link: Option<Url>,
    pub serialization_info: Option<SerializationInfo>,
    pub annotations: Vec<Annotation>,
}

impl DeltaResourceSet {
    pub fn new() -> DeltaResourceSet {
        DeltaResourceSet::default()
    }
}

/// A named link from a resource to a related resource or resource set:
/// a navigation property or a complex-typed structural property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedResourceInfo {
    pub name: String,
    /// Cardinality, when the caller knows it; refined from the model when
    /// the link's property is declared.
    pub is_collection: Option<bool>,
    pub url: Option<Url>,
}

impl NestedResourceInfo {
    pub fn named(name: &str) -> NestedResourceInfo {
        NestedResourceInfo {
            name: name.to_string(),
            ..NestedResourceInfo::default()
        }
    }

    pub fn collection(name: &str) -> NestedResourceInfo {
        NestedResourceInfo {
            name: name.to_string(),
            is_collection: Some(true),
            ..NestedResourceInfo::default()
        }
    }

    pub fn single(name: &str) -> NestedResourceInfo {
        NestedResourceInfo {
            name: name.to_string(),
            is_collection: Some(false),
            ..NestedResourceInfo::default()
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }
}

/// A property written with a streamed or separately-supplied value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub annotations: Vec<Annotation>,
}

impl PropertyInfo {
    pub fn named(name: &str) -> PropertyInfo {
        PropertyInfo {
            name: name.to_string(),
            annotations: Vec::new(),
        }
    }
}

/// A reference to an entity by id, written into navigation link content on
/// request payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReferenceLink {
    pub url: Url,
}

/// An added or deleted link between two entities, written into a top-level
/// delta resource set.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaLinkInfo {
    pub source: Url,
    pub relationship: String,
    pub target: Url,
}
