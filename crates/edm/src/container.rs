use std::collections::{BTreeMap, BTreeSet};

/// Kind of navigation source a scope's resources originate from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub enum NavigationSourceKind {
    EntitySet,
    Singleton,
    /// An entity set reached through a containment navigation; it has no
    /// container entry of its own and is addressed through its parent path.
    ContainedEntitySet,
    /// A navigation with no binding: the set is real but unnamed.
    UnknownEntitySet,
}

/// An entity set declared in the container.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntitySet {
    pub name: String,
    /// Qualified name of the set's entity type.
    pub entity_type: String,
    /// Navigation property bindings: binding path (e.g. "Orders" or
    /// "Address/City") to the name of the target entity set.
    pub bindings: BTreeMap<String, String>,
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl EntitySet {
    pub fn new(name: &str, entity_type: &str) -> EntitySet {
        EntitySet {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            bindings: BTreeMap::new(),
            derived_type_constraints: None,
        }
    }

    pub fn with_binding(mut self, path: &str, target_set: &str) -> Self {
        self.bindings.insert(path.to_string(), target_set.to_string());
        self
    }
}

/// A singleton declared in the container.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Singleton {
    pub name: String,
    pub entity_type: String,
    pub bindings: BTreeMap<String, String>,
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl Singleton {
    pub fn new(name: &str, entity_type: &str) -> Singleton {
        Singleton {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            bindings: BTreeMap::new(),
            derived_type_constraints: None,
        }
    }

    pub fn with_binding(mut self, path: &str, target_set: &str) -> Self {
        self.bindings.insert(path.to_string(), target_set.to_string());
        self
    }
}

/// A resolved navigation source: the place resources of the current writer
/// scope originate from. Cheap to clone; scopes hold one each.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NavigationSource {
    pub name: String,
    /// Qualified name of the source's entity type.
    pub entity_type: String,
    pub kind: NavigationSourceKind,
}

impl NavigationSource {
    pub fn is_collection(&self) -> bool {
        !matches!(self.kind, NavigationSourceKind::Singleton)
    }
}
