use super::item::{NestedResourceInfo, SerializationInfo};
use super::path::{Path, Segment};
use super::scope::{Scope, TypeContext};
use super::selected::SelectedProperties;
use super::state::State;
use super::Error;
use edm::{Model, NavigationSource, NavigationSourceKind, ResolvedProperty, TypeRef};
use serde_json::Value;
use std::collections::BTreeSet;

/// Bindings computed for a scope about to be pushed. The convention
/// throughout: `item_type` names the *instance* type at the position — for
/// sets and collection links that is the element type, with cardinality
/// carried separately.
#[derive(Debug, Default)]
pub(crate) struct Seed {
    pub navigation_source: Option<NavigationSource>,
    pub item_type: Option<TypeRef>,
    pub resource_type: Option<String>,
    pub path: Path,
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl Seed {
    /// Inherit everything from the enclosing scope.
    pub fn inherited(parent: &Scope) -> Seed {
        Seed {
            navigation_source: parent.navigation_source.clone(),
            item_type: parent.item_type.clone(),
            resource_type: parent.resource_type.clone(),
            path: parent.path.clone(),
            derived_type_constraints: parent.derived_type_constraints.clone(),
        }
    }
}

/// Result of binding a resource (or deleted resource) scope.
#[derive(Debug)]
pub(crate) struct ResolvedResource {
    pub seed: Seed,
    pub type_from_metadata: Option<String>,
    pub type_context: TypeContext,
}

/// Result of binding a nested link at promotion time.
#[derive(Debug)]
pub(crate) struct ResolvedLink {
    pub seed: Seed,
    pub is_collection: bool,
    /// The link resolved to a complex-typed structural property.
    pub complex: bool,
}

/// Result of binding a resource-set scope.
#[derive(Debug)]
pub(crate) struct ResolvedSet {
    pub seed: Seed,
    pub element_type: Option<String>,
    pub untyped: bool,
}

/// Interpret a serialization-info hint into a navigation source and,
/// for entity sets and singletons, a fresh root path. Failures are
/// swallowed: callers have long depended on bad hints being ignored.
fn navigation_source_from_hint(
    model: &Model,
    info: &SerializationInfo,
) -> Option<(NavigationSource, Option<Path>)> {
    let name = info.navigation_source_name.as_deref()?;

    if let Some(source) = model.navigation_source(name) {
        let root = match source.kind {
            NavigationSourceKind::EntitySet => {
                Some(Path::root(Segment::EntitySet(source.name.clone())))
            }
            NavigationSourceKind::Singleton => {
                Some(Path::root(Segment::Singleton(source.name.clone())))
            }
            _ => None,
        };
        return Some((source, root));
    }

    // The container doesn't know the name; synthesize a source from the
    // remaining hints when they suffice, otherwise drop the hint.
    match &info.navigation_source_entity_type_name {
        Some(entity_type) => {
            let kind = info
                .navigation_source_kind
                .unwrap_or(NavigationSourceKind::UnknownEntitySet);
            let root = match kind {
                NavigationSourceKind::EntitySet => {
                    Some(Path::root(Segment::EntitySet(name.to_string())))
                }
                NavigationSourceKind::Singleton => {
                    Some(Path::root(Segment::Singleton(name.to_string())))
                }
                _ => None,
            };
            Some((
                NavigationSource {
                    name: name.to_string(),
                    entity_type: entity_type.clone(),
                    kind,
                },
                root,
            ))
        }
        None => {
            tracing::warn!(
                navigation_source = name,
                "ignoring serialization info naming an unknown navigation source"
            );
            None
        }
    }
}

/// Resolve a type hint from serialization info, swallowing failures.
fn type_from_hint(model: &Model, info: &SerializationInfo) -> Option<TypeRef> {
    let name = info.expected_type_name.as_deref()?;
    let ty = TypeRef::parse(name);
    let instance = ty.element().unwrap_or(&ty);

    if let Some(structured) = instance.structured_name() {
        if model.structured_type(structured).is_none() {
            tracing::warn!(
                expected_type = name,
                "ignoring serialization info naming an unknown expected type"
            );
            return None;
        }
    }
    Some(instance.clone())
}

fn intersect_constraints(
    a: Option<BTreeSet<String>>,
    b: Option<&BTreeSet<String>>,
) -> Option<BTreeSet<String>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    }
}

/// Bind a resource (or deleted resource) scope: concrete type, declared
/// type, navigation source, and path with key and cast segments.
pub(crate) fn resolve_resource(
    model: &Model,
    parent: &Scope,
    type_name: Option<&str>,
    serialization_info: Option<&SerializationInfo>,
    properties: &[(String, Value)],
) -> Result<ResolvedResource, Error> {
    let mut seed = Seed::inherited(parent);

    // The declared type at this position is whatever the enclosing scope
    // resolved as its instance type.
    let declared = parent
        .item_type
        .as_ref()
        .and_then(TypeRef::structured_name)
        .map(str::to_string);

    // Concrete type: the resource's own type name is authoritative and must
    // resolve; serialization-info hints are best-effort.
    let concrete = match type_name {
        Some(name) => {
            if model.structured_type(name).is_none() {
                return Err(Error::TypeNameNotFound {
                    name: name.to_string(),
                });
            }
            Some(name.to_string())
        }
        None => serialization_info
            .and_then(|info| type_from_hint(model, info))
            .as_ref()
            .and_then(TypeRef::structured_name)
            .map(str::to_string)
            .or_else(|| declared.clone()),
    };

    if let (Some(concrete), Some(declared)) = (&concrete, &declared) {
        if concrete != declared {
            if !model.is_assignable(concrete, declared) {
                return Err(Error::IncompatibleResourceType {
                    actual: concrete.clone(),
                    expected: declared.clone(),
                });
            }
            if let Some(constraints) = &parent.derived_type_constraints {
                if !constraints.contains(concrete) {
                    return Err(Error::DerivedTypeConstraintViolated {
                        type_name: concrete.clone(),
                    });
                }
            }
        }
    }

    if let Some((source, root)) =
        serialization_info.and_then(|info| navigation_source_from_hint(model, info))
    {
        seed.navigation_source = Some(source);
        if let Some(root) = root {
            seed.path = root;
        }
    }

    // Key segment: only positions backed by an entity collection take one.
    let keyed_position = match parent.state {
        State::ResourceSet | State::DeltaResourceSet => true,
        State::Start => matches!(
            seed.navigation_source.as_ref().map(|s| s.kind),
            Some(NavigationSourceKind::EntitySet | NavigationSourceKind::ContainedEntitySet)
        ),
        _ => false,
    };
    if keyed_position {
        let key_type = concrete.as_deref().or(declared.as_deref());
        if let Some(keys) = key_type.and_then(|t| model.key_properties(t)) {
            let values: Vec<(String, Value)> = keys
                .iter()
                .filter_map(|key| {
                    properties
                        .iter()
                        .find(|(name, _)| name == key)
                        .map(|(name, value)| (name.clone(), value.clone()))
                })
                .collect();
            if values.len() == keys.len() {
                seed.path.push(Segment::Key(values));
            }
        }
    }

    if let (Some(concrete), Some(declared)) = (&concrete, &declared) {
        if concrete != declared {
            seed.path.push(Segment::Cast(concrete.clone()));
        }
    }

    let type_context = TypeContext {
        navigation_source_name: seed.navigation_source.as_ref().map(|s| s.name.clone()),
        navigation_source_entity_type: seed
            .navigation_source
            .as_ref()
            .map(|s| s.entity_type.clone()),
        expected_type_name: declared.clone().or_else(|| concrete.clone()),
    };

    seed.item_type = concrete
        .clone()
        .map(TypeRef::Structured)
        .or_else(|| parent.item_type.clone());
    seed.resource_type = concrete;

    Ok(ResolvedResource {
        seed,
        type_from_metadata: declared,
        type_context,
    })
}

/// Bind a resource-set scope: element type (explicit collection type name,
/// hint, or inherited) and untyped-ness.
pub(crate) fn resolve_resource_set(
    model: &Model,
    parent: &Scope,
    type_name: Option<&str>,
    serialization_info: Option<&SerializationInfo>,
) -> Result<ResolvedSet, Error> {
    let mut seed = Seed::inherited(parent);
    let declared = parent.item_type.clone();

    let element = match type_name {
        Some(name) => match model.collection_element(name) {
            Some(element) => Some(element),
            None => {
                return Err(Error::TypeNameNotFound {
                    name: name.to_string(),
                })
            }
        },
        None => serialization_info
            .and_then(|info| type_from_hint(model, info))
            .or_else(|| declared.clone()),
    };

    if let Some((source, root)) =
        serialization_info.and_then(|info| navigation_source_from_hint(model, info))
    {
        seed.navigation_source = Some(source);
        if let Some(root) = root {
            seed.path = root;
        }
    }

    // A set declared untyped stays untyped even when the instance carries
    // its own collection type name; that name still types the members.
    let untyped = element.as_ref().map(TypeRef::is_untyped).unwrap_or(false)
        || declared.as_ref().map(TypeRef::is_untyped).unwrap_or(false);

    let element_type = element
        .as_ref()
        .and_then(TypeRef::structured_name)
        .map(str::to_string);

    seed.resource_type = element_type.clone();
    seed.item_type = element;

    Ok(ResolvedSet {
        seed,
        element_type,
        untyped,
    })
}

/// Bind a nested link's declared property at promotion time.
pub(crate) fn resolve_nested_link(
    model: &Model,
    parent: &Scope,
    link: &NestedResourceInfo,
) -> Result<ResolvedLink, Error> {
    let mut seed = Seed::inherited(parent);

    let parent_type = parent.resource_type.as_deref();
    let declared = parent_type.and_then(|t| model.find_property(t, &link.name));

    match declared {
        Some(ResolvedProperty::Navigation(nav)) => {
            if nav.contains_target && parent.path.is_empty() {
                return Err(Error::ContainmentWithoutPath);
            }
            let source = parent
                .navigation_source
                .as_ref()
                .map(|s| model.resolve_navigation_target(s, nav, &link.name));

            let mut constraints =
                intersect_constraints(None, nav.derived_type_constraints.as_ref());
            if let Some(source) = &source {
                if let Some(set) = model.entity_set(&source.name) {
                    constraints =
                        intersect_constraints(constraints, set.derived_type_constraints.as_ref());
                }
            }

            seed.item_type = Some(TypeRef::Structured(nav.target_type.clone()));
            seed.resource_type = Some(nav.target_type.clone());
            seed.derived_type_constraints = constraints;
            seed.navigation_source = source;
            seed.path.push(Segment::Navigation(link.name.clone()));

            Ok(ResolvedLink {
                seed,
                is_collection: nav.collection,
                complex: false,
            })
        }
        Some(ResolvedProperty::Structural(property)) => {
            let collection = matches!(property.ty, TypeRef::Collection(_));
            let instance = property.ty.element().unwrap_or(&property.ty).clone();
            let complex = instance
                .structured_name()
                .and_then(|n| model.structured_type(n))
                .map(|t| !t.is_entity())
                .unwrap_or(false);

            seed.resource_type = instance.structured_name().map(str::to_string);
            seed.item_type = Some(instance);
            seed.derived_type_constraints = intersect_constraints(
                seed.derived_type_constraints.take(),
                property.derived_type_constraints.as_ref(),
            );
            seed.path.push(Segment::Property(link.name.clone()));

            Ok(ResolvedLink {
                seed,
                is_collection: collection,
                complex,
            })
        }
        None => {
            if let Some(type_name) = parent_type {
                if !model.is_open(type_name) {
                    return Err(Error::UndeclaredProperty {
                        name: link.name.clone(),
                        type_name: type_name.to_string(),
                    });
                }
            }
            // Dynamic link on an open (or unbound) type.
            seed.item_type = None;
            seed.resource_type = None;
            seed.path.push(Segment::Property(link.name.clone()));

            Ok(ResolvedLink {
                seed,
                is_collection: link.is_collection.unwrap_or(false),
                complex: false,
            })
        }
    }
}

/// Bind a property scope: declared type lookup with the open-type rule.
pub(crate) fn resolve_property(
    model: &Model,
    parent: &Scope,
    name: &str,
) -> Result<Seed, Error> {
    let mut seed = Seed::inherited(parent);

    match parent.resource_type.as_deref() {
        Some(type_name) => match model.find_property(type_name, name) {
            Some(ResolvedProperty::Structural(property)) => {
                seed.resource_type = property.ty.structured_name().map(str::to_string);
                seed.item_type = Some(property.ty.clone());
            }
            // A navigation property streamed as a plain property passes
            // through untyped; its value is the caller's business.
            Some(ResolvedProperty::Navigation(_)) => {
                seed.item_type = None;
                seed.resource_type = None;
            }
            None => {
                if !model.is_open(type_name) {
                    return Err(Error::UndeclaredProperty {
                        name: name.to_string(),
                        type_name: type_name.to_string(),
                    });
                }
                seed.item_type = None;
                seed.resource_type = None;
            }
        },
        None => {
            seed.item_type = None;
            seed.resource_type = None;
        }
    }
    seed.path.push(Segment::Property(name.to_string()));
    Ok(seed)
}

/// Descend the projection tree through a link or property name. Returns the
/// child projection and whether the sub-tree is skipped.
pub(crate) fn descend_projection(
    parent: &Scope,
    name: &str,
) -> (SelectedProperties, bool) {
    match parent.selected.child(name) {
        Some(selected) => (selected, parent.skip_writing),
        None => (SelectedProperties::Entire, true),
    }
}
