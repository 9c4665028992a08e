use super::{
    EntitySet, Error, NavigationProperty, NavigationSource, NavigationSourceKind, Property,
    Singleton, StructuredKind, StructuredType, TypeRef,
};
use std::collections::BTreeMap;

/// A property found on a structured type: either structural or navigation.
#[derive(Debug)]
pub enum ResolvedProperty<'m> {
    Structural(&'m Property),
    Navigation(&'m NavigationProperty),
}

/// Model indexes structured types and the entity container. It is immutable
/// once built and may be shared by any number of writers.
#[derive(Debug, Default)]
pub struct Model {
    types: BTreeMap<String, StructuredType>,
    entity_sets: BTreeMap<String, EntitySet>,
    singletons: BTreeMap<String, Singleton>,
}

impl Model {
    pub fn new() -> Model {
        Model::default()
    }

    pub fn add_type(&mut self, ty: StructuredType) -> Result<(), Error> {
        if self.types.contains_key(&ty.name) {
            return Err(Error::DuplicateType(ty.name));
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub fn add_entity_set(&mut self, set: EntitySet) -> Result<(), Error> {
        if self.entity_sets.contains_key(&set.name) {
            return Err(Error::DuplicateEntitySet(set.name));
        }
        self.entity_sets.insert(set.name.clone(), set);
        Ok(())
    }

    pub fn add_singleton(&mut self, singleton: Singleton) -> Result<(), Error> {
        if self.singletons.contains_key(&singleton.name) {
            return Err(Error::DuplicateSingleton(singleton.name));
        }
        self.singletons.insert(singleton.name.clone(), singleton);
        Ok(())
    }

    /// Verify every base-type reference resolves. Call after the last add.
    pub fn verify(&self) -> Result<(), Error> {
        for ty in self.types.values() {
            if let Some(base) = &ty.base_type {
                if !self.types.contains_key(base) {
                    return Err(Error::BaseTypeNotFound {
                        name: ty.name.clone(),
                        base: base.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.get(name)
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.entity_sets.get(name)
    }

    pub fn singleton(&self, name: &str) -> Option<&Singleton> {
        self.singletons.get(name)
    }

    /// Resolve an entity set or singleton name into a navigation source.
    pub fn navigation_source(&self, name: &str) -> Option<NavigationSource> {
        if let Some(set) = self.entity_sets.get(name) {
            return Some(NavigationSource {
                name: set.name.clone(),
                entity_type: set.entity_type.clone(),
                kind: NavigationSourceKind::EntitySet,
            });
        }
        self.singletons.get(name).map(|s| NavigationSource {
            name: s.name.clone(),
            entity_type: s.entity_type.clone(),
            kind: NavigationSourceKind::Singleton,
        })
    }

    /// Look up a property by name on a structured type, walking the
    /// base-type chain. Navigation properties shadow nothing: names are
    /// unique per type in a valid model.
    pub fn find_property<'m>(
        &'m self,
        type_name: &str,
        property: &str,
    ) -> Option<ResolvedProperty<'m>> {
        let mut current = self.types.get(type_name);
        while let Some(ty) = current {
            if let Some(p) = ty.properties.get(property) {
                return Some(ResolvedProperty::Structural(p));
            }
            if let Some(n) = ty.navigation_properties.get(property) {
                return Some(ResolvedProperty::Navigation(n));
            }
            current = ty.base_type.as_deref().and_then(|b| self.types.get(b));
        }
        None
    }

    /// True when `sub` names `base` or a type derived from it.
    pub fn is_assignable(&self, sub: &str, base: &str) -> bool {
        let mut current = Some(sub);
        while let Some(name) = current {
            if name == base {
                return true;
            }
            current = self
                .types
                .get(name)
                .and_then(|ty| ty.base_type.as_deref());
        }
        false
    }

    /// True when a type, or any of its base types, declares itself open.
    pub fn is_open(&self, type_name: &str) -> bool {
        let mut current = self.types.get(type_name);
        while let Some(ty) = current {
            if ty.open {
                return true;
            }
            current = ty.base_type.as_deref().and_then(|b| self.types.get(b));
        }
        false
    }

    /// Key property names of an entity type, resolved through its base chain
    /// (the key is declared on the root of the chain).
    pub fn key_properties(&self, type_name: &str) -> Option<&[String]> {
        let mut current = self.types.get(type_name);
        while let Some(ty) = current {
            if let StructuredKind::Entity { key } = &ty.kind {
                if !key.is_empty() {
                    return Some(key);
                }
            }
            current = ty.base_type.as_deref().and_then(|b| self.types.get(b));
        }
        None
    }

    /// Element type of a named collection type, e.g.
    /// "Collection(NS.Order)" resolves to the NS.Order reference.
    /// Returns None when the name is not a collection or the element is
    /// structured but unknown to the model.
    pub fn collection_element(&self, type_name: &str) -> Option<TypeRef> {
        let element = TypeRef::parse(type_name).element()?.clone();
        if let Some(name) = element.structured_name() {
            if !self.types.contains_key(name) {
                return None;
            }
        }
        Some(element)
    }

    /// Resolve the navigation source reached by following `navigation` from
    /// `source` along `binding_path`. Containment navigations yield a
    /// contained entity set; an unbound navigation yields an unknown set.
    pub fn resolve_navigation_target(
        &self,
        source: &NavigationSource,
        navigation: &NavigationProperty,
        binding_path: &str,
    ) -> NavigationSource {
        if navigation.contains_target {
            return NavigationSource {
                name: format!("{}/{}", source.name, navigation.name),
                entity_type: navigation.target_type.clone(),
                kind: NavigationSourceKind::ContainedEntitySet,
            };
        }

        let bindings = match source.kind {
            NavigationSourceKind::EntitySet => {
                self.entity_sets.get(&source.name).map(|s| &s.bindings)
            }
            NavigationSourceKind::Singleton => {
                self.singletons.get(&source.name).map(|s| &s.bindings)
            }
            _ => None,
        };
        let target = bindings
            .and_then(|b| b.get(binding_path))
            .and_then(|name| self.entity_sets.get(name));

        match target {
            Some(set) => NavigationSource {
                name: set.name.clone(),
                entity_type: set.entity_type.clone(),
                kind: NavigationSourceKind::EntitySet,
            },
            None => NavigationSource {
                name: navigation.name.clone(),
                entity_type: navigation.target_type.clone(),
                kind: NavigationSourceKind::UnknownEntitySet,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::{PrimitiveKind, ResolvedProperty};
    use super::*;

    fn fixture() -> Model {
        let mut model = Model::new();
        model
            .add_type(
                StructuredType::entity("NS.Person", &["id"])
                    .with_property(Property::new("id", TypeRef::Primitive(PrimitiveKind::Int32)))
                    .with_property(Property::new(
                        "Name",
                        TypeRef::Primitive(PrimitiveKind::String),
                    )),
            )
            .unwrap();
        model
            .add_type(
                StructuredType::entity("NS.Customer", &[])
                    .derived_from("NS.Person")
                    .with_navigation(NavigationProperty::new("Orders", "NS.Order", true)),
            )
            .unwrap();
        model
            .add_type(
                StructuredType::entity("NS.Order", &["id"]).with_property(Property::new(
                    "id",
                    TypeRef::Primitive(PrimitiveKind::Int32),
                )),
            )
            .unwrap();
        model
            .add_entity_set(EntitySet::new("Customers", "NS.Customer").with_binding("Orders", "Orders"))
            .unwrap();
        model.add_entity_set(EntitySet::new("Orders", "NS.Order")).unwrap();
        model.verify().unwrap();
        model
    }

    #[test]
    fn test_property_lookup_walks_base_chain() {
        let model = fixture();

        // "Name" is declared on the base type NS.Person.
        match model.find_property("NS.Customer", "Name") {
            Some(ResolvedProperty::Structural(p)) => {
                assert_eq!(p.ty, TypeRef::Primitive(PrimitiveKind::String))
            }
            other => panic!("unexpected: {other:?}"),
        }
        match model.find_property("NS.Customer", "Orders") {
            Some(ResolvedProperty::Navigation(n)) => assert!(n.collection),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(model.find_property("NS.Customer", "Nope").is_none());
    }

    #[test]
    fn test_assignability_and_keys() {
        let model = fixture();

        assert!(model.is_assignable("NS.Customer", "NS.Person"));
        assert!(model.is_assignable("NS.Person", "NS.Person"));
        assert!(!model.is_assignable("NS.Person", "NS.Customer"));

        // The key is declared on the root of the base chain.
        assert_eq!(
            model.key_properties("NS.Customer").unwrap(),
            &["id".to_string()]
        );
    }

    #[test]
    fn test_navigation_target_resolution() {
        let model = fixture();
        let source = model.navigation_source("Customers").unwrap();
        let nav = NavigationProperty::new("Orders", "NS.Order", true);

        let target = model.resolve_navigation_target(&source, &nav, "Orders");
        assert_eq!(target.name, "Orders");
        assert_eq!(target.kind, NavigationSourceKind::EntitySet);

        // Unbound navigations degrade to an unknown set of the target type.
        let unbound = NavigationProperty::new("Friends", "NS.Person", true);
        let target = model.resolve_navigation_target(&source, &unbound, "Friends");
        assert_eq!(target.kind, NavigationSourceKind::UnknownEntitySet);
        assert_eq!(target.entity_type, "NS.Person");

        // Containment navigations stay under the parent path.
        let contained = NavigationProperty::new("AuditLog", "NS.Order", true).contained();
        let target = model.resolve_navigation_target(&source, &contained, "AuditLog");
        assert_eq!(target.kind, NavigationSourceKind::ContainedEntitySet);
        assert_eq!(target.name, "Customers/AuditLog");
    }

    #[test]
    fn test_collection_element() {
        let model = fixture();
        assert_eq!(
            model.collection_element("Collection(NS.Order)"),
            Some(TypeRef::Structured("NS.Order".to_string()))
        );
        assert_eq!(model.collection_element("Collection(NS.Missing)"), None);
        assert_eq!(model.collection_element("NS.Order"), None);
        assert_eq!(
            model.collection_element("Collection(Edm.String)"),
            Some(TypeRef::Primitive(PrimitiveKind::String))
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut model = fixture();
        match model.add_entity_set(EntitySet::new("Customers", "NS.Customer")) {
            Err(Error::DuplicateEntitySet(name)) => assert_eq!(name, "Customers"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
