use super::item::{
    DeletedResource, DeltaLinkInfo, DeltaResourceSet, NestedResourceInfo, PropertyInfo, Resource,
    ResourceSet,
};
use super::path::Path;
use super::selected::SelectedProperties;
use super::state::State;
use super::Error;
use edm::{NavigationSource, TypeRef};
use std::collections::BTreeSet;

/// Tracks property and link names already written into a resource, so that
/// a duplicate surfaces as an error instead of malformed output.
#[derive(Debug, Default)]
pub(crate) struct DuplicateChecker(BTreeSet<String>);

impl DuplicateChecker {
    pub fn check(&mut self, name: &str) -> Result<(), Error> {
        if !self.0.insert(name.to_string()) {
            return Err(Error::DuplicatePropertyName {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks instance annotations already emitted for an item, so start- and
/// end-side emission never repeats one.
#[derive(Debug, Default)]
pub(crate) struct AnnotationTracker(BTreeSet<String>);

impl AnnotationTracker {
    /// Mark an annotation written. True when this is its first write.
    pub fn mark(&mut self, name: &str) -> bool {
        self.0.insert(name.to_string())
    }
}

/// Metadata context of a resource scope, computed once on entry and reused
/// by format back-ends for context-URL and id composition.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    pub navigation_source_name: Option<String>,
    pub navigation_source_entity_type: Option<String>,
    pub expected_type_name: Option<String>,
}

/// Per-scope frame shared by Resource and DeletedResource scopes.
#[derive(Debug, Default)]
pub(crate) struct ResourceFrame {
    /// The type declared at the enclosing position; may differ from the
    /// resource's concrete type.
    pub type_from_metadata: Option<String>,
    pub duplicates: DuplicateChecker,
    pub annotations: AnnotationTracker,
    pub type_context: TypeContext,
}

/// Per-scope frame shared by ResourceSet and DeltaResourceSet scopes.
#[derive(Debug, Default)]
pub(crate) struct SetFrame {
    pub resource_count: u64,
    pub annotations: AnnotationTracker,
    /// Element type every member must be assignable to, when declared.
    pub element_type: Option<String>,
    /// Untyped sets admit primitives, nested sets, streams and strings.
    pub untyped: bool,
}

/// Kind-specific payload of a scope.
#[derive(Debug)]
pub(crate) enum ScopeKind {
    /// The root scope; also carries the Completed terminal state.
    Root,
    Resource {
        /// None models an explicitly null resource in link content.
        resource: Option<Resource>,
        frame: ResourceFrame,
    },
    DeletedResource {
        deleted: DeletedResource,
        frame: ResourceFrame,
    },
    ResourceSet {
        set: ResourceSet,
        frame: SetFrame,
    },
    DeltaResourceSet {
        set: DeltaResourceSet,
        frame: SetFrame,
    },
    NestedResourceInfo {
        link: NestedResourceInfo,
        /// Index of the owning resource scope in the stack. An index, not a
        /// reference: the stack reallocates as it grows.
        parent: usize,
        /// Content items written through this link so far.
        children: u32,
    },
    Property {
        info: PropertyInfo,
        value_written: bool,
    },
    /// Transient scope alive only for the duration of a primitive write.
    Primitive,
    /// An open binary sub-writer.
    Stream,
    /// An open text sub-writer.
    Text,
    DeltaLink {
        link: DeltaLinkInfo,
        deleted: bool,
    },
}

/// One entry on the writer's nesting stack, capturing the full state of one
/// nesting level.
#[derive(Debug)]
pub(crate) struct Scope {
    pub state: State,
    pub kind: ScopeKind,
    pub navigation_source: Option<NavigationSource>,
    /// Type bound to the scope's item, when known.
    pub item_type: Option<TypeRef>,
    /// Concrete structured type name, when `item_type` is structured.
    pub resource_type: Option<String>,
    pub selected: SelectedProperties,
    pub path: Path,
    /// Set when the scope's sub-tree is outside the projection: it is
    /// validated but produces no back-end calls.
    pub skip_writing: bool,
    /// Set within a delta payload; inherited downward.
    pub enable_delta: bool,
    pub derived_type_constraints: Option<BTreeSet<String>>,
}

impl Scope {
    pub fn new(state: State, kind: ScopeKind) -> Scope {
        Scope {
            state,
            kind,
            navigation_source: None,
            item_type: None,
            resource_type: None,
            selected: SelectedProperties::Entire,
            path: Path::empty(),
            skip_writing: false,
            enable_delta: false,
            derived_type_constraints: None,
        }
    }

    pub fn set_frame(&self) -> Option<&SetFrame> {
        match &self.kind {
            ScopeKind::ResourceSet { frame, .. } | ScopeKind::DeltaResourceSet { frame, .. } => {
                Some(frame)
            }
            _ => None,
        }
    }

    pub fn set_frame_mut(&mut self) -> Option<&mut SetFrame> {
        match &mut self.kind {
            ScopeKind::ResourceSet { frame, .. } | ScopeKind::DeltaResourceSet { frame, .. } => {
                Some(frame)
            }
            _ => None,
        }
    }

    pub fn resource_frame_mut(&mut self) -> Option<&mut ResourceFrame> {
        match &mut self.kind {
            ScopeKind::Resource { frame, .. } | ScopeKind::DeletedResource { frame, .. } => {
                Some(frame)
            }
            _ => None,
        }
    }

    pub fn nested_link(&self) -> Option<&NestedResourceInfo> {
        match &self.kind {
            ScopeKind::NestedResourceInfo { link, .. } => Some(link),
            _ => None,
        }
    }

    /// True when the scope holds an explicitly null resource.
    pub fn is_null_resource(&self) -> bool {
        matches!(&self.kind, ScopeKind::Resource { resource: None, .. })
    }
}
