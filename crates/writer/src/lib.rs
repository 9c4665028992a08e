//! A push-based, stateful writer engine for OData payloads.
//!
//! The writer accepts a stream of high-level calls (start resource set,
//! start resource, start nested link, write primitive, end, ...) and
//! validates, at every transition, that the caller is producing a
//! well-formed document against an EDM model. The engine emits no bytes
//! itself: byte production is delegated to a format [`Backend`] through a
//! small hook surface. Validation, scope tracking, type resolution and
//! path composition all happen here, identically for the sync and async
//! call families.

mod backend;
pub use backend::{Backend, ScopeContext};

mod item;
pub use item::{
    Annotation, DeletedReason, DeletedResource, DeltaLinkInfo, DeltaResourceSet,
    EntityReferenceLink, NestedResourceInfo, PropertyInfo, Resource, ResourceSet,
    SerializationInfo,
};

mod listener;
pub use listener::Listener;

mod path;
pub use path::{Path, Segment};

mod resolve;

mod scope;
pub use scope::TypeContext;

mod selected;
pub use selected::SelectedProperties;

mod settings;
pub use settings::{Mode, Settings, Version};

mod stack;

mod state;
pub use state::State;

mod stream;
pub use stream::{
    AsyncBinaryStreamWriter, AsyncTextValueWriter, BinaryStreamWriter, TextValueWriter,
};

mod transition;

mod writer;
pub use writer::{RootKind, Writer, WriterOptions};

/// The single error domain of the writer. Any failure first moves the
/// writer into its terminal error state, then surfaces as one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Transition errors.
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidStateTransition { from: State, to: State },
    #[error("invalid transition from 'Start' to '{to}': the writer was created for the other payload root")]
    InvalidTransitionFromStart { to: State },
    #[error("invalid transition from 'ResourceSet' to '{to}': a typed resource set contains only resources")]
    InvalidTransitionFromResourceSet { to: State },
    #[error("invalid transition from an expanded nested resource info to '{to}'")]
    InvalidTransitionFromExpandedLink { to: State },
    #[error("the payload is completed; no further writes are allowed")]
    InvalidTransitionFromCompleted,
    #[error("the writer is in the error state; no further writes are allowed")]
    InvalidTransitionFromError,
    #[error("invalid transition to '{to}': a null resource has no content")]
    InvalidTransitionFromNullResource { to: State },
    #[error("a deleted resource admits nested resource infos only from OData 4.01 on")]
    InvalidTransitionFrom40DeletedResource,

    // Structural errors.
    #[error("multiple items written into the non-collection nested resource info '{name}'")]
    MultipleItemsInNonCollectionNestedResourceInfo { name: String },
    #[error("an entity reference link can only be written inside a nested resource info")]
    EntityReferenceLinkWithoutNestedResourceInfo,
    #[error("an entity reference link cannot be written in a response payload")]
    EntityReferenceLinkInResponse,
    #[error("the nested resource info '{name}' has no content; deferred links are invalid in request payloads")]
    DeferredLinkInRequest { name: String },
    #[error("a value was already written for property '{name}'")]
    PropertyValueAlreadyWritten { name: String },
    #[error("a binary or text sub-writer is still open; dispose it first")]
    StreamNotDisposed,
    #[error("write-end is not valid in state '{state}'")]
    WriteEndInInvalidState { state: State },
    #[error("duplicate property name '{name}'")]
    DuplicatePropertyName { name: String },
    #[error("duplicate instance annotation '{name}'")]
    DuplicateAnnotation { name: String },
    #[error("property '{name}' is not declared on the non-open type '{type_name}'")]
    UndeclaredProperty { name: String, type_name: String },

    // Schema errors.
    #[error("resource type '{actual}' is not assignable to the expected type '{expected}'")]
    IncompatibleResourceType { actual: String, expected: String },
    #[error("type '{type_name}' violates the derived type constraint at this position")]
    DerivedTypeConstraintViolated { type_name: String },
    #[error("type '{name}' was not found in the model")]
    TypeNameNotFound { name: String },

    // Payload-shape errors.
    #[error("a count cannot be written in a request payload")]
    CountInRequest,
    #[error("a next page link cannot be written in a request payload")]
    NextLinkInRequest,
    #[error("a delta link cannot be written in a request payload")]
    DeltaLinkInRequest,
    #[error("a delta link cannot be written on an expanded resource set")]
    DeltaLinkOnExpandedResourceSet,
    #[error("a member of a top-level delta resource set requires an id or all key properties")]
    DeltaResourceWithoutIdOrKey,
    #[error("a contained entity set requires a non-empty parent path")]
    ContainmentWithoutPath,
    #[error("maximum resource nesting depth of {limit} exceeded")]
    MaxNestingDepthExceeded { limit: usize },

    // API-usage errors.
    #[error("a synchronous call was made on a writer created for asynchronous writing")]
    SyncCallOnAsyncWriter,
    #[error("an asynchronous call was made on a writer created for synchronous writing")]
    AsyncCallOnSyncWriter,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
