use super::settings::Version;
use super::state::State;
use super::writer::RootKind;
use super::Error as WriterError;

/// Context a transition decision depends on beyond the two states.
#[derive(Debug)]
pub(crate) struct TransitionContext {
    pub root_kind: RootKind,
    pub version: Version,
    /// The current resource set is untyped (declared Edm.Untyped).
    pub untyped_set: bool,
    /// The current resource scope holds an explicitly null resource.
    pub null_resource: bool,
    /// The current scope sits within a delta payload.
    pub enable_delta: bool,
    /// The current scope is a direct child of the payload root; delta links
    /// live only there.
    pub top_level: bool,
}

/// Validate that the writer may move from `from` into `to`. Errors name the
/// offending source state where a dedicated variant exists.
pub(crate) fn validate(from: State, to: State, cx: &TransitionContext) -> Result<(), WriterError> {
    use State::*;

    match from {
        Start => match (to, cx.root_kind) {
            (ResourceSet | DeltaResourceSet, RootKind::ResourceSet) => Ok(()),
            (Resource | DeletedResource, RootKind::Resource) => Ok(()),
            _ => Err(WriterError::InvalidTransitionFromStart { to }),
        },
        Resource if cx.null_resource => Err(WriterError::InvalidTransitionFromNullResource { to }),
        Resource => match to {
            NestedResourceInfo | Property => Ok(()),
            _ => Err(WriterError::InvalidStateTransition { from, to }),
        },
        DeletedResource => match to {
            NestedResourceInfo if cx.version < Version::V4_01 => {
                Err(WriterError::InvalidTransitionFrom40DeletedResource)
            }
            NestedResourceInfo | Property => Ok(()),
            _ => Err(WriterError::InvalidStateTransition { from, to }),
        },
        ResourceSet => match to {
            Resource => Ok(()),
            Primitive | Stream | String | ResourceSet if cx.untyped_set => Ok(()),
            _ => Err(WriterError::InvalidTransitionFromResourceSet { to }),
        },
        DeltaResourceSet => match to {
            Resource | DeletedResource => Ok(()),
            DeltaLink | DeltaDeletedLink if cx.top_level && cx.enable_delta => Ok(()),
            _ => Err(WriterError::InvalidStateTransition { from, to }),
        },
        NestedResourceInfo => match to {
            NestedResourceInfoWithContent => Ok(()),
            _ => Err(WriterError::InvalidStateTransition { from, to }),
        },
        NestedResourceInfoWithContent => match to {
            ResourceSet | Resource | Primitive => Ok(()),
            DeltaResourceSet | DeletedResource if cx.version >= Version::V4_01 => Ok(()),
            _ => Err(WriterError::InvalidTransitionFromExpandedLink { to }),
        },
        Property => match to {
            Stream | String | Primitive => Ok(()),
            _ => Err(WriterError::InvalidStateTransition { from, to }),
        },
        // Anything written through an open sub-writer scope must go through
        // the sub-writer itself.
        Stream | String => Err(WriterError::StreamNotDisposed),
        Primitive | DeltaLink | DeltaDeletedLink => {
            Err(WriterError::InvalidStateTransition { from, to })
        }
        Completed => Err(WriterError::InvalidTransitionFromCompleted),
        Error => Err(WriterError::InvalidTransitionFromError),
    }
}
