use std::fmt::{self, Display};

/// State of the writer as observed between public operations. Every scope on
/// the stack carries the state it was entered with; the writer's current
/// state is that of the top scope (or Error, which is sticky).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing has been written. The root scope starts here.
    Start,
    ResourceSet,
    DeltaResourceSet,
    Resource,
    DeletedResource,
    /// A nested link has been started but has no content yet.
    NestedResourceInfo,
    /// A nested link whose first content write has occurred.
    NestedResourceInfoWithContent,
    /// Transient: exists only while a primitive value is being written.
    Primitive,
    Property,
    /// An open binary sub-writer.
    Stream,
    /// An open text sub-writer.
    String,
    DeltaLink,
    DeltaDeletedLink,
    /// The payload ended; the root scope rests here.
    Completed,
    Error,
}

impl State {
    /// Terminal states admit no further transitions (other than the
    /// idempotent Error to Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Error)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Start => "Start",
            State::ResourceSet => "ResourceSet",
            State::DeltaResourceSet => "DeltaResourceSet",
            State::Resource => "Resource",
            State::DeletedResource => "DeletedResource",
            State::NestedResourceInfo => "NestedResourceInfo",
            State::NestedResourceInfoWithContent => "NestedResourceInfoWithContent",
            State::Primitive => "Primitive",
            State::Property => "Property",
            State::Stream => "Stream",
            State::String => "String",
            State::DeltaLink => "DeltaLink",
            State::DeltaDeletedLink => "DeltaDeletedLink",
            State::Completed => "Completed",
            State::Error => "Error",
        };
        f.write_str(name)
    }
}
