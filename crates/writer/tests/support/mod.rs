use edm::{EntitySet, Model, NavigationProperty, PrimitiveKind, Property, StructuredType, TypeRef};
use serde_json::Value;
use std::io;
use std::sync::{Arc, Mutex};
use writer::{
    Backend, DeletedResource, DeltaLinkInfo, DeltaResourceSet, EntityReferenceLink, Error,
    Listener, NestedResourceInfo, PropertyInfo, Resource, ResourceSet, ScopeContext,
};

/// The model every scenario runs against: customers with orders, a
/// self-referential manager link, a complex address, and an untyped bag.
pub fn model() -> Model {
    let mut model = Model::new();
    model
        .add_type(
            StructuredType::entity("NS.Customer", &["id"])
                .with_property(Property::new("id", TypeRef::Primitive(PrimitiveKind::Int32)))
                .with_property(Property::new(
                    "Name",
                    TypeRef::Primitive(PrimitiveKind::String),
                ))
                .with_property(Property::new(
                    "Photo",
                    TypeRef::Primitive(PrimitiveKind::Binary),
                ))
                .with_property(Property::new(
                    "Bio",
                    TypeRef::Primitive(PrimitiveKind::String),
                ))
                .with_property(Property::new(
                    "Address",
                    TypeRef::Structured("NS.Address".to_string()),
                ))
                .with_property(Property::new(
                    "Stuff",
                    TypeRef::collection_of(TypeRef::Untyped),
                ))
                .with_navigation(NavigationProperty::new("Orders", "NS.Order", true))
                .with_navigation(NavigationProperty::new("Manager", "NS.Customer", false)),
        )
        .unwrap();
    model
        .add_type(StructuredType::entity("NS.VipCustomer", &[]).derived_from("NS.Customer"))
        .unwrap();
    model
        .add_type(
            StructuredType::entity("NS.Order", &["id"])
                .with_property(Property::new("id", TypeRef::Primitive(PrimitiveKind::Int32)))
                .with_property(Property::new(
                    "Amount",
                    TypeRef::Primitive(PrimitiveKind::Double),
                )),
        )
        .unwrap();
    model
        .add_type(StructuredType::complex("NS.Address").with_property(Property::new(
            "City",
            TypeRef::Primitive(PrimitiveKind::String),
        )))
        .unwrap();
    model
        .add_entity_set(
            EntitySet::new("Customers", "NS.Customer")
                .with_binding("Orders", "Orders")
                .with_binding("Manager", "Customers"),
        )
        .unwrap();
    model
        .add_entity_set(EntitySet::new("Orders", "NS.Order"))
        .unwrap();
    model.verify().unwrap();
    model
}

fn item_label(id: Option<&Value>) -> String {
    match id {
        Some(value) => format!("({value})"),
        None => String::new(),
    }
}

/// A back-end that records every hook invocation as a readable label, and
/// optionally fails the n-th call to exercise the error interceptor.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<String>,
    /// Resource paths observed at `start_resource` time.
    pub paths: Vec<String>,
    /// 1-based ordinal of the call that fails, if any.
    pub fail_on: Option<usize>,
}

impl RecordingBackend {
    pub fn new() -> RecordingBackend {
        RecordingBackend::default()
    }

    pub fn failing_on(call: usize) -> RecordingBackend {
        RecordingBackend {
            fail_on: Some(call),
            ..RecordingBackend::default()
        }
    }

    fn record(&mut self, call: String) -> Result<(), Error> {
        self.calls.push(call);
        if self.fail_on == Some(self.calls.len()) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected hook failure",
            )));
        }
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn start_payload(&mut self) -> Result<(), Error> {
        self.record("start_payload".to_string())
    }

    fn end_payload(&mut self) -> Result<(), Error> {
        self.record("end_payload".to_string())
    }

    fn start_resource(
        &mut self,
        resource: Option<&Resource>,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.paths.push(cx.path.to_string());
        let label = match resource {
            Some(resource) => format!("start_resource{}", item_label(resource.property("id"))),
            None => "start_resource(null)".to_string(),
        };
        self.record(label)
    }

    fn end_resource(&mut self, _resource: Option<&Resource>) -> Result<(), Error> {
        self.record("end_resource".to_string())
    }

    fn start_resource_set(
        &mut self,
        _set: &ResourceSet,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record("start_resource_set".to_string())
    }

    fn end_resource_set(&mut self, _set: &ResourceSet) -> Result<(), Error> {
        self.record("end_resource_set".to_string())
    }

    fn start_delta_resource_set(
        &mut self,
        _set: &DeltaResourceSet,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record("start_delta_resource_set".to_string())
    }

    fn end_delta_resource_set(&mut self, _set: &DeltaResourceSet) -> Result<(), Error> {
        self.record("end_delta_resource_set".to_string())
    }

    fn start_deleted_resource(
        &mut self,
        deleted: &DeletedResource,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!(
            "start_deleted_resource{}",
            item_label(deleted.property("id"))
        ))
    }

    fn end_deleted_resource(&mut self, _deleted: &DeletedResource) -> Result<(), Error> {
        self.record("end_deleted_resource".to_string())
    }

    fn start_property(
        &mut self,
        info: &PropertyInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!("start_property({})", info.name))
    }

    fn end_property(&mut self, info: &PropertyInfo, value_written: bool) -> Result<(), Error> {
        self.record(format!("end_property({}, {value_written})", info.name))
    }

    fn start_nested_resource_info_with_content(
        &mut self,
        link: &NestedResourceInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!("start_nested({})", link.name))
    }

    fn end_nested_resource_info_with_content(
        &mut self,
        link: &NestedResourceInfo,
    ) -> Result<(), Error> {
        self.record(format!("end_nested({})", link.name))
    }

    fn write_deferred_nested_resource_info(
        &mut self,
        link: &NestedResourceInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!("deferred({})", link.name))
    }

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        parent_link: &NestedResourceInfo,
        reference: &EntityReferenceLink,
    ) -> Result<(), Error> {
        self.record(format!(
            "reference({}, {})",
            parent_link.name, reference.url
        ))
    }

    fn write_primitive_value(
        &mut self,
        value: &Value,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!("primitive({value})"))
    }

    fn write_delta_link(
        &mut self,
        link: &DeltaLinkInfo,
        deleted: bool,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.record(format!("delta_link({}, deleted: {deleted})", link.relationship))
    }

    fn start_binary_stream(&mut self) -> Result<(), Error> {
        self.record("start_binary_stream".to_string())
    }

    fn binary_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.record(format!("binary_chunk({} bytes)", chunk.len()))
    }

    fn end_binary_stream(&mut self) -> Result<(), Error> {
        self.record("end_binary_stream".to_string())
    }

    fn start_text_writer(&mut self) -> Result<(), Error> {
        self.record("start_text_writer".to_string())
    }

    fn text_chunk(&mut self, chunk: &str) -> Result<(), Error> {
        self.record(format!("text_chunk({chunk})"))
    }

    fn end_text_writer(&mut self) -> Result<(), Error> {
        self.record("end_text_writer".to_string())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.record("flush".to_string())
    }
}

/// Listener events observable from outside the writer.
#[derive(Clone, Default)]
pub struct SharedEvents(pub Arc<Mutex<Vec<String>>>);

impl SharedEvents {
    pub fn new() -> SharedEvents {
        SharedEvents::default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct EventListener(pub SharedEvents);

impl Listener for EventListener {
    fn on_completed(&mut self) {
        self.0 .0.lock().unwrap().push("completed".to_string());
    }

    fn on_exception(&mut self, error: &Error) {
        self.0 .0.lock().unwrap().push(format!("exception: {error}"));
    }
}
