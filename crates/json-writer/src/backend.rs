use super::emitter::Emitter;
use serde_json::Value;
use std::io;
use writer::{
    Annotation, Backend, DeletedReason, DeletedResource, DeltaLinkInfo, DeltaResourceSet,
    EntityReferenceLink, Error, NestedResourceInfo, PropertyInfo, Resource, ResourceSet,
    ScopeContext, Settings,
};

// Mirror of the engine's scopes, tracking only what emission needs: which
// container closes what, and nested property names not yet written.
#[derive(Debug)]
enum Frame {
    Set { top_level: bool },
    DeltaSet { top_level: bool },
    Resource { null: bool },
    DeletedResource,
    Property,
    Nested {
        name: String,
        pending: bool,
        collection: bool,
        array_open: bool,
    },
}

/// The OData JSON format back-end: receives the engine's hooks and writes
/// the payload to any `io::Write`. Context URLs are emitted when the
/// settings carry a service root, and omitted otherwise.
pub struct JsonBackend<W: io::Write> {
    emitter: Emitter<W>,
    settings: Settings,
    frames: Vec<Frame>,
    base64_carry: Vec<u8>,
}

impl<W: io::Write> JsonBackend<W> {
    pub fn new(w: W, settings: Settings) -> JsonBackend<W> {
        JsonBackend {
            emitter: Emitter::new(w),
            settings,
            frames: Vec::new(),
            base64_carry: Vec::new(),
        }
    }

    /// Recover the sink, e.g. after `Writer::into_inner`.
    pub fn into_inner(self) -> W {
        self.emitter.into_inner()
    }

    /// Context fragment for a collection-valued scope: the navigation
    /// source name, falling back to the path.
    fn collection_context_url(&self, cx: &ScopeContext<'_>, suffix: &str) -> Option<String> {
        let root = self.settings.service_root.as_ref()?;
        let name = match cx.navigation_source {
            Some(source) => source.name.clone(),
            None if cx.path.is_empty() => return None,
            None => cx.path.to_string(),
        };
        Some(format!("{root}$metadata#{name}{suffix}"))
    }

    fn write_context(&mut self, context: Option<String>) -> io::Result<()> {
        if let Some(context) = context {
            self.emitter.name("@odata.context")?;
            self.emitter.string(&context)?;
        }
        Ok(())
    }

    /// Emit a deferred nested property name; expanded-set counts precede it
    /// as a name-qualified annotation.
    fn flush_pending_name(&mut self, count: Option<i64>) -> io::Result<()> {
        let name = match self.frames.last_mut() {
            Some(Frame::Nested { name, pending, .. }) if *pending => {
                *pending = false;
                name.clone()
            }
            _ => return Ok(()),
        };
        if let Some(count) = count {
            self.emitter.name(&format!("{name}@odata.count"))?;
            self.emitter.value(&Value::from(count))?;
        }
        self.emitter.name(&name)
    }

    fn write_annotations(&mut self, annotations: &[Annotation]) -> io::Result<()> {
        for annotation in annotations {
            self.emitter.name(&format!("@{}", annotation.name))?;
            self.emitter.value(&annotation.value)?;
        }
        Ok(())
    }

    fn write_properties(&mut self, properties: &[(String, Value)]) -> io::Result<()> {
        for (name, value) in properties {
            self.emitter.name(name)?;
            self.emitter.value(value)?;
        }
        Ok(())
    }
}

impl<W: io::Write + Send> Backend for JsonBackend<W> {
    fn start_payload(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_payload(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn start_resource_set(
        &mut self,
        set: &ResourceSet,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        if cx.is_top_level {
            self.emitter.begin_object()?;
            let context = self.collection_context_url(cx, "");
            self.write_context(context)?;
            self.write_annotations(&set.annotations)?;
            if let Some(count) = set.count {
                self.emitter.name("@odata.count")?;
                self.emitter.value(&Value::from(count))?;
            }
            self.emitter.name("value")?;
            self.emitter.begin_array()?;
        } else {
            self.flush_pending_name(set.count)?;
            self.emitter.begin_array()?;
        }
        self.frames.push(Frame::Set {
            top_level: cx.is_top_level,
        });
        Ok(())
    }

    fn end_resource_set(&mut self, set: &ResourceSet) -> Result<(), Error> {
        let top_level = matches!(self.frames.pop(), Some(Frame::Set { top_level: true }));
        self.emitter.end_array()?;
        if top_level {
            if let Some(next) = &set.next_page_link {
                self.emitter.name("@odata.nextLink")?;
                self.emitter.string(next.as_str())?;
            }
            if let Some(delta) = &set.delta_link {
                self.emitter.name("@odata.deltaLink")?;
                self.emitter.string(delta.as_str())?;
            }
            self.emitter.end_object()?;
        }
        Ok(())
    }

    fn start_delta_resource_set(
        &mut self,
        set: &DeltaResourceSet,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        if cx.is_top_level {
            self.emitter.begin_object()?;
            let context = self.collection_context_url(cx, "/$delta");
            self.write_context(context)?;
            self.write_annotations(&set.annotations)?;
            if let Some(count) = set.count {
                self.emitter.name("@odata.count")?;
                self.emitter.value(&Value::from(count))?;
            }
            self.emitter.name("value")?;
            self.emitter.begin_array()?;
        } else {
            self.flush_pending_name(set.count)?;
            self.emitter.begin_array()?;
        }
        self.frames.push(Frame::DeltaSet {
            top_level: cx.is_top_level,
        });
        Ok(())
    }

    fn end_delta_resource_set(&mut self, set: &DeltaResourceSet) -> Result<(), Error> {
        let top_level = matches!(self.frames.pop(), Some(Frame::DeltaSet { top_level: true }));
        self.emitter.end_array()?;
        if top_level {
            if let Some(next) = &set.next_page_link {
                self.emitter.name("@odata.nextLink")?;
                self.emitter.string(next.as_str())?;
            }
            if let Some(delta) = &set.delta_link {
                self.emitter.name("@odata.deltaLink")?;
                self.emitter.string(delta.as_str())?;
            }
            self.emitter.end_object()?;
        }
        Ok(())
    }

    fn start_resource(
        &mut self,
        resource: Option<&Resource>,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.flush_pending_name(None)?;

        let resource = match resource {
            Some(resource) => resource,
            None => {
                self.emitter.value(&Value::Null)?;
                self.frames.push(Frame::Resource { null: true });
                return Ok(());
            }
        };

        self.emitter.begin_object()?;
        if cx.is_top_level {
            let context = self.collection_context_url(cx, "/$entity");
            self.write_context(context)?;
        }
        if let Some(actual) = cx.resource_type {
            if cx.type_from_metadata != Some(actual) {
                self.emitter.name("@odata.type")?;
                self.emitter.string(&format!("#{actual}"))?;
            }
        }
        if let Some(id) = &resource.id {
            self.emitter.name("@odata.id")?;
            self.emitter.string(id.as_str())?;
        }
        self.write_annotations(&resource.annotations)?;
        self.write_properties(&resource.properties)?;
        self.frames.push(Frame::Resource { null: false });
        Ok(())
    }

    fn end_resource(&mut self, _resource: Option<&Resource>) -> Result<(), Error> {
        let null = matches!(self.frames.pop(), Some(Frame::Resource { null: true }));
        if !null {
            self.emitter.end_object()?;
        }
        Ok(())
    }

    fn start_deleted_resource(
        &mut self,
        deleted: &DeletedResource,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.flush_pending_name(None)?;
        self.emitter.begin_object()?;
        self.emitter.name("@removed")?;
        self.emitter.begin_object()?;
        if let Some(reason) = deleted.reason {
            self.emitter.name("reason")?;
            self.emitter.string(match reason {
                DeletedReason::Changed => "changed",
                DeletedReason::Deleted => "deleted",
            })?;
        }
        self.emitter.end_object()?;
        if let Some(id) = &deleted.id {
            self.emitter.name("@odata.id")?;
            self.emitter.string(id.as_str())?;
        }
        self.write_annotations(&deleted.annotations)?;
        self.write_properties(&deleted.properties)?;
        self.frames.push(Frame::DeletedResource);
        Ok(())
    }

    fn end_deleted_resource(&mut self, _deleted: &DeletedResource) -> Result<(), Error> {
        self.frames.pop();
        self.emitter.end_object()?;
        Ok(())
    }

    fn start_property(
        &mut self,
        info: &PropertyInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        for annotation in &info.annotations {
            self.emitter
                .name(&format!("{}@{}", info.name, annotation.name))?;
            self.emitter.value(&annotation.value)?;
        }
        self.emitter.name(&info.name)?;
        self.frames.push(Frame::Property);
        Ok(())
    }

    fn end_property(&mut self, _info: &PropertyInfo, value_written: bool) -> Result<(), Error> {
        self.frames.pop();
        if !value_written {
            self.emitter.value(&Value::Null)?;
        }
        Ok(())
    }

    fn start_nested_resource_info_with_content(
        &mut self,
        link: &NestedResourceInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.frames.push(Frame::Nested {
            name: link.name.clone(),
            pending: true,
            collection: link.is_collection == Some(true),
            array_open: false,
        });
        Ok(())
    }

    fn end_nested_resource_info_with_content(
        &mut self,
        _link: &NestedResourceInfo,
    ) -> Result<(), Error> {
        if let Some(Frame::Nested { array_open, .. }) = self.frames.pop() {
            if array_open {
                self.emitter.end_array()?;
            }
        }
        Ok(())
    }

    fn write_deferred_nested_resource_info(
        &mut self,
        link: &NestedResourceInfo,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        if let Some(url) = &link.url {
            self.emitter
                .name(&format!("{}@odata.navigationLink", link.name))?;
            self.emitter.string(url.as_str())?;
        }
        Ok(())
    }

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        parent_link: &NestedResourceInfo,
        reference: &EntityReferenceLink,
    ) -> Result<(), Error> {
        self.flush_pending_name(None)?;
        if parent_link.is_collection == Some(true) {
            let already_open = match self.frames.last_mut() {
                Some(Frame::Nested {
                    array_open,
                    collection: true,
                    ..
                }) => {
                    let was = *array_open;
                    *array_open = true;
                    was
                }
                _ => true,
            };
            if !already_open {
                self.emitter.begin_array()?;
            }
        }
        self.emitter.begin_object()?;
        self.emitter.name("@odata.id")?;
        self.emitter.string(reference.url.as_str())?;
        self.emitter.end_object()?;
        Ok(())
    }

    fn write_primitive_value(
        &mut self,
        value: &Value,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.flush_pending_name(None)?;
        self.emitter.value(value)?;
        Ok(())
    }

    fn write_delta_link(
        &mut self,
        link: &DeltaLinkInfo,
        deleted: bool,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.emitter.begin_object()?;
        let suffix = if deleted { "/$deletedLink" } else { "/$link" };
        let context = self.collection_context_url(cx, suffix);
        self.write_context(context)?;
        self.emitter.name("source")?;
        self.emitter.string(link.source.as_str())?;
        self.emitter.name("relationship")?;
        self.emitter.string(&link.relationship)?;
        self.emitter.name("target")?;
        self.emitter.string(link.target.as_str())?;
        self.emitter.end_object()?;
        Ok(())
    }

    fn start_binary_stream(&mut self) -> Result<(), Error> {
        self.flush_pending_name(None)?;
        self.base64_carry.clear();
        self.emitter.begin_string()?;
        Ok(())
    }

    fn binary_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let mut buffer = std::mem::take(&mut self.base64_carry);
        buffer.extend_from_slice(chunk);
        let whole = buffer.len() - buffer.len() % 3;
        self.emitter.plain_chunk(&base64::encode(&buffer[..whole]))?;
        self.base64_carry = buffer.split_off(whole);
        Ok(())
    }

    fn end_binary_stream(&mut self) -> Result<(), Error> {
        if !self.base64_carry.is_empty() {
            let carry = std::mem::take(&mut self.base64_carry);
            self.emitter.plain_chunk(&base64::encode(&carry))?;
        }
        self.emitter.end_string()?;
        Ok(())
    }

    fn start_text_writer(&mut self) -> Result<(), Error> {
        self.flush_pending_name(None)?;
        self.emitter.begin_string()?;
        Ok(())
    }

    fn text_chunk(&mut self, chunk: &str) -> Result<(), Error> {
        self.emitter.escaped_chunk(chunk)?;
        Ok(())
    }

    fn end_text_writer(&mut self) -> Result<(), Error> {
        self.emitter.end_string()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.emitter.flush()?;
        Ok(())
    }
}
