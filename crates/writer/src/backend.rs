use super::item::{
    DeletedResource, DeltaLinkInfo, DeltaResourceSet, EntityReferenceLink, NestedResourceInfo,
    PropertyInfo, Resource, ResourceSet,
};
use super::path::Path;
use super::scope::TypeContext;
use super::Error;
use edm::NavigationSource;
use serde_json::Value;

/// Context describing the scope a start hook is invoked for. The engine
/// centralizes scope construction; a back-end derives whatever per-scope
/// state it needs from this context at start-hook time.
#[derive(Debug)]
pub struct ScopeContext<'a> {
    /// True when the scope is a direct child of the payload root.
    pub is_top_level: bool,
    /// OData path mirroring the scope chain.
    pub path: &'a Path,
    pub navigation_source: Option<&'a NavigationSource>,
    /// Concrete structured type bound to the scope, when known.
    pub resource_type: Option<&'a str>,
    /// Declared type at the enclosing position; differs from
    /// `resource_type` exactly when a cast is in effect.
    pub type_from_metadata: Option<&'a str>,
    /// Metadata context of the nearest resource scope.
    pub type_context: Option<&'a TypeContext>,
}

/// The format back-end surface: the engine validates and sequences, the
/// back-end produces bytes. Every hook has an async twin which defaults to
/// the sync form, so purely synchronous back-ends implement one surface and
/// an async back-end overrides the twins it cares about.
///
/// Hooks are only ever invoked in the orders the engine's state machine
/// permits, and never for scopes outside the projection.
#[async_trait::async_trait]
pub trait Backend: Send {
    fn start_payload(&mut self) -> Result<(), Error>;
    fn end_payload(&mut self) -> Result<(), Error>;

    /// Invoked before a resource scope is established; the back-end may
    /// fill in metadata the caller omitted (ids, type annotations).
    fn prepare_resource_for_write_start(
        &mut self,
        _resource: &mut Resource,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Deleted-resource twin of `prepare_resource_for_write_start`.
    fn prepare_deleted_resource_for_write_start(
        &mut self,
        _deleted: &mut DeletedResource,
        _cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// A None resource is an explicitly null resource in link content.
    fn start_resource(
        &mut self,
        resource: Option<&Resource>,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;
    fn end_resource(&mut self, resource: Option<&Resource>) -> Result<(), Error>;

    fn start_resource_set(&mut self, set: &ResourceSet, cx: &ScopeContext<'_>)
        -> Result<(), Error>;
    fn end_resource_set(&mut self, set: &ResourceSet) -> Result<(), Error>;

    fn start_delta_resource_set(
        &mut self,
        set: &DeltaResourceSet,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;
    fn end_delta_resource_set(&mut self, set: &DeltaResourceSet) -> Result<(), Error>;

    fn start_deleted_resource(
        &mut self,
        deleted: &DeletedResource,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;
    fn end_deleted_resource(&mut self, deleted: &DeletedResource) -> Result<(), Error>;

    fn start_property(&mut self, info: &PropertyInfo, cx: &ScopeContext<'_>) -> Result<(), Error>;
    /// `value_written` is false when the property ends without a value.
    fn end_property(&mut self, info: &PropertyInfo, value_written: bool) -> Result<(), Error>;

    fn start_nested_resource_info_with_content(
        &mut self,
        link: &NestedResourceInfo,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;
    fn end_nested_resource_info_with_content(
        &mut self,
        link: &NestedResourceInfo,
    ) -> Result<(), Error>;

    /// A nested link that ended without content (responses only).
    fn write_deferred_nested_resource_info(
        &mut self,
        link: &NestedResourceInfo,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        parent_link: &NestedResourceInfo,
        reference: &EntityReferenceLink,
    ) -> Result<(), Error>;

    fn write_primitive_value(&mut self, value: &Value, cx: &ScopeContext<'_>)
        -> Result<(), Error>;

    /// One hook serves added and deleted delta links; `deleted` is the tag.
    fn write_delta_link(
        &mut self,
        link: &DeltaLinkInfo,
        deleted: bool,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error>;

    fn start_binary_stream(&mut self) -> Result<(), Error>;
    fn binary_chunk(&mut self, chunk: &[u8]) -> Result<(), Error>;
    fn end_binary_stream(&mut self) -> Result<(), Error>;

    fn start_text_writer(&mut self) -> Result<(), Error>;
    fn text_chunk(&mut self, chunk: &str) -> Result<(), Error>;
    fn end_text_writer(&mut self) -> Result<(), Error>;

    fn flush(&mut self) -> Result<(), Error>;

    // Async twins. Ordering and arguments are identical to the sync forms;
    // only the suspension points differ.

    async fn start_payload_async(&mut self) -> Result<(), Error> {
        self.start_payload()
    }
    async fn end_payload_async(&mut self) -> Result<(), Error> {
        self.end_payload()
    }
    async fn prepare_resource_for_write_start_async(
        &mut self,
        resource: &mut Resource,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.prepare_resource_for_write_start(resource, cx)
    }
    async fn prepare_deleted_resource_for_write_start_async(
        &mut self,
        deleted: &mut DeletedResource,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.prepare_deleted_resource_for_write_start(deleted, cx)
    }
    async fn start_resource_async(
        &mut self,
        resource: Option<&Resource>,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_resource(resource, cx)
    }
    async fn end_resource_async(&mut self, resource: Option<&Resource>) -> Result<(), Error> {
        self.end_resource(resource)
    }
    async fn start_resource_set_async(
        &mut self,
        set: &ResourceSet,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_resource_set(set, cx)
    }
    async fn end_resource_set_async(&mut self, set: &ResourceSet) -> Result<(), Error> {
        self.end_resource_set(set)
    }
    async fn start_delta_resource_set_async(
        &mut self,
        set: &DeltaResourceSet,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_delta_resource_set(set, cx)
    }
    async fn end_delta_resource_set_async(&mut self, set: &DeltaResourceSet) -> Result<(), Error> {
        self.end_delta_resource_set(set)
    }
    async fn start_deleted_resource_async(
        &mut self,
        deleted: &DeletedResource,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_deleted_resource(deleted, cx)
    }
    async fn end_deleted_resource_async(&mut self, deleted: &DeletedResource) -> Result<(), Error> {
        self.end_deleted_resource(deleted)
    }
    async fn start_property_async(
        &mut self,
        info: &PropertyInfo,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_property(info, cx)
    }
    async fn end_property_async(
        &mut self,
        info: &PropertyInfo,
        value_written: bool,
    ) -> Result<(), Error> {
        self.end_property(info, value_written)
    }
    async fn start_nested_resource_info_with_content_async(
        &mut self,
        link: &NestedResourceInfo,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.start_nested_resource_info_with_content(link, cx)
    }
    async fn end_nested_resource_info_with_content_async(
        &mut self,
        link: &NestedResourceInfo,
    ) -> Result<(), Error> {
        self.end_nested_resource_info_with_content(link)
    }
    async fn write_deferred_nested_resource_info_async(
        &mut self,
        link: &NestedResourceInfo,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.write_deferred_nested_resource_info(link, cx)
    }
    async fn write_entity_reference_in_navigation_link_content_async(
        &mut self,
        parent_link: &NestedResourceInfo,
        reference: &EntityReferenceLink,
    ) -> Result<(), Error> {
        self.write_entity_reference_in_navigation_link_content(parent_link, reference)
    }
    async fn write_primitive_value_async(
        &mut self,
        value: &Value,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.write_primitive_value(value, cx)
    }
    async fn write_delta_link_async(
        &mut self,
        link: &DeltaLinkInfo,
        deleted: bool,
        cx: &ScopeContext<'_>,
    ) -> Result<(), Error> {
        self.write_delta_link(link, deleted, cx)
    }
    async fn start_binary_stream_async(&mut self) -> Result<(), Error> {
        self.start_binary_stream()
    }
    async fn binary_chunk_async(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.binary_chunk(chunk)
    }
    async fn end_binary_stream_async(&mut self) -> Result<(), Error> {
        self.end_binary_stream()
    }
    async fn start_text_writer_async(&mut self) -> Result<(), Error> {
        self.start_text_writer()
    }
    async fn text_chunk_async(&mut self, chunk: &str) -> Result<(), Error> {
        self.text_chunk(chunk)
    }
    async fn end_text_writer_async(&mut self) -> Result<(), Error> {
        self.end_text_writer()
    }
    async fn flush_async(&mut self) -> Result<(), Error> {
        self.flush()
    }
}
