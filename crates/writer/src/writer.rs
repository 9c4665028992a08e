use super::backend::{Backend, ScopeContext};
use super::item::{
    Annotation, DeletedResource, DeltaLinkInfo, DeltaResourceSet, EntityReferenceLink,
    NestedResourceInfo, PropertyInfo, Resource, ResourceSet,
};
use super::listener::Listener;
use super::path::{Path, Segment};
use super::resolve::{self, Seed};
use super::scope::{AnnotationTracker, ResourceFrame, Scope, ScopeKind, SetFrame};
use super::selected::SelectedProperties;
use super::settings::{Mode, Settings};
use super::stack::ScopeStack;
use super::state::State;
use super::stream::{
    AsyncBinaryStreamWriter, AsyncTextValueWriter, BinaryStreamWriter, TextValueWriter,
};
use super::transition::{self, TransitionContext};
use super::Error;
use edm::{Model, NavigationSourceKind, TypeRef};
use serde_json::Value;

/// What the writer was created to produce at the payload root.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RootKind {
    /// A top-level resource set (or delta resource set).
    ResourceSet,
    /// A single top-level resource (or deleted resource).
    Resource,
}

/// Construction-time options of a writer.
#[derive(Debug)]
pub struct WriterOptions {
    pub mode: Mode,
    pub kind: RootKind,
    /// Entity set or singleton name resources originate from.
    pub navigation_source: Option<String>,
    /// Expected type at the root; defaults to the navigation source's
    /// entity type.
    pub element_type: Option<String>,
    pub selected: SelectedProperties,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            mode: Mode::Sync,
            kind: RootKind::ResourceSet,
            navigation_source: None,
            element_type: None,
            selected: SelectedProperties::Entire,
        }
    }
}

/// The push-based OData payload writer. Each public operation validates the
/// requested transition against the current scope, updates the scope stack,
/// and drives the format back-end; any failure moves the writer into the
/// terminal error state before surfacing.
///
/// Every operation has an async twin. A writer is constructed for one
/// calling mode and refuses the other family. A writer is not thread-safe:
/// it is driven by exactly one caller.
pub struct Writer<'m, B: Backend> {
    backend: B,
    model: &'m Model,
    settings: Settings,
    mode: Mode,
    root_kind: RootKind,
    stack: ScopeStack,
    listener: Option<Box<dyn Listener + Send>>,
    payload_started: bool,
    errored: bool,
    /// Simultaneously open resource scopes, bounded by the settings.
    resource_depth: usize,
}

impl<'m, B: Backend> Writer<'m, B> {
    pub fn new(backend: B, model: &'m Model, settings: Settings, options: WriterOptions) -> Self {
        let mut root = Scope::new(State::Start, ScopeKind::Root);

        if let Some(name) = &options.navigation_source {
            match model.navigation_source(name) {
                Some(source) => {
                    root.path = match source.kind {
                        NavigationSourceKind::EntitySet => {
                            Path::root(Segment::EntitySet(source.name.clone()))
                        }
                        NavigationSourceKind::Singleton => {
                            Path::root(Segment::Singleton(source.name.clone()))
                        }
                        _ => Path::empty(),
                    };
                    root.derived_type_constraints = model
                        .entity_set(&source.name)
                        .and_then(|s| s.derived_type_constraints.clone())
                        .or_else(|| {
                            model
                                .singleton(&source.name)
                                .and_then(|s| s.derived_type_constraints.clone())
                        });
                    root.navigation_source = Some(source);
                }
                None => {
                    tracing::warn!(
                        navigation_source = name.as_str(),
                        "root navigation source not found in the model"
                    );
                }
            }
        }

        let element = options.element_type.clone().or_else(|| {
            root.navigation_source
                .as_ref()
                .map(|s| s.entity_type.clone())
        });
        if let Some(element) = element {
            let ty = TypeRef::parse(&element);
            root.resource_type = ty.structured_name().map(str::to_string);
            root.item_type = Some(ty);
        }
        root.selected = options.selected;

        Writer {
            backend,
            model,
            settings,
            mode: options.mode,
            root_kind: options.kind,
            stack: ScopeStack::new(root),
            listener: None,
            payload_started: false,
            errored: false,
            resource_depth: 0,
        }
    }

    pub fn with_listener(mut self, listener: Box<dyn Listener + Send>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Current state: that of the top scope, or Error once entered.
    pub fn state(&self) -> State {
        if self.errored {
            State::Error
        } else {
            self.stack.current().state
        }
    }

    /// Depth of the scope stack, the root scope included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Consume the writer, returning the back-end. Further writes are
    /// statically impossible after this.
    pub fn into_inner(self) -> B {
        self.backend
    }

    // ---- public operations, sync family ----

    pub fn start_resource_set(&mut self, set: ResourceSet) -> Result<(), Error> {
        let r = self.start_resource_set_impl(set);
        self.intercept(r)
    }

    pub fn start_delta_resource_set(&mut self, set: DeltaResourceSet) -> Result<(), Error> {
        let r = self.start_delta_resource_set_impl(set);
        self.intercept(r)
    }

    pub fn start_resource(&mut self, resource: Resource) -> Result<(), Error> {
        let r = self.start_resource_impl(resource);
        self.intercept(r)
    }

    /// Write an explicitly null resource into nested link content.
    pub fn start_null_resource(&mut self) -> Result<(), Error> {
        let r = self.start_null_resource_impl();
        self.intercept(r)
    }

    pub fn start_deleted_resource(&mut self, deleted: DeletedResource) -> Result<(), Error> {
        let r = self.start_deleted_resource_impl(deleted);
        self.intercept(r)
    }

    pub fn start_nested_resource_info(&mut self, link: NestedResourceInfo) -> Result<(), Error> {
        let r = self.start_nested_resource_info_impl(link, Mode::Sync);
        self.intercept(r)
    }

    pub fn start_property(&mut self, info: PropertyInfo) -> Result<(), Error> {
        let r = self.start_property_impl(info);
        self.intercept(r)
    }

    pub fn write_primitive(&mut self, value: Value) -> Result<(), Error> {
        let r = self.write_primitive_impl(value);
        self.intercept(r)
    }

    pub fn write_entity_reference_link(
        &mut self,
        reference: EntityReferenceLink,
    ) -> Result<(), Error> {
        let r = self.write_entity_reference_link_impl(reference);
        self.intercept(r)
    }

    pub fn write_delta_link(&mut self, link: DeltaLinkInfo) -> Result<(), Error> {
        let r = self.write_delta_link_impl(link, false);
        self.intercept(r)
    }

    pub fn write_delta_deleted_link(&mut self, link: DeltaLinkInfo) -> Result<(), Error> {
        let r = self.write_delta_link_impl(link, true);
        self.intercept(r)
    }

    /// Open a binary sub-writer over the current property (or untyped set)
    /// value. The writer is inaccessible until the sub-writer is disposed.
    pub fn create_binary_stream(&mut self) -> Result<BinaryStreamWriter<'_, 'm, B>, Error> {
        let r = self.open_sub_writer_impl(false, Mode::Sync);
        self.intercept(r)?;
        Ok(BinaryStreamWriter::new(self))
    }

    /// Text twin of `create_binary_stream`.
    pub fn create_text_writer(&mut self) -> Result<TextValueWriter<'_, 'm, B>, Error> {
        let r = self.open_sub_writer_impl(true, Mode::Sync);
        self.intercept(r)?;
        Ok(TextValueWriter::new(self))
    }

    /// End the current scope. Ending the last top-level scope completes the
    /// payload: the back-end sees `end_payload` and a flush, and the
    /// listener is notified.
    pub fn end(&mut self) -> Result<(), Error> {
        let r = self.end_impl();
        self.intercept(r)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        let r = self.flush_impl();
        self.intercept(r)
    }

    // ---- public operations, async family ----

    pub async fn start_resource_set_async(&mut self, set: ResourceSet) -> Result<(), Error> {
        let r = self.start_resource_set_impl_async(set).await;
        self.intercept(r)
    }

    pub async fn start_delta_resource_set_async(
        &mut self,
        set: DeltaResourceSet,
    ) -> Result<(), Error> {
        let r = self.start_delta_resource_set_impl_async(set).await;
        self.intercept(r)
    }

    pub async fn start_resource_async(&mut self, resource: Resource) -> Result<(), Error> {
        let r = self.start_resource_impl_async(resource).await;
        self.intercept(r)
    }

    pub async fn start_null_resource_async(&mut self) -> Result<(), Error> {
        let r = self.start_null_resource_impl_async().await;
        self.intercept(r)
    }

    pub async fn start_deleted_resource_async(
        &mut self,
        deleted: DeletedResource,
    ) -> Result<(), Error> {
        let r = self.start_deleted_resource_impl_async(deleted).await;
        self.intercept(r)
    }

    pub async fn start_nested_resource_info_async(
        &mut self,
        link: NestedResourceInfo,
    ) -> Result<(), Error> {
        let r = self.start_nested_resource_info_impl(link, Mode::Async);
        self.intercept(r)
    }

    pub async fn start_property_async(&mut self, info: PropertyInfo) -> Result<(), Error> {
        let r = self.start_property_impl_async(info).await;
        self.intercept(r)
    }

    pub async fn write_primitive_async(&mut self, value: Value) -> Result<(), Error> {
        let r = self.write_primitive_impl_async(value).await;
        self.intercept(r)
    }

    pub async fn write_entity_reference_link_async(
        &mut self,
        reference: EntityReferenceLink,
    ) -> Result<(), Error> {
        let r = self.write_entity_reference_link_impl_async(reference).await;
        self.intercept(r)
    }

    pub async fn write_delta_link_async(&mut self, link: DeltaLinkInfo) -> Result<(), Error> {
        let r = self.write_delta_link_impl_async(link, false).await;
        self.intercept(r)
    }

    pub async fn write_delta_deleted_link_async(
        &mut self,
        link: DeltaLinkInfo,
    ) -> Result<(), Error> {
        let r = self.write_delta_link_impl_async(link, true).await;
        self.intercept(r)
    }

    pub async fn create_binary_stream_async(
        &mut self,
    ) -> Result<AsyncBinaryStreamWriter<'_, 'm, B>, Error> {
        let r = self.open_sub_writer_impl_async(false).await;
        self.intercept(r)?;
        Ok(AsyncBinaryStreamWriter::new(self))
    }

    pub async fn create_text_writer_async(
        &mut self,
    ) -> Result<AsyncTextValueWriter<'_, 'm, B>, Error> {
        let r = self.open_sub_writer_impl_async(true).await;
        self.intercept(r)?;
        Ok(AsyncTextValueWriter::new(self))
    }

    pub async fn end_async(&mut self) -> Result<(), Error> {
        let r = self.end_impl_async().await;
        self.intercept(r)
    }

    pub async fn flush_async(&mut self) -> Result<(), Error> {
        let r = self.flush_impl_async().await;
        self.intercept(r)
    }

    // ---- the error interceptor ----

    /// Route every public result through here: the first failure moves the
    /// writer into the error state (notifying the listener once) before the
    /// error surfaces. A second transition is a no-op so teardown paths
    /// compose.
    fn intercept<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(error) = &result {
            self.enter_error(error);
        }
        result
    }

    fn enter_error(&mut self, error: &Error) {
        if self.errored {
            return;
        }
        self.errored = true;
        tracing::debug!(%error, "writer entered the error state");
        if let Some(listener) = &mut self.listener {
            listener.on_exception(error);
        }
    }

    // ---- shared validation & bookkeeping (always synchronous) ----

    fn check_sync(&self) -> Result<(), Error> {
        match self.mode {
            Mode::Sync => Ok(()),
            Mode::Async => Err(Error::SyncCallOnAsyncWriter),
        }
    }

    fn check_async(&self) -> Result<(), Error> {
        match self.mode {
            Mode::Async => Ok(()),
            Mode::Sync => Err(Error::AsyncCallOnSyncWriter),
        }
    }

    fn validate_transition(&self, to: State) -> Result<(), Error> {
        let current = self.stack.current();
        let cx = TransitionContext {
            root_kind: self.root_kind,
            version: self.settings.version,
            untyped_set: current.set_frame().map(|f| f.untyped).unwrap_or(false),
            null_resource: current.is_null_resource(),
            enable_delta: current.enable_delta,
            top_level: self.stack.grandparent().is_none() && self.stack.parent().is_some(),
        };
        transition::validate(self.state(), to, &cx)
    }

    fn push_scope(&mut self, scope: Scope) {
        tracing::debug!(state = %scope.state, path = %scope.path, "push scope");
        if matches!(scope.state, State::Resource | State::DeletedResource) {
            self.resource_depth += 1;
        }
        self.stack.push(scope);
    }

    fn pop_scope(&mut self) -> Scope {
        let scope = self.stack.pop();
        tracing::debug!(state = %scope.state, "pop scope");
        if matches!(scope.state, State::Resource | State::DeletedResource) {
            self.resource_depth -= 1;
        }
        scope
    }

    /// Payload-shape rules common to plain and delta resource sets.
    fn check_set_links(
        &self,
        count: Option<i64>,
        next_page_link: Option<&url::Url>,
        delta_link: Option<&url::Url>,
    ) -> Result<(), Error> {
        if self.settings.is_request {
            if count.is_some() {
                return Err(Error::CountInRequest);
            }
            if next_page_link.is_some() {
                return Err(Error::NextLinkInRequest);
            }
            if delta_link.is_some() {
                return Err(Error::DeltaLinkInRequest);
            }
        }
        // A delta link belongs to the payload root, never an expanded set.
        if delta_link.is_some() && self.stack.len() > 1 {
            return Err(Error::DeltaLinkOnExpandedResourceSet);
        }
        Ok(())
    }

    fn prepare_resource_set(&mut self, set: ResourceSet) -> Result<Scope, Error> {
        self.validate_transition(State::ResourceSet)?;
        self.check_set_links(set.count, set.next_page_link.as_ref(), set.delta_link.as_ref())?;

        let parent = self.stack.current();
        let resolved = resolve::resolve_resource_set(
            self.model,
            parent,
            set.type_name.as_deref(),
            set.serialization_info.as_ref(),
        )?;

        let mut frame = SetFrame {
            element_type: resolved.element_type,
            untyped: resolved.untyped,
            ..SetFrame::default()
        };
        mark_annotations(&mut frame.annotations, &set.annotations)?;
        let mut scope = Scope::new(State::ResourceSet, ScopeKind::ResourceSet { set, frame });
        apply_seed(&mut scope, resolved.seed);
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    fn prepare_delta_resource_set(&mut self, set: DeltaResourceSet) -> Result<Scope, Error> {
        self.validate_transition(State::DeltaResourceSet)?;
        self.check_set_links(set.count, set.next_page_link.as_ref(), set.delta_link.as_ref())?;

        let parent = self.stack.current();
        let resolved =
            resolve::resolve_resource_set(self.model, parent, None, set.serialization_info.as_ref())?;

        let mut frame = SetFrame {
            element_type: resolved.element_type,
            untyped: false,
            ..SetFrame::default()
        };
        mark_annotations(&mut frame.annotations, &set.annotations)?;
        let mut scope = Scope::new(
            State::DeltaResourceSet,
            ScopeKind::DeltaResourceSet { set, frame },
        );
        apply_seed(&mut scope, resolved.seed);
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = true;
        Ok(scope)
    }

    fn prepare_resource(&mut self, resource: Option<Resource>) -> Result<Scope, Error> {
        self.validate_transition(State::Resource)?;
        if self.resource_depth + 1 > self.settings.max_nesting_depth {
            return Err(Error::MaxNestingDepthExceeded {
                limit: self.settings.max_nesting_depth,
            });
        }

        let (mut scope, resource_type) = match resource {
            Some(resource) => {
                let parent = self.stack.current();
                let resolved = resolve::resolve_resource(
                    self.model,
                    parent,
                    resource.type_name.as_deref(),
                    resource.serialization_info.as_ref(),
                    &resource.properties,
                )?;
                self.check_delta_membership(
                    resource.id.is_some(),
                    resolved.seed.resource_type.as_deref(),
                    &resource.properties,
                )?;

                let resource_type = resolved.seed.resource_type.clone();
                let mut frame = ResourceFrame {
                    type_from_metadata: resolved.type_from_metadata,
                    type_context: resolved.type_context,
                    ..ResourceFrame::default()
                };
                // Inline properties claim their names up front.
                for (name, _) in &resource.properties {
                    frame.duplicates.check(name)?;
                }
                mark_annotations(&mut frame.annotations, &resource.annotations)?;
                let mut scope = Scope::new(
                    State::Resource,
                    ScopeKind::Resource {
                        resource: Some(resource),
                        frame,
                    },
                );
                apply_seed(&mut scope, resolved.seed);
                (scope, resource_type)
            }
            None => {
                let parent = self.stack.current();
                let seed = Seed::inherited(parent);
                let resource_type = seed.resource_type.clone();
                let mut scope = Scope::new(
                    State::Resource,
                    ScopeKind::Resource {
                        resource: None,
                        frame: ResourceFrame {
                            type_from_metadata: parent.resource_type.clone(),
                            ..ResourceFrame::default()
                        },
                    },
                );
                apply_seed(&mut scope, seed);
                (scope, resource_type)
            }
        };

        self.note_set_member(resource_type.as_deref())?;

        let parent = self.stack.current();
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    fn prepare_deleted_resource(&mut self, deleted: DeletedResource) -> Result<Scope, Error> {
        self.validate_transition(State::DeletedResource)?;
        if self.resource_depth + 1 > self.settings.max_nesting_depth {
            return Err(Error::MaxNestingDepthExceeded {
                limit: self.settings.max_nesting_depth,
            });
        }

        let parent = self.stack.current();
        let resolved = resolve::resolve_resource(
            self.model,
            parent,
            deleted.type_name.as_deref(),
            deleted.serialization_info.as_ref(),
            &deleted.properties,
        )?;
        self.check_delta_membership(
            deleted.id.is_some(),
            resolved.seed.resource_type.as_deref(),
            &deleted.properties,
        )?;

        let resource_type = resolved.seed.resource_type.clone();
        let mut frame = ResourceFrame {
            type_from_metadata: resolved.type_from_metadata,
            type_context: resolved.type_context,
            ..ResourceFrame::default()
        };
        for (name, _) in &deleted.properties {
            frame.duplicates.check(name)?;
        }
        mark_annotations(&mut frame.annotations, &deleted.annotations)?;
        let mut scope = Scope::new(
            State::DeletedResource,
            ScopeKind::DeletedResource { deleted, frame },
        );
        apply_seed(&mut scope, resolved.seed);

        self.note_set_member(resource_type.as_deref())?;

        let parent = self.stack.current();
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    /// Within a top-level delta resource set, a member carries an id or the
    /// full key of its entity type.
    fn check_delta_membership(
        &self,
        has_id: bool,
        resource_type: Option<&str>,
        properties: &[(String, Value)],
    ) -> Result<(), Error> {
        let parent = self.stack.current();
        if parent.state != State::DeltaResourceSet || !self.stack.is_top_level() {
            return Ok(());
        }
        if has_id {
            return Ok(());
        }
        if let Some(keys) = resource_type.and_then(|t| self.model.key_properties(t)) {
            if keys
                .iter()
                .all(|key| properties.iter().any(|(name, _)| name == key))
            {
                return Ok(());
            }
        }
        Err(Error::DeltaResourceWithoutIdOrKey)
    }

    /// Count a new member of the enclosing set and hold it to the set's
    /// single element type.
    fn note_set_member(&mut self, resource_type: Option<&str>) -> Result<(), Error> {
        let model = self.model;
        let frame = match self.stack.current_mut().set_frame_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        frame.resource_count += 1;
        if let (Some(actual), Some(expected)) = (resource_type, frame.element_type.as_deref()) {
            if actual != expected && !model.is_assignable(actual, expected) {
                return Err(Error::IncompatibleResourceType {
                    actual: actual.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        Ok(())
    }

    fn prepare_nested_link(&mut self, link: NestedResourceInfo) -> Result<Scope, Error> {
        self.validate_transition(State::NestedResourceInfo)?;

        let parent_index = self.stack.top_index();
        let parent = self.stack.current();
        let (selected, skip) = resolve::descend_projection(parent, &link.name);

        let mut scope = Scope::new(
            State::NestedResourceInfo,
            ScopeKind::NestedResourceInfo {
                link,
                parent: parent_index,
                children: 0,
            },
        );
        // Bindings inherit until promotion resolves the declared property.
        apply_seed(&mut scope, Seed::inherited(parent));
        scope.selected = selected;
        scope.skip_writing = skip;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    fn prepare_property(&mut self, info: PropertyInfo) -> Result<Scope, Error> {
        self.validate_transition(State::Property)?;
        {
            let frame = self
                .stack
                .current_mut()
                .resource_frame_mut()
                .expect("validated: the current scope is a resource");
            frame.duplicates.check(&info.name)?;
        }

        let parent = self.stack.current();
        let seed = resolve::resolve_property(self.model, parent, &info.name)?;
        let (selected, skip) = resolve::descend_projection(parent, &info.name);

        let mut scope = Scope::new(
            State::Property,
            ScopeKind::Property {
                info,
                value_written: false,
            },
        );
        apply_seed(&mut scope, seed);
        scope.selected = selected;
        scope.skip_writing = skip;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    fn prepare_primitive(&mut self) -> Result<Scope, Error> {
        if let ScopeKind::Property {
            value_written: true,
            info,
        } = &self.stack.current().kind
        {
            return Err(Error::PropertyValueAlreadyWritten {
                name: info.name.clone(),
            });
        }
        self.validate_transition(State::Primitive)?;

        let parent = self.stack.current();
        let mut scope = Scope::new(State::Primitive, ScopeKind::Primitive);
        apply_seed(&mut scope, Seed::inherited(parent));
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;
        Ok(scope)
    }

    /// Record that the current scope received its value: a property becomes
    /// written, an untyped set counts a member.
    fn note_value_written(&mut self) {
        let scope = self.stack.current_mut();
        match &mut scope.kind {
            ScopeKind::Property { value_written, .. } => *value_written = true,
            ScopeKind::ResourceSet { frame, .. } => frame.resource_count += 1,
            _ => {}
        }
    }

    /// Shared non-hook half of nested-link promotion: resolve the link's
    /// declared property, run duplicate detection on the owning resource,
    /// and re-tag the scope with refined bindings.
    fn promote_link_prepare(&mut self) -> Result<(), Error> {
        let parent_index = match &self.stack.current().kind {
            ScopeKind::NestedResourceInfo { parent, .. } => *parent,
            _ => unreachable!("promotion outside a nested link"),
        };

        let resolved = {
            let owner = self
                .stack
                .get(parent_index)
                .expect("link parent index is live");
            let link = self
                .stack
                .current()
                .nested_link()
                .expect("promotion outside a nested link");
            resolve::resolve_nested_link(self.model, owner, link)?
        };

        if !resolved.complex {
            let name = self
                .stack
                .current()
                .nested_link()
                .expect("promotion outside a nested link")
                .name
                .clone();
            if let Some(frame) = self
                .stack
                .get_mut(parent_index)
                .and_then(|scope| scope.resource_frame_mut())
            {
                frame.duplicates.check(&name)?;
            }
        }

        let scope = self.stack.current_mut();
        scope.state = State::NestedResourceInfoWithContent;
        scope.navigation_source = resolved.seed.navigation_source;
        scope.item_type = resolved.seed.item_type;
        scope.resource_type = resolved.seed.resource_type;
        scope.path = resolved.seed.path;
        scope.derived_type_constraints = resolved.seed.derived_type_constraints;
        match &mut scope.kind {
            ScopeKind::NestedResourceInfo { link, children, .. } => {
                link.is_collection = Some(resolved.is_collection);
                *children = 1;
            }
            _ => unreachable!("promotion outside a nested link"),
        }
        Ok(())
    }

    /// A further content item arrived on an already-promoted link.
    fn note_additional_link_content(&mut self) -> Result<(), Error> {
        match &mut self.stack.current_mut().kind {
            ScopeKind::NestedResourceInfo { link, children, .. } => {
                if link.is_collection != Some(true) {
                    return Err(Error::MultipleItemsInNonCollectionNestedResourceInfo {
                        name: link.name.clone(),
                    });
                }
                *children += 1;
                tracing::trace!(
                    link = link.name.as_str(),
                    children = *children,
                    "additional nested link content"
                );
                Ok(())
            }
            _ => unreachable!("content note outside a nested link"),
        }
    }

    // ---- sync impl bodies ----

    fn ensure_payload_started(&mut self) -> Result<(), Error> {
        if self.payload_started {
            return Ok(());
        }
        self.payload_started = true;
        tracing::trace!("start_payload");
        self.backend.start_payload()
    }

    fn promote_open_link(&mut self) -> Result<(), Error> {
        match self.state() {
            State::NestedResourceInfo => {
                self.promote_link_prepare()?;
                self.hook_start_nested()
            }
            State::NestedResourceInfoWithContent => self.note_additional_link_content(),
            _ => Ok(()),
        }
    }

    fn start_resource_set_impl(&mut self, set: ResourceSet) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        let scope = self.prepare_resource_set(set)?;
        self.push_scope(scope);
        self.hook_start_resource_set()
    }

    fn start_delta_resource_set_impl(&mut self, set: DeltaResourceSet) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        let scope = self.prepare_delta_resource_set(set)?;
        self.push_scope(scope);
        self.hook_start_delta_resource_set()
    }

    fn start_resource_impl(&mut self, mut resource: Resource) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        self.validate_transition(State::Resource)?;
        {
            let top = self.stack.len() == 1;
            let scope = self.stack.current();
            if !scope.skip_writing {
                let cx = scope_context(scope, top);
                self.backend
                    .prepare_resource_for_write_start(&mut resource, &cx)?;
            }
        }
        let scope = self.prepare_resource(Some(resource))?;
        self.push_scope(scope);
        self.hook_start_resource()
    }

    fn start_null_resource_impl(&mut self) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        let scope = self.prepare_resource(None)?;
        self.push_scope(scope);
        self.hook_start_resource()
    }

    fn start_deleted_resource_impl(&mut self, mut deleted: DeletedResource) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        self.validate_transition(State::DeletedResource)?;
        {
            let top = self.stack.len() == 1;
            let scope = self.stack.current();
            if !scope.skip_writing {
                let cx = scope_context(scope, top);
                self.backend
                    .prepare_deleted_resource_for_write_start(&mut deleted, &cx)?;
            }
        }
        let scope = self.prepare_deleted_resource(deleted)?;
        self.push_scope(scope);
        self.hook_start_deleted_resource()
    }

    fn start_nested_resource_info_impl(
        &mut self,
        link: NestedResourceInfo,
        mode: Mode,
    ) -> Result<(), Error> {
        // No hook fires on an open link; both families share one body.
        match mode {
            Mode::Sync => self.check_sync()?,
            Mode::Async => self.check_async()?,
        }
        let scope = self.prepare_nested_link(link)?;
        self.push_scope(scope);
        Ok(())
    }

    fn start_property_impl(&mut self, info: PropertyInfo) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        let scope = self.prepare_property(info)?;
        self.push_scope(scope);
        self.hook_start_property()
    }

    fn write_primitive_impl(&mut self, value: Value) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.promote_open_link()?;
        let scope = self.prepare_primitive()?;
        self.push_scope(scope);
        let r = self.hook_write_primitive(&value);
        self.pop_scope();
        r?;
        self.note_value_written();
        Ok(())
    }

    fn write_entity_reference_link_impl(
        &mut self,
        reference: EntityReferenceLink,
    ) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        self.check_entity_reference_position()?;
        self.promote_open_link()?;
        self.hook_write_reference(&reference)
    }

    fn check_entity_reference_position(&self) -> Result<(), Error> {
        match self.state() {
            State::NestedResourceInfo | State::NestedResourceInfoWithContent => {}
            State::Error => return Err(Error::InvalidTransitionFromError),
            State::Completed => return Err(Error::InvalidTransitionFromCompleted),
            _ => return Err(Error::EntityReferenceLinkWithoutNestedResourceInfo),
        }
        if !self.settings.is_request {
            return Err(Error::EntityReferenceLinkInResponse);
        }
        Ok(())
    }

    fn write_delta_link_impl(&mut self, link: DeltaLinkInfo, deleted: bool) -> Result<(), Error> {
        self.check_sync()?;
        self.ensure_payload_started()?;
        let target = if deleted {
            State::DeltaDeletedLink
        } else {
            State::DeltaLink
        };
        self.validate_transition(target)?;

        let parent = self.stack.current();
        let mut scope = Scope::new(target, ScopeKind::DeltaLink { link, deleted });
        apply_seed(&mut scope, Seed::inherited(parent));
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;

        self.push_scope(scope);
        let r = self.hook_write_delta_link();
        self.pop_scope();
        r
    }

    fn open_sub_writer_impl(&mut self, text: bool, mode: Mode) -> Result<(), Error> {
        match mode {
            Mode::Sync => self.check_sync()?,
            Mode::Async => self.check_async()?,
        }
        if let ScopeKind::Property {
            value_written: true,
            info,
        } = &self.stack.current().kind
        {
            return Err(Error::PropertyValueAlreadyWritten {
                name: info.name.clone(),
            });
        }
        let target = if text { State::String } else { State::Stream };
        self.validate_transition(target)?;

        let parent = self.stack.current();
        let mut scope = Scope::new(
            target,
            if text {
                ScopeKind::Text
            } else {
                ScopeKind::Stream
            },
        );
        apply_seed(&mut scope, Seed::inherited(parent));
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;

        self.note_value_written();
        self.push_scope(scope);

        if mode == Mode::Sync && !self.stack.current().skip_writing {
            if text {
                self.backend.start_text_writer()?;
            } else {
                self.backend.start_binary_stream()?;
            }
        }
        Ok(())
    }

    async fn open_sub_writer_impl_async(&mut self, text: bool) -> Result<(), Error> {
        self.open_sub_writer_impl(text, Mode::Async)?;
        if !self.stack.current().skip_writing {
            if text {
                self.backend.start_text_writer_async().await?;
            } else {
                self.backend.start_binary_stream_async().await?;
            }
        }
        Ok(())
    }

    fn end_impl(&mut self) -> Result<(), Error> {
        self.check_sync()?;
        self.check_end_allowed()?;
        self.check_deferred_link()?;
        self.hook_end_current()?;
        let popped = self.pop_scope();
        if let Some(frame) = popped.set_frame() {
            tracing::debug!(resources = frame.resource_count, "resource set ended");
        }
        if self.stack.len() == 1 {
            self.complete_payload()?;
        }
        Ok(())
    }

    fn check_end_allowed(&self) -> Result<(), Error> {
        match self.state() {
            State::Error => Err(Error::InvalidTransitionFromError),
            State::Completed => Err(Error::InvalidTransitionFromCompleted),
            State::Start => Err(Error::WriteEndInInvalidState {
                state: State::Start,
            }),
            State::Stream | State::String => Err(Error::StreamNotDisposed),
            _ => Ok(()),
        }
    }

    /// A link ending while still open is a deferred link: illegal in
    /// requests, and subject to duplicate detection like any property.
    fn check_deferred_link(&mut self) -> Result<(), Error> {
        let name = match &self.stack.current().kind {
            ScopeKind::NestedResourceInfo { link, .. }
                if self.stack.current().state == State::NestedResourceInfo =>
            {
                link.name.clone()
            }
            _ => return Ok(()),
        };
        if self.settings.is_request {
            return Err(Error::DeferredLinkInRequest { name });
        }
        // The owning resource sits directly beneath an open link.
        if let Some(frame) = self
            .stack
            .parent_mut()
            .and_then(|scope| scope.resource_frame_mut())
        {
            frame.duplicates.check(&name)?;
        }
        Ok(())
    }

    fn complete_payload(&mut self) -> Result<(), Error> {
        self.stack
            .replace_root(Scope::new(State::Completed, ScopeKind::Root));
        tracing::debug!("payload completed");
        self.backend.end_payload()?;
        self.backend.flush()?;
        if let Some(listener) = &mut self.listener {
            listener.on_completed();
        }
        Ok(())
    }

    async fn complete_payload_async(&mut self) -> Result<(), Error> {
        self.stack
            .replace_root(Scope::new(State::Completed, ScopeKind::Root));
        tracing::debug!("payload completed");
        self.backend.end_payload_async().await?;
        self.backend.flush_async().await?;
        if let Some(listener) = &mut self.listener {
            listener.on_completed();
        }
        Ok(())
    }

    fn flush_impl(&mut self) -> Result<(), Error> {
        self.check_sync()?;
        tracing::trace!("flush");
        self.backend.flush()
    }

    // ---- async impl bodies; validation is identical, hooks await ----

    async fn ensure_payload_started_async(&mut self) -> Result<(), Error> {
        if self.payload_started {
            return Ok(());
        }
        self.payload_started = true;
        tracing::trace!("start_payload");
        self.backend.start_payload_async().await
    }

    async fn promote_open_link_async(&mut self) -> Result<(), Error> {
        match self.state() {
            State::NestedResourceInfo => {
                self.promote_link_prepare()?;
                self.hook_start_nested_async().await
            }
            State::NestedResourceInfoWithContent => self.note_additional_link_content(),
            _ => Ok(()),
        }
    }

    async fn start_resource_set_impl_async(&mut self, set: ResourceSet) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        let scope = self.prepare_resource_set(set)?;
        self.push_scope(scope);
        self.hook_start_resource_set_async().await
    }

    async fn start_delta_resource_set_impl_async(
        &mut self,
        set: DeltaResourceSet,
    ) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        let scope = self.prepare_delta_resource_set(set)?;
        self.push_scope(scope);
        self.hook_start_delta_resource_set_async().await
    }

    async fn start_resource_impl_async(&mut self, mut resource: Resource) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        self.validate_transition(State::Resource)?;
        {
            let top = self.stack.len() == 1;
            let scope = self.stack.current();
            if !scope.skip_writing {
                let cx = scope_context(scope, top);
                self.backend
                    .prepare_resource_for_write_start_async(&mut resource, &cx)
                    .await?;
            }
        }
        let scope = self.prepare_resource(Some(resource))?;
        self.push_scope(scope);
        self.hook_start_resource_async().await
    }

    async fn start_null_resource_impl_async(&mut self) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        let scope = self.prepare_resource(None)?;
        self.push_scope(scope);
        self.hook_start_resource_async().await
    }

    async fn start_deleted_resource_impl_async(
        &mut self,
        mut deleted: DeletedResource,
    ) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        self.validate_transition(State::DeletedResource)?;
        {
            let top = self.stack.len() == 1;
            let scope = self.stack.current();
            if !scope.skip_writing {
                let cx = scope_context(scope, top);
                self.backend
                    .prepare_deleted_resource_for_write_start_async(&mut deleted, &cx)
                    .await?;
            }
        }
        let scope = self.prepare_deleted_resource(deleted)?;
        self.push_scope(scope);
        self.hook_start_deleted_resource_async().await
    }

    async fn start_property_impl_async(&mut self, info: PropertyInfo) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        let scope = self.prepare_property(info)?;
        self.push_scope(scope);
        self.hook_start_property_async().await
    }

    async fn write_primitive_impl_async(&mut self, value: Value) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.promote_open_link_async().await?;
        let scope = self.prepare_primitive()?;
        self.push_scope(scope);
        let r = self.hook_write_primitive_async(&value).await;
        self.pop_scope();
        r?;
        self.note_value_written();
        Ok(())
    }

    async fn write_entity_reference_link_impl_async(
        &mut self,
        reference: EntityReferenceLink,
    ) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        self.check_entity_reference_position()?;
        self.promote_open_link_async().await?;
        self.hook_write_reference_async(&reference).await
    }

    async fn write_delta_link_impl_async(
        &mut self,
        link: DeltaLinkInfo,
        deleted: bool,
    ) -> Result<(), Error> {
        self.check_async()?;
        self.ensure_payload_started_async().await?;
        let target = if deleted {
            State::DeltaDeletedLink
        } else {
            State::DeltaLink
        };
        self.validate_transition(target)?;

        let parent = self.stack.current();
        let mut scope = Scope::new(target, ScopeKind::DeltaLink { link, deleted });
        apply_seed(&mut scope, Seed::inherited(parent));
        scope.selected = parent.selected.clone();
        scope.skip_writing = parent.skip_writing;
        scope.enable_delta = parent.enable_delta;

        self.push_scope(scope);
        let r = self.hook_write_delta_link_async().await;
        self.pop_scope();
        r
    }

    async fn end_impl_async(&mut self) -> Result<(), Error> {
        self.check_async()?;
        self.check_end_allowed()?;
        self.check_deferred_link()?;
        self.hook_end_current_async().await?;
        let popped = self.pop_scope();
        if let Some(frame) = popped.set_frame() {
            tracing::debug!(resources = frame.resource_count, "resource set ended");
        }
        if self.stack.len() == 1 {
            self.complete_payload_async().await?;
        }
        Ok(())
    }

    async fn flush_impl_async(&mut self) -> Result<(), Error> {
        self.check_async()?;
        tracing::trace!("flush");
        self.backend.flush_async().await
    }

    // ---- hook dispatch; skipped sub-trees never reach the back-end ----

    fn hook_start_resource_set(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::ResourceSet { set, .. } => self.backend.start_resource_set(set, &cx),
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_resource_set_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::ResourceSet { set, .. } => {
                self.backend.start_resource_set_async(set, &cx).await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_start_delta_resource_set(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeltaResourceSet { set, .. } => {
                self.backend.start_delta_resource_set(set, &cx)
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_delta_resource_set_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeltaResourceSet { set, .. } => {
                self.backend.start_delta_resource_set_async(set, &cx).await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_start_resource(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::Resource { resource, .. } => {
                self.backend.start_resource(resource.as_ref(), &cx)
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_resource_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::Resource { resource, .. } => {
                self.backend.start_resource_async(resource.as_ref(), &cx).await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_start_deleted_resource(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeletedResource { deleted, .. } => {
                self.backend.start_deleted_resource(deleted, &cx)
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_deleted_resource_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeletedResource { deleted, .. } => {
                self.backend.start_deleted_resource_async(deleted, &cx).await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_start_property(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::Property { info, .. } => self.backend.start_property(info, &cx),
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_property_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::Property { info, .. } => self.backend.start_property_async(info, &cx).await,
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_start_nested(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::NestedResourceInfo { link, .. } => self
                .backend
                .start_nested_resource_info_with_content(link, &cx),
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_start_nested_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::NestedResourceInfo { link, .. } => {
                self.backend
                    .start_nested_resource_info_with_content_async(link, &cx)
                    .await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_write_primitive(&mut self, value: &Value) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        self.backend.write_primitive_value(value, &cx)
    }

    async fn hook_write_primitive_async(&mut self, value: &Value) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        self.backend.write_primitive_value_async(value, &cx).await
    }

    fn hook_write_reference(&mut self, reference: &EntityReferenceLink) -> Result<(), Error> {
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        match &scope.kind {
            ScopeKind::NestedResourceInfo { link, .. } => self
                .backend
                .write_entity_reference_in_navigation_link_content(link, reference),
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_write_reference_async(
        &mut self,
        reference: &EntityReferenceLink,
    ) -> Result<(), Error> {
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        match &scope.kind {
            ScopeKind::NestedResourceInfo { link, .. } => {
                self.backend
                    .write_entity_reference_in_navigation_link_content_async(link, reference)
                    .await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_write_delta_link(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeltaLink { link, deleted } => {
                self.backend.write_delta_link(link, *deleted, &cx)
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    async fn hook_write_delta_link_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        let cx = scope_context(scope, top);
        match &scope.kind {
            ScopeKind::DeltaLink { link, deleted } => {
                self.backend.write_delta_link_async(link, *deleted, &cx).await
            }
            _ => unreachable!("hook on a foreign scope"),
        }
    }

    fn hook_end_current(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        match &scope.kind {
            ScopeKind::ResourceSet { set, .. } => self.backend.end_resource_set(set),
            ScopeKind::DeltaResourceSet { set, .. } => self.backend.end_delta_resource_set(set),
            ScopeKind::Resource { resource, .. } => self.backend.end_resource(resource.as_ref()),
            ScopeKind::DeletedResource { deleted, .. } => {
                self.backend.end_deleted_resource(deleted)
            }
            ScopeKind::Property {
                info,
                value_written,
            } => self.backend.end_property(info, *value_written),
            ScopeKind::NestedResourceInfo { link, .. } => {
                if scope.state == State::NestedResourceInfoWithContent {
                    self.backend.end_nested_resource_info_with_content(link)
                } else {
                    let cx = scope_context(scope, top);
                    self.backend.write_deferred_nested_resource_info(link, &cx)
                }
            }
            _ => unreachable!("end hook on a foreign scope"),
        }
    }

    async fn hook_end_current_async(&mut self) -> Result<(), Error> {
        let top = self.stack.is_top_level();
        let scope = self.stack.current();
        if scope.skip_writing {
            return Ok(());
        }
        match &scope.kind {
            ScopeKind::ResourceSet { set, .. } => self.backend.end_resource_set_async(set).await,
            ScopeKind::DeltaResourceSet { set, .. } => {
                self.backend.end_delta_resource_set_async(set).await
            }
            ScopeKind::Resource { resource, .. } => {
                self.backend.end_resource_async(resource.as_ref()).await
            }
            ScopeKind::DeletedResource { deleted, .. } => {
                self.backend.end_deleted_resource_async(deleted).await
            }
            ScopeKind::Property {
                info,
                value_written,
            } => self.backend.end_property_async(info, *value_written).await,
            ScopeKind::NestedResourceInfo { link, .. } => {
                if scope.state == State::NestedResourceInfoWithContent {
                    self.backend
                        .end_nested_resource_info_with_content_async(link)
                        .await
                } else {
                    let cx = scope_context(scope, top);
                    self.backend
                        .write_deferred_nested_resource_info_async(link, &cx)
                        .await
                }
            }
            _ => unreachable!("end hook on a foreign scope"),
        }
    }

    // ---- sub-writer plumbing ----

    pub(crate) fn write_binary_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.stack.current().skip_writing {
            return Ok(());
        }
        let r = self.backend.binary_chunk(chunk);
        self.intercept(r)
    }

    pub(crate) async fn write_binary_chunk_async(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.stack.current().skip_writing {
            return Ok(());
        }
        let r = self.backend.binary_chunk_async(chunk).await;
        self.intercept(r)
    }

    pub(crate) fn write_text_chunk(&mut self, chunk: &str) -> Result<(), Error> {
        if self.stack.current().skip_writing {
            return Ok(());
        }
        let r = self.backend.text_chunk(chunk);
        self.intercept(r)
    }

    pub(crate) async fn write_text_chunk_async(&mut self, chunk: &str) -> Result<(), Error> {
        if self.stack.current().skip_writing {
            return Ok(());
        }
        let r = self.backend.text_chunk_async(chunk).await;
        self.intercept(r)
    }

    /// Sub-writer disposal: run the matching end hook and pop the scope,
    /// returning control to the main call surface.
    pub(crate) fn stream_disposed(&mut self) -> Result<(), Error> {
        let r = self.stream_disposed_impl();
        self.intercept(r)
    }

    fn stream_disposed_impl(&mut self) -> Result<(), Error> {
        let skip = self.stack.current().skip_writing;
        match &self.stack.current().kind {
            ScopeKind::Stream => {
                if !skip {
                    self.backend.end_binary_stream()?;
                }
            }
            ScopeKind::Text => {
                if !skip {
                    self.backend.end_text_writer()?;
                }
            }
            _ => unreachable!("disposal outside a sub-writer scope"),
        }
        self.pop_scope();
        Ok(())
    }

    pub(crate) async fn stream_disposed_async(&mut self) -> Result<(), Error> {
        let r = self.stream_disposed_impl_async().await;
        self.intercept(r)
    }

    async fn stream_disposed_impl_async(&mut self) -> Result<(), Error> {
        let skip = self.stack.current().skip_writing;
        match &self.stack.current().kind {
            ScopeKind::Stream => {
                if !skip {
                    self.backend.end_binary_stream_async().await?;
                }
            }
            ScopeKind::Text => {
                if !skip {
                    self.backend.end_text_writer_async().await?;
                }
            }
            _ => unreachable!("disposal outside a sub-writer scope"),
        }
        self.pop_scope();
        Ok(())
    }
}

fn mark_annotations(
    tracker: &mut AnnotationTracker,
    annotations: &[Annotation],
) -> Result<(), Error> {
    for annotation in annotations {
        if !tracker.mark(&annotation.name) {
            return Err(Error::DuplicateAnnotation {
                name: annotation.name.clone(),
            });
        }
    }
    Ok(())
}

fn apply_seed(scope: &mut Scope, seed: Seed) {
    scope.navigation_source = seed.navigation_source;
    scope.item_type = seed.item_type;
    scope.resource_type = seed.resource_type;
    scope.path = seed.path;
    scope.derived_type_constraints = seed.derived_type_constraints;
}

fn scope_context<'a>(scope: &'a Scope, is_top_level: bool) -> ScopeContext<'a> {
    let (type_from_metadata, type_context) = match &scope.kind {
        ScopeKind::Resource { frame, .. } | ScopeKind::DeletedResource { frame, .. } => (
            frame.type_from_metadata.as_deref(),
            Some(&frame.type_context),
        ),
        _ => (None, None),
    };
    ScopeContext {
        is_top_level,
        path: &scope.path,
        navigation_source: scope.navigation_source.as_ref(),
        resource_type: scope.resource_type.as_deref(),
        type_from_metadata,
        type_context,
    }
}
