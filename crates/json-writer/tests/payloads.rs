use json_writer::JsonBackend;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use url::Url;
use writer::{
    DeletedReason, DeletedResource, DeltaLinkInfo, DeltaResourceSet, EntityReferenceLink, Mode,
    NestedResourceInfo, PropertyInfo, Resource, ResourceSet, RootKind, Settings, State, Writer,
    WriterOptions,
};

fn model() -> edm::Model {
    use edm::{EntitySet, NavigationProperty, PrimitiveKind, Property, StructuredType, TypeRef};

    let mut model = edm::Model::new();
    model
        .add_type(
            StructuredType::entity("NS.Customer", &["id"])
                .with_property(Property::new("id", TypeRef::Primitive(PrimitiveKind::Int32)))
                .with_property(Property::new(
                    "Name",
                    TypeRef::Primitive(PrimitiveKind::String),
                ))
                .with_property(Property::new(
                    "Bio",
                    TypeRef::Primitive(PrimitiveKind::String),
                ))
                .with_property(Property::new(
                    "Photo",
                    TypeRef::Primitive(PrimitiveKind::Binary),
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
            StructuredType::entity("NS.Order", &["id"]).with_property(Property::new(
                "id",
                TypeRef::Primitive(PrimitiveKind::Int32),
            )),
        )
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

fn response_settings() -> Settings {
    Settings::default().service_root(Url::parse("http://host/svc/").unwrap())
}

fn writer_for<'m>(
    model: &'m edm::Model,
    settings: Settings,
    kind: RootKind,
) -> Writer<'m, JsonBackend<Vec<u8>>> {
    let backend = JsonBackend::new(Vec::new(), settings.clone());
    Writer::new(
        backend,
        model,
        settings,
        WriterOptions {
            kind,
            navigation_source: Some("Customers".to_string()),
            ..WriterOptions::default()
        },
    )
}

fn output(w: Writer<'_, JsonBackend<Vec<u8>>>) -> String {
    String::from_utf8(w.into_inner().into_inner()).unwrap()
}

// Each expected payload also re-parses: the emitter produces valid JSON.
fn assert_payload(actual: &str, expected: &str) {
    assert_eq!(actual, expected);
    let parsed: serde_json::Value = serde_json::from_str(actual).unwrap();
    assert_eq!(parsed, serde_json::from_str::<serde_json::Value>(expected).unwrap());
}

#[test]
fn test_resource_set_payload() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::ResourceSet);

    let mut set = ResourceSet::new();
    set.count = Some(2);
    set.next_page_link = Some(Url::parse("http://host/svc/Customers?$skiptoken=2").unwrap());

    w.start_resource_set(set).unwrap();
    w.start_resource(
        Resource::new()
            .with_property("id", json!(1))
            .with_property("Name", json!("A")),
    )
    .unwrap();
    w.end().unwrap();
    w.start_resource(
        Resource::new()
            .with_property("id", json!(2))
            .with_property("Name", json!("B")),
    )
    .unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_eq!(w.state(), State::Completed);
    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers","@odata.count":2,"#,
            r#""value":[{"id":1,"Name":"A"},{"id":2,"Name":"B"}],"#,
            r#""@odata.nextLink":"http://host/svc/Customers?$skiptoken=2"}"#,
        ),
    );
}

#[test]
fn test_single_resource_with_expanded_orders() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::Resource);

    w.start_resource(
        Resource::new()
            .with_property("id", json!(1))
            .with_property("Name", json!("A")),
    )
    .unwrap();
    w.start_nested_resource_info(NestedResourceInfo::collection("Orders"))
        .unwrap();
    w.start_resource_set(ResourceSet::new()).unwrap();
    w.start_resource(Resource::new().with_property("id", json!(10)))
        .unwrap();
    w.end().unwrap();
    w.end().unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$entity","#,
            r#""id":1,"Name":"A","Orders":[{"id":10}]}"#,
        ),
    );
}

#[test]
fn test_streamed_property_values() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::Resource);

    w.start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();

    w.start_property(PropertyInfo::named("Name")).unwrap();
    w.write_primitive(json!("A")).unwrap();
    w.end().unwrap();

    w.start_property(PropertyInfo::named("Bio")).unwrap();
    {
        let mut text = w.create_text_writer().unwrap();
        text.write_str("he").unwrap();
        text.write_str("llo \"world\"").unwrap();
        text.finish().unwrap();
    }
    w.end().unwrap();

    w.start_property(PropertyInfo::named("Photo")).unwrap();
    {
        let mut stream = w.create_binary_stream().unwrap();
        stream.write_all(&[1, 2, 3]).unwrap();
        stream.write_all(&[4]).unwrap();
        stream.finish().unwrap();
    }
    w.end().unwrap();

    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$entity","id":1,"#,
            r#""Name":"A","Bio":"hello \"world\"","Photo":"AQIDBA=="}"#,
        ),
    );
}

#[test]
fn test_property_without_value_is_null() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::Resource);

    w.start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();
    w.start_property(PropertyInfo::named("Name")).unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        r#"{"@odata.context":"http://host/svc/$metadata#Customers/$entity","id":1,"Name":null}"#,
    );
}

#[test]
fn test_deferred_navigation_link() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::Resource);

    w.start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();
    w.start_nested_resource_info(
        NestedResourceInfo::collection("Orders")
            .with_url(Url::parse("http://host/svc/Customers(1)/Orders").unwrap()),
    )
    .unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$entity","id":1,"#,
            r#""Orders@odata.navigationLink":"http://host/svc/Customers(1)/Orders"}"#,
        ),
    );
}

#[test]
fn test_delta_payload() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::ResourceSet);

    w.start_delta_resource_set(DeltaResourceSet::new()).unwrap();
    w.start_deleted_resource(
        DeletedResource::new()
            .with_id(Url::parse("http://host/svc/Customers(1)").unwrap())
            .with_reason(DeletedReason::Deleted),
    )
    .unwrap();
    w.end().unwrap();
    w.start_resource(
        Resource::new()
            .with_property("id", json!(2))
            .with_property("Name", json!("B")),
    )
    .unwrap();
    w.end().unwrap();
    w.write_delta_link(DeltaLinkInfo {
        source: Url::parse("http://host/svc/Customers(2)").unwrap(),
        relationship: "Orders".to_string(),
        target: Url::parse("http://host/svc/Orders(10)").unwrap(),
    })
    .unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$delta","value":["#,
            r#"{"@removed":{"reason":"deleted"},"@odata.id":"http://host/svc/Customers(1)"},"#,
            r#"{"id":2,"Name":"B"},"#,
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$link","#,
            r#""source":"http://host/svc/Customers(2)","relationship":"Orders","#,
            r#""target":"http://host/svc/Orders(10)"}]}"#,
        ),
    );
}

#[test]
fn test_untyped_collection_content() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::Resource);

    w.start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();
    w.start_nested_resource_info(NestedResourceInfo::collection("Stuff"))
        .unwrap();
    w.start_resource_set(ResourceSet::new()).unwrap();
    w.write_primitive(json!(1)).unwrap();
    w.write_primitive(json!("two")).unwrap();
    w.start_resource_set(ResourceSet::new()).unwrap();
    w.write_primitive(json!(true)).unwrap();
    w.end().unwrap();
    w.end().unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"@odata.context":"http://host/svc/$metadata#Customers/$entity","id":1,"#,
            r#""Stuff":[1,"two",[true]]}"#,
        ),
    );
}

#[test]
fn test_entity_reference_links_in_request() {
    let model = model();
    let mut w = writer_for(&model, Settings::default().request(), RootKind::Resource);

    w.start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();
    w.start_nested_resource_info(NestedResourceInfo::single("Manager"))
        .unwrap();
    w.write_entity_reference_link(EntityReferenceLink {
        url: Url::parse("http://host/svc/Customers(7)").unwrap(),
    })
    .unwrap();
    w.end().unwrap();
    w.start_nested_resource_info(NestedResourceInfo::collection("Orders"))
        .unwrap();
    w.write_entity_reference_link(EntityReferenceLink {
        url: Url::parse("http://host/svc/Orders(10)").unwrap(),
    })
    .unwrap();
    w.write_entity_reference_link(EntityReferenceLink {
        url: Url::parse("http://host/svc/Orders(11)").unwrap(),
    })
    .unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r#"{"id":1,"Manager":{"@odata.id":"http://host/svc/Customers(7)"},"#,
            r#""Orders":[{"@odata.id":"http://host/svc/Orders(10)"},"#,
            r#"{"@odata.id":"http://host/svc/Orders(11)"}]}"#,
        ),
    );
}

#[test]
fn test_cast_emits_type_annotation() {
    let model = model();
    let mut w = writer_for(&model, response_settings(), RootKind::ResourceSet);

    w.start_resource_set(ResourceSet::new()).unwrap();
    w.start_resource(Resource::of_type("NS.VipCustomer").with_property("id", json!(2)))
        .unwrap();
    w.end().unwrap();
    w.end().unwrap();

    assert_payload(
        &output(w),
        concat!(
            r##"{"@odata.context":"http://host/svc/$metadata#Customers","value":["##,
            r##"{"@odata.type":"#NS.VipCustomer","id":2}]}"##,
        ),
    );
}

#[tokio::test]
async fn test_async_family_writes_identical_bytes() {
    let model = model();

    let mut sync_writer = writer_for(&model, response_settings(), RootKind::Resource);
    sync_writer
        .start_resource(Resource::new().with_property("id", json!(1)))
        .unwrap();
    sync_writer
        .start_nested_resource_info(NestedResourceInfo::collection("Orders"))
        .unwrap();
    sync_writer.start_resource_set(ResourceSet::new()).unwrap();
    sync_writer
        .start_resource(Resource::new().with_property("id", json!(10)))
        .unwrap();
    sync_writer.end().unwrap();
    sync_writer.end().unwrap();
    sync_writer.end().unwrap();
    sync_writer.end().unwrap();
    let expected = output(sync_writer);

    let settings = response_settings();
    let backend = JsonBackend::new(Vec::new(), settings.clone());
    let mut w = Writer::new(
        backend,
        &model,
        settings,
        WriterOptions {
            mode: Mode::Async,
            kind: RootKind::Resource,
            navigation_source: Some("Customers".to_string()),
            ..WriterOptions::default()
        },
    );
    w.start_resource_async(Resource::new().with_property("id", json!(1)))
        .await
        .unwrap();
    w.start_nested_resource_info_async(NestedResourceInfo::collection("Orders"))
        .await
        .unwrap();
    w.start_resource_set_async(ResourceSet::new()).await.unwrap();
    w.start_resource_async(Resource::new().with_property("id", json!(10)))
        .await
        .unwrap();
    w.end_async().await.unwrap();
    w.end_async().await.unwrap();
    w.end_async().await.unwrap();
    w.end_async().await.unwrap();

    assert_eq!(output(w), expected);
}
