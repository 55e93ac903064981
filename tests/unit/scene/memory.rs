use super::*;
use crate::scene::listener::SceneShared;
use std::sync::Arc;

#[test]
fn document_parses_tagged_attributes() {
    let doc = SceneDocument::from_json_str(
        r#"{"objects":[{"name":"ball","attributes":{
            "radius":{"type":"float","value":2.5},
            "color":{"type":"color","value":[1.0,0.0,0.0]}}}]}"#,
    )
    .unwrap();
    assert_eq!(doc.objects.len(), 1);
    let attrs = &doc.objects[0].attributes;
    assert_eq!(attrs["radius"].as_f64(), Some(2.5));
    assert_eq!(attrs["color"].as_color(), Some([1.0, 0.0, 0.0]));
}

#[test]
fn malformed_document_is_a_serde_error() {
    assert!(matches!(
        SceneDocument::from_json_str("{\"objects\": 3}"),
        Err(RenderError::Serde(_))
    ));
}

#[test]
fn graph_reads_follow_edits() {
    let scene = MemoryScene::new();
    let n = scene.add_node("a", ObjectSnapshot::new());
    assert!(scene.set_attribute(n, "depth", AttributeValue::Float(3.0)));
    let (identity, snap) = scene.snapshot(n).unwrap();
    assert_eq!(identity, "a");
    assert_eq!(snap["depth"], AttributeValue::Float(3.0));
    assert_eq!(scene.attribute_names(n), vec!["depth".to_string()]);

    scene.set_renderable(n, false);
    assert!(!scene.affects_render(n));

    assert!(scene.remove_node(n));
    assert!(scene.identity(n).is_none());
    assert!(!scene.set_attribute(n, "depth", AttributeValue::Float(1.0)));
}

#[test]
fn attached_listener_receives_edits() {
    let shared = Arc::new(SceneShared::default());
    let scene = MemoryScene::new();
    scene.attach(SceneListener::new(shared.clone()));

    let a = scene.add_node("a", ObjectSnapshot::new());
    let b = scene.add_node("b", ObjectSnapshot::new());
    scene.remove_node(b);

    let batch = shared.tracker.drain();
    assert_eq!(batch.added, vec![a]);
    assert_eq!(batch.removed, vec![b]);
    assert!(shared.dirty.load(Ordering::Acquire));
}
