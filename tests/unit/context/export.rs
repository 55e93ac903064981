use super::*;
use std::sync::Arc;

use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
use crate::backend::session::CreationFlags;
use crate::context::render_context::RenderType;
use crate::scene::graph::AttributeValue;
use crate::scene::memory::MemoryScene;

fn synced() -> RenderContext {
    let scene = Arc::new(MemoryScene::new());
    scene.add_node(
        "sun",
        ObjectSnapshot::from([("radius".to_string(), AttributeValue::Float(4.0))]),
    );
    scene.add_node(
        "moon",
        ObjectSnapshot::from([
            ("radius".to_string(), AttributeValue::Float(1.5)),
            ("color".to_string(), AttributeValue::Color([0.5, 0.5, 0.5])),
        ]),
    );
    let ctx = RenderContext::new(
        Arc::new(CpuBackend::new(CpuBackendOpts::default())),
        scene.clone(),
        RenderType::Production,
    );
    scene.attach(ctx.listener());
    ctx.initialize(&CreationFlags::default()).unwrap();
    ctx.resize(16, 8).unwrap();
    ctx.freshen(&|| false).unwrap().finished().unwrap();
    ctx
}

#[test]
fn exporter_follows_the_extension() {
    assert_eq!(SceneExporter::for_path(Path::new("a/scene.json")), SceneExporter::Json);
    assert_eq!(SceneExporter::for_path(Path::new("scene.JSON")), SceneExporter::Json);
    assert_eq!(SceneExporter::for_path(Path::new("scene.txt")), SceneExporter::Manifest);
    assert_eq!(SceneExporter::for_path(Path::new("scene")), SceneExporter::Manifest);
}

#[test]
fn snapshot_lists_objects_by_key() {
    let export = synced().scene_export();
    assert_eq!(export.renderer, "cpu");
    assert_eq!((export.width, export.height), (16, 8));
    assert_eq!(export.camera, Some(CameraFraming::default()));
    let keys: Vec<&str> = export.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["moon", "sun"]);
    assert_eq!(
        export.objects[1].attributes.get("radius"),
        Some(&AttributeValue::Float(4.0))
    );
}

#[test]
fn uninitialized_context_exports_an_empty_scene() {
    let scene = Arc::new(MemoryScene::new());
    let ctx = RenderContext::new(
        Arc::new(CpuBackend::new(CpuBackendOpts::default())),
        scene,
        RenderType::Thumbnail,
    );
    let export = ctx.scene_export();
    assert!(export.renderer.is_empty());
    assert!(export.camera.is_none());
    assert!(export.objects.is_empty());
}

#[test]
fn json_export_parses_back() {
    let export = synced().scene_export();
    let text = SceneExporter::Json.to_text(&export).unwrap();
    let back: SceneExport = serde_json::from_str(&text).unwrap();
    assert_eq!(back, export);
}

#[test]
fn manifest_has_one_block_per_object() {
    let text = SceneExporter::Manifest
        .to_text(&synced().scene_export())
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "renderer cpu");
    assert_eq!(lines[1], "size 16x8");
    assert_eq!(lines[2], "camera perspective 36x24 shift 0,0");
    assert_eq!(lines[3], "object moon 2");
    assert!(lines[4].starts_with("  color = "));
    assert!(lines[5].starts_with("  radius = "));
    assert_eq!(lines[6], "object sun 1");
    assert_eq!(lines.len(), 8);
}

#[test]
fn export_scene_creates_the_directory() {
    let dir = std::env::temp_dir().join(format!("render-orchestrator-export-{}", std::process::id()));
    let path = dir.join("nested").join("scene.json");
    let ctx = synced();
    ctx.export_scene(SceneExporter::for_path(&path), &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let back: SceneExport = serde_json::from_str(&text).unwrap();
    assert_eq!(back.objects.len(), 2);
    let _ = std::fs::remove_dir_all(&dir);
}
