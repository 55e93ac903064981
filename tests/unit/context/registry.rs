use super::*;
use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
use crate::backend::session::CreationFlags;
use crate::render::state::RenderState;
use crate::scene::graph::{AttributeValue, ObjectSnapshot};
use crate::scene::memory::MemoryScene;

fn parts() -> (Arc<dyn RenderBackend>, Arc<MemoryScene>) {
    let scene = Arc::new(MemoryScene::new());
    scene.add_node(
        "ball",
        ObjectSnapshot::from([("radius".to_string(), AttributeValue::Float(2.0))]),
    );
    (Arc::new(CpuBackend::new(CpuBackendOpts::default())), scene)
}

fn live(registry: &ContextRegistry, key: &str) -> Arc<RenderContext> {
    let (backend, scene) = parts();
    let ctx = registry
        .create(key, backend, scene.clone(), RenderType::Viewport)
        .unwrap();
    scene.attach(ctx.listener());
    ctx.initialize(&CreationFlags::default()).unwrap();
    ctx.resize(4, 4).unwrap();
    ctx.freshen(&|| false).unwrap().finished().unwrap();
    ctx
}

#[test]
fn create_registers_under_the_key() {
    let registry = ContextRegistry::new();
    assert!(registry.is_empty());
    let ctx = live(&registry, "persp");
    live(&registry, "front");
    assert_eq!(registry.keys(), vec!["front".to_string(), "persp".to_string()]);
    assert_eq!(registry.len(), 2);
    assert!(Arc::ptr_eq(&registry.get("persp").unwrap(), &ctx));
    assert_eq!(ctx.render_type(), RenderType::Viewport);
}

#[test]
fn duplicate_key_is_rejected() {
    let registry = ContextRegistry::new();
    live(&registry, "persp");
    let (backend, scene) = parts();
    assert!(matches!(
        registry.create("persp", backend, scene, RenderType::Viewport),
        Err(RenderError::InvalidUsage(_))
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn remove_tears_down_in_the_background() {
    let registry = ContextRegistry::new();
    let ctx = live(&registry, "persp");
    assert!(registry.remove("persp").unwrap());
    assert!(!registry.remove("persp").unwrap());
    assert!(registry.get("persp").is_none());

    let stats = registry.wait_for("persp").unwrap().unwrap();
    assert_eq!(stats.objects_released, 1);
    assert_eq!(ctx.state(), RenderState::Exiting);
    assert!(registry.wait_for("persp").unwrap().is_none());
}

#[test]
fn key_can_be_reused_after_removal() {
    let registry = ContextRegistry::new();
    let old = live(&registry, "persp");
    registry.remove("persp").unwrap();
    let new = live(&registry, "persp");
    assert_eq!(old.state(), RenderState::Exiting);
    assert_ne!(new.state(), RenderState::Exiting);
    assert_eq!(new.object_keys(), vec!["ball".to_string()]);
}

#[test]
fn clear_waits_for_every_teardown() {
    let registry = ContextRegistry::new();
    live(&registry, "a");
    live(&registry, "b");
    live(&registry, "c");
    registry.remove("c").unwrap();

    let stats = registry.clear().unwrap();
    assert_eq!(stats.len(), 3);
    assert!(stats.iter().all(|s| s.objects_released == 1));
    assert!(registry.is_empty());
    assert!(registry.wait_for("c").unwrap().is_none());
}
