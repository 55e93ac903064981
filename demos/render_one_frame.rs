use std::sync::Arc;

use render_orchestrator::{
    AttributeValue, ChannelId, CompletionCriteriaParams, CpuBackend, CpuBackendOpts,
    CreationFlags, ImageFileDescription, ImageFileWriter, MemoryScene, ObjectSnapshot,
    RenderContext, RenderSettings, RenderType,
};

fn disc(x: f64, y: f64, radius: f64, color: [f32; 3]) -> ObjectSnapshot {
    ObjectSnapshot::from([
        ("position".to_string(), AttributeValue::Vec2([x, y])),
        ("radius".to_string(), AttributeValue::Float(radius)),
        ("color".to_string(), AttributeValue::Color(color)),
    ])
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let scene = Arc::new(MemoryScene::new());
    scene.add_node("sun", disc(-4.0, 3.0, 7.0, [1.0, 0.8, 0.2]));
    scene.add_node("moon", disc(9.0, -5.0, 3.5, [0.6, 0.6, 0.7]));

    let ctx = RenderContext::new(
        Arc::new(CpuBackend::new(CpuBackendOpts::default())),
        scene.clone(),
        RenderType::Production,
    );
    scene.attach(ctx.listener());

    let mut settings = RenderSettings {
        completion: CompletionCriteriaParams::iterations(8),
        ..RenderSettings::default()
    };
    settings.channels.insert(ChannelId::Depth);
    ctx.set_settings(settings)?;
    ctx.initialize(&CreationFlags::default())?;
    ctx.resize(512, 384)?;
    if ctx.freshen(&|| false)?.is_aborted() {
        anyhow::bail!("scene sync was aborted");
    }
    let pass = ctx
        .render_until_complete(&|| false)?
        .finished()
        .ok_or_else(|| anyhow::anyhow!("render was aborted"))?;
    eprintln!("rendered {} iterations", pass.total_iterations);
    ctx.read_frame_buffers(false)?;

    let out_path = std::path::Path::new("target").join("render_one_frame.png");
    let description = ImageFileDescription::for_path(&out_path);
    let written = ctx.save_to_file(&mut ImageFileWriter, &out_path, &description)?;
    ctx.teardown();

    for path in written {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
