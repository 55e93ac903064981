use super::*;
use crate::aov::depth::DepthNormalization;
use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
use crate::backend::session::{AbortSignal, CreationFlags, RenderBackend};
use crate::encode::writer::InMemoryWriter;

fn session(opts: CpuBackendOpts, w: u32, h: u32) -> Box<dyn BackendSession> {
    let mut s = CpuBackend::new(opts)
        .create_session(&CreationFlags::default(), AbortSignal::new())
        .unwrap();
    s.resize(w, h).unwrap();
    s
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "render-orchestrator-channel-set-{tag}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn ready_set(settings: &RenderSettings, w: u32, h: u32) -> OutputChannelSet {
    let mut set = OutputChannelSet::new();
    set.read_from_settings(settings);
    set.set_region(RenderRegion::from_size(w, h), w, h);
    set.allocate_pixels();
    set
}

#[test]
fn new_set_has_only_colour_active() {
    let set = OutputChannelSet::new();
    assert_eq!(set.iter().count(), ChannelId::COUNT);
    assert_eq!(set.active_ids(), vec![ChannelId::Color]);
    assert_eq!(set.render_view(), ChannelId::Color);
}

#[test]
fn settings_drive_activation_depth_and_stamp() {
    let mut settings = RenderSettings {
        render_view: ChannelId::Uv,
        render_stamp: Some("%r".to_string()),
        depth: DepthNormalization {
            auto_normalize: true,
            ..DepthNormalization::default()
        },
        ..RenderSettings::default()
    };
    settings.channels.insert(ChannelId::Depth);
    let mut set = ready_set(&settings, 4, 4);
    assert_eq!(
        set.active_ids(),
        vec![ChannelId::Color, ChannelId::Uv, ChannelId::Depth]
    );
    assert_eq!(
        set.get(ChannelId::Depth).post_process(),
        ChannelPostProcess::Depth(settings.depth)
    );
    assert!(set.get(ChannelId::Depth).is_allocated());

    settings.channels.clear();
    set.read_from_settings(&settings);
    assert!(!set.get(ChannelId::Depth).is_active());
    assert!(set.get(ChannelId::Depth).pixels().is_none());
    assert!(set.get(ChannelId::Color).is_active());
}

#[test]
fn apply_to_context_skips_unsupported_channels() {
    let mut s = session(
        CpuBackendOpts {
            unsupported_channels: vec![ChannelId::Uv],
            ..CpuBackendOpts::default()
        },
        4,
        4,
    );
    let mut settings = RenderSettings::default();
    settings.channels.extend([ChannelId::Uv, ChannelId::Opacity]);
    let set = ready_set(&settings, 4, 4);
    let enabled = set.apply_to_context(s.as_mut()).unwrap();
    assert_eq!(enabled, vec![ChannelId::Color, ChannelId::Opacity]);
    assert!(!s.is_channel_enabled(ChannelId::Uv));
}

#[test]
fn set_from_context_mirrors_backend_outputs() {
    let mut s = session(CpuBackendOpts::default(), 4, 4);
    s.enable_channel(ChannelId::ObjectId, true).unwrap();
    let mut set = OutputChannelSet::new();
    set.set_from_context(s.as_ref());
    assert_eq!(set.active_ids(), vec![ChannelId::Color, ChannelId::ObjectId]);
}

#[test]
fn read_frame_buffers_fills_every_active_channel() {
    let mut s = session(CpuBackendOpts::default(), 8, 8);
    let mut settings = RenderSettings::default();
    settings.channels.extend([ChannelId::Opacity, ChannelId::Background]);
    let mut set = ready_set(&settings, 8, 8);
    set.apply_to_context(s.as_mut()).unwrap();
    s.render_iterations(2).unwrap().finished().unwrap();

    let mut pipeline = FrameBufferPipeline::new();
    let options = ReadOptions {
        merge_opacity: true,
        ..ReadOptions::default()
    };
    let n = set
        .read_frame_buffers(&mut pipeline, s.as_mut(), &options, &StampInfo::default())
        .unwrap();
    assert_eq!(n, 3);
    let bg = set.get(ChannelId::Background).pixels().unwrap();
    assert!(bg.as_slice().iter().all(|p| p.a == 1.0));
    // Empty scene: opacity is zero everywhere and colour takes that alpha.
    let color = set.get(ChannelId::Color).pixels().unwrap();
    assert!(color.as_slice().iter().all(|p| p.a == 0.0));
}

#[test]
fn colour_only_writes_one_flat_file() {
    let set = ready_set(&RenderSettings::default(), 2, 2);
    let mut writer = InMemoryWriter::new();
    let written = set
        .write_to_file(&mut writer, Path::new("out/frame.png"), ImageFormat::Png)
        .unwrap();
    assert_eq!(written, vec![PathBuf::from("out/frame.png")]);
    assert_eq!(writer.files().len(), 1);
}

#[test]
fn layered_formats_write_one_file_with_every_channel() {
    let mut settings = RenderSettings::default();
    settings.channels.insert(ChannelId::Opacity);
    let set = ready_set(&settings, 2, 2);
    let mut writer = InMemoryWriter::with_layers();
    let written = set
        .write_to_file(&mut writer, Path::new("frame.exr"), ImageFormat::Exr)
        .unwrap();
    assert_eq!(written, vec![PathBuf::from("frame.exr")]);
    let names: Vec<&str> = writer.layer_files()[0]
        .1
        .iter()
        .map(|(n, _)| n.as_str())
        .collect();
    assert_eq!(names, vec!["Color", "Opacity"]);
    assert!(writer.files().is_empty());
}

#[test]
fn layered_formats_fall_back_to_per_channel_files() {
    let dir = temp_dir("fallback");
    let mut settings = RenderSettings::default();
    settings.channels.insert(ChannelId::Depth);
    let set = ready_set(&settings, 2, 2);
    let mut writer = InMemoryWriter::new();
    let path = dir.join("frame.exr");
    let written = set
        .write_to_file(&mut writer, &path, ImageFormat::Exr)
        .unwrap();
    assert_eq!(
        written,
        vec![
            dir.join("color").join("frame.exr"),
            dir.join("depth").join("frame.exr"),
        ]
    );
    assert!(dir.join("depth").is_dir());
    let _ = std::fs::remove_dir_all(&dir);
}
