use super::*;
use crate::backend::cpu::{CpuBackend, CpuBackendOpts};
use crate::backend::session::{AbortSignal, CreationFlags, RenderBackend};
use crate::encode::writer::InMemoryWriter;
use crate::foundation::core::Rgba32F;
use crate::render::framebuffer::ReadOptions;

fn full_request(w: u32, h: u32) -> ReadRequest {
    ReadRequest {
        channel: ChannelId::Color,
        region: RenderRegion::from_size(w, h),
        frame_width: w,
        frame_height: h,
        options: ReadOptions::default(),
    }
}

fn session(w: u32, h: u32, channels: &[ChannelId]) -> Box<dyn BackendSession> {
    let mut s = CpuBackend::new(CpuBackendOpts::default())
        .create_session(&CreationFlags::default(), AbortSignal::new())
        .unwrap();
    s.resize(w, h).unwrap();
    for id in channels {
        s.enable_channel(*id, true).unwrap();
    }
    s.render_iterations(1).unwrap().finished().unwrap();
    s
}

#[test]
fn catalogue_ids_are_stable_and_named() {
    for (i, id) in ChannelId::ALL.iter().enumerate() {
        assert_eq!(id.index() as usize, i);
        assert_eq!(ChannelId::from_index(i as u32), Some(*id));
    }
    assert_eq!(ChannelId::from_index(ChannelId::COUNT as u32), None);
    assert_eq!(ChannelId::parse("aovDepth"), Some(ChannelId::Depth));
    assert_eq!(ChannelId::parse("world coordinate"), Some(ChannelId::WorldCoordinate));
    assert_eq!(ChannelId::parse("shadow"), Some(ChannelId::ShadowCatcher));
    assert_eq!(ChannelId::parse("nope"), None);
}

#[test]
fn depth_channel_carries_depth_post_process() {
    assert!(matches!(
        OutputChannel::new(ChannelId::Depth).post_process(),
        ChannelPostProcess::Depth(_)
    ));
    assert_eq!(
        OutputChannel::new(ChannelId::Color).post_process(),
        ChannelPostProcess::None
    );
}

#[test]
fn pixels_exist_only_while_active_with_area() {
    let mut ch = OutputChannel::new(ChannelId::Opacity);
    ch.set_region(RenderRegion::from_size(4, 4), 4, 4);
    ch.allocate_pixels();
    assert!(ch.pixels().is_none(), "inactive channels never allocate");

    ch.set_active(true);
    ch.set_region(RenderRegion::EMPTY, 4, 4);
    ch.allocate_pixels();
    assert!(!ch.is_allocated(), "zero-area regions never allocate");

    ch.set_region(RenderRegion::from_origin(0, 0, 2, 3).unwrap(), 4, 4);
    ch.allocate_pixels();
    assert_eq!(ch.pixels().map(PixelBuffer::len), Some(6));

    ch.free_pixels();
    assert!(ch.pixels().is_none());
    ch.free_pixels();

    ch.allocate_pixels();
    ch.set_active(false);
    assert!(ch.pixels().is_none());
}

#[test]
fn store_pixels_checks_size() {
    let mut ch = OutputChannel::new(ChannelId::Color);
    let src = PixelBuffer::with_size(2, 2);
    assert!(matches!(
        ch.store_pixels(&src),
        Err(RenderError::InvalidUsage(_))
    ));
    ch.set_active(true);
    ch.set_region(RenderRegion::from_size(2, 2), 2, 2);
    ch.allocate_pixels();
    let mut white = PixelBuffer::with_size(2, 2);
    white.fill(Rgba32F::WHITE);
    ch.store_pixels(&white).unwrap();
    assert_eq!(ch.pixels(), Some(&white));
    assert!(ch.store_pixels(&PixelBuffer::with_size(3, 1)).is_err());
}

#[test]
fn read_skips_channels_the_backend_cannot_produce() {
    let mut s = CpuBackend::new(CpuBackendOpts {
        unsupported_channels: vec![ChannelId::Uv],
        ..CpuBackendOpts::default()
    })
    .create_session(&CreationFlags::default(), AbortSignal::new())
    .unwrap();
    s.resize(4, 4).unwrap();
    let mut ch = OutputChannel::new(ChannelId::Uv);
    ch.set_active(true);
    ch.set_region(RenderRegion::from_size(4, 4), 4, 4);
    ch.allocate_pixels();
    let mut pipeline = FrameBufferPipeline::new();
    let read = ch
        .read_frame_buffer(
            &mut pipeline,
            s.as_mut(),
            &full_request(4, 4),
            &StampInfo::default(),
        )
        .unwrap();
    assert!(!read);
}

#[test]
fn depth_read_is_normalized() {
    let mut s = session(8, 8, &[ChannelId::Depth]);
    let mut ch = OutputChannel::new(ChannelId::Depth);
    ch.set_active(true);
    ch.set_region(RenderRegion::from_size(8, 8), 8, 8);
    ch.set_post_process(ChannelPostProcess::Depth(DepthNormalization {
        auto_normalize: false,
        invert: false,
        min: 0.0,
        max: 20.0,
    }));
    ch.allocate_pixels();
    let mut pipeline = FrameBufferPipeline::new();
    assert!(
        ch.read_frame_buffer(
            &mut pipeline,
            s.as_mut(),
            &full_request(8, 8),
            &StampInfo::default()
        )
        .unwrap()
    );
    // Empty scene: every pixel is background, which carries no depth.
    assert!(ch.pixels().unwrap().as_slice().iter().all(|p| p.r == 0.0));
}

#[test]
fn stamp_is_drawn_only_on_full_frame_reads() {
    let mut s = session(64, 32, &[ChannelId::Color]);
    let mut pipeline = FrameBufferPipeline::new();
    let info = StampInfo {
        iterations: 7,
        ..StampInfo::default()
    };

    let mut plain = OutputChannel::new(ChannelId::Color);
    plain.set_active(true);
    plain.set_region(RenderRegion::from_size(64, 32), 64, 32);
    plain.allocate_pixels();
    plain
        .read_frame_buffer(&mut pipeline, s.as_mut(), &full_request(64, 32), &info)
        .unwrap();

    let mut stamped = plain.clone();
    stamped.set_render_stamp(Some("%i".to_string()));
    stamped.allocate_pixels();
    stamped
        .read_frame_buffer(&mut pipeline, s.as_mut(), &full_request(64, 32), &info)
        .unwrap();
    assert_ne!(plain.pixels(), stamped.pixels());

    let mut partial = stamped.clone();
    partial.set_region(RenderRegion::from_origin(0, 0, 16, 16).unwrap(), 64, 32);
    partial.allocate_pixels();
    partial
        .read_frame_buffer(&mut pipeline, s.as_mut(), &full_request(64, 32), &info)
        .unwrap();
    let mut reference = plain.clone();
    reference.set_region(RenderRegion::from_origin(0, 0, 16, 16).unwrap(), 64, 32);
    reference.allocate_pixels();
    reference
        .read_frame_buffer(&mut pipeline, s.as_mut(), &full_request(64, 32), &info)
        .unwrap();
    assert_eq!(partial.pixels(), reference.pixels());
}

#[test]
fn output_path_nests_under_the_channel_folder() {
    let ch = OutputChannel::new(ChannelId::ShadingNormal);
    assert_eq!(
        ch.output_path(Path::new("renders/frame.exr")),
        Path::new("renders/shading_normal/frame.exr")
    );
}

#[test]
fn write_to_file_uses_the_flat_path_for_colour_only() {
    let dir = std::env::temp_dir().join(format!("render-orchestrator-channel-{}", std::process::id()));
    let mut ch = OutputChannel::new(ChannelId::Depth);
    let mut writer = InMemoryWriter::new();
    let path = dir.join("frame.exr");
    assert_eq!(
        ch.write_to_file(&mut writer, &path, false, ImageFormat::Exr)
            .unwrap(),
        None
    );

    ch.set_active(true);
    ch.set_region(RenderRegion::from_size(2, 2), 2, 2);
    ch.allocate_pixels();
    let flat = ch
        .write_to_file(&mut writer, &path, true, ImageFormat::Exr)
        .unwrap();
    assert_eq!(flat, Some(path.clone()));

    let nested = ch
        .write_to_file(&mut writer, &path, false, ImageFormat::Exr)
        .unwrap()
        .unwrap();
    assert_eq!(nested, dir.join("depth").join("frame.exr"));
    assert!(dir.join("depth").is_dir());
    assert_eq!(writer.files().len(), 2);
    std::fs::remove_dir_all(&dir).ok();
}
