use super::*;
use crate::foundation::core::Rgba32F;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "render-orchestrator-writer-{}-{name}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn gradient(w: u32, h: u32) -> PixelBuffer {
    let pixels = (0..w * h)
        .map(|i| Rgba32F::new(i as f32 / (w * h) as f32, 0.5, 0.25, 1.0))
        .collect();
    PixelBuffer::from_pixels(w, h, pixels).unwrap()
}

#[test]
fn extensions_parse_case_insensitively() {
    assert_eq!(ImageFormat::from_extension("EXR"), Some(ImageFormat::Exr));
    assert_eq!(ImageFormat::from_extension(".jpeg"), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::from_extension("tif"), Some(ImageFormat::Tiff));
    assert_eq!(ImageFormat::from_extension("gif"), None);
    assert_eq!(
        ImageFormat::from_path(Path::new("out/frame.hdr")),
        Some(ImageFormat::Hdr)
    );
    assert_eq!(
        ImageFileDescription::for_path(Path::new("noext")).format,
        ImageFormat::Exr
    );
}

#[test]
fn png_round_trips_through_the_decoder() {
    let dir = scratch_dir("png");
    let path = dir.join("frame.png");
    let src = gradient(4, 3);
    ImageFileWriter::new()
        .write(&path, &src, ImageFormat::Png)
        .unwrap();
    let back = crate::encode::decode::load_image(&path).unwrap();
    assert_eq!((back.width(), back.height()), (4, 3));
    let px = back.get(1, 0).unwrap();
    assert!((px.g - 0.5).abs() < 0.01);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn float_formats_are_written() {
    let dir = scratch_dir("float");
    let src = gradient(8, 8);
    let mut w = ImageFileWriter::new();
    for format in [ImageFormat::Exr, ImageFormat::Hdr, ImageFormat::Jpeg] {
        let path = dir.join(format!("frame.{}", format.extension()));
        w.write(&path, &src, format).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn empty_buffer_is_invalid_usage() {
    let err = ImageFileWriter::new()
        .write(Path::new("x.png"), &PixelBuffer::new(), ImageFormat::Png)
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidUsage(_)));
}

#[test]
fn file_writer_has_no_layers() {
    let src = gradient(2, 2);
    let err = ImageFileWriter::new()
        .write_layers(
            Path::new("x.exr"),
            &[ImageLayer {
                name: "Color",
                pixels: &src,
            }],
            ImageFormat::Exr,
        )
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn in_memory_writer_records_calls() {
    let src = gradient(2, 2);
    let mut plain = InMemoryWriter::new();
    plain
        .write(Path::new("a.png"), &src, ImageFormat::Png)
        .unwrap();
    assert_eq!(plain.files().len(), 1);
    assert!(
        plain
            .write_layers(Path::new("a.exr"), &[], ImageFormat::Exr)
            .unwrap_err()
            .is_unsupported()
    );

    let mut layered = InMemoryWriter::with_layers();
    layered
        .write_layers(
            Path::new("a.exr"),
            &[ImageLayer {
                name: "Color",
                pixels: &src,
            }],
            ImageFormat::Exr,
        )
        .unwrap();
    assert_eq!(layered.layer_files()[0].1[0].0, "Color");
    assert!(
        layered
            .write_layers(Path::new("a.png"), &[], ImageFormat::Png)
            .is_err()
    );
}
