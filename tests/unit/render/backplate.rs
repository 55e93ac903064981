use super::*;
use crate::render::tiles::{TileRenderInfo, tile_grid};

fn checker(w: u32, h: u32) -> PixelBuffer {
    let pixels = (0..h)
        .flat_map(|y| (0..w).map(move |x| Rgba32F::new(x as f32, y as f32, 0.0, 1.0)))
        .collect();
    PixelBuffer::from_pixels(w, h, pixels).unwrap()
}

#[test]
fn stretch_maps_image_quadrants_onto_frame_quadrants() {
    let img = checker(2, 2);
    let out = slice_backplate(&img, BackplateFit::Stretch, 4, 4, &RenderRegion::from_size(4, 4));
    assert_eq!((out.width(), out.height()), (4, 4));
    assert_eq!(out.get(0, 0), img.get(0, 0));
    assert_eq!(out.get(1, 1), img.get(0, 0));
    assert_eq!(out.get(2, 0), img.get(1, 0));
    assert_eq!(out.get(3, 3), img.get(1, 1));
}

#[test]
fn horizontal_fit_letterboxes_with_transparency() {
    let img = checker(4, 2);
    for fit in [BackplateFit::Horizontal, BackplateFit::Best] {
        let out = slice_backplate(&img, fit, 4, 4, &RenderRegion::from_size(4, 4));
        assert_eq!(out.get(0, 0), Some(Rgba32F::TRANSPARENT), "{fit:?}");
        assert_eq!(out.get(2, 1), img.get(2, 0), "{fit:?}");
        assert_eq!(out.get(3, 2), img.get(3, 1), "{fit:?}");
        assert_eq!(out.get(1, 3), Some(Rgba32F::TRANSPARENT), "{fit:?}");
    }
}

#[test]
fn fill_crops_the_long_axis() {
    let img = checker(8, 2);
    let out = slice_backplate(&img, BackplateFit::Fill, 2, 2, &RenderRegion::from_size(2, 2));
    assert_eq!(out.get(0, 0), img.get(3, 0));
    assert_eq!(out.get(1, 1), img.get(4, 1));
}

#[test]
fn tiled_slices_agree_with_the_full_frame() {
    let img = checker(3, 5);
    let info = TileRenderInfo {
        total_width: 8,
        total_height: 6,
        tile_width: 4,
        tile_height: 4,
    };
    for fit in [
        BackplateFit::Best,
        BackplateFit::Fill,
        BackplateFit::Stretch,
        BackplateFit::Horizontal,
        BackplateFit::Vertical,
    ] {
        let full = slice_backplate(&img, fit, 8, 6, &RenderRegion::from_size(8, 6));
        for region in tile_grid(&info) {
            let window = info.tile_window(&region);
            let tile = slice_backplate(&img, fit, 8, 6, &window);
            assert_eq!((tile.width(), tile.height()), (4, 4));
            for y_up in region.bottom..=region.top {
                for x in region.left..=region.right {
                    let t = tile.get((x - window.left) as u32, (window.top - y_up) as u32);
                    let f = full.get(x as u32, (5 - y_up) as u32);
                    assert_eq!(t, f, "{fit:?} at ({x}, {y_up})");
                }
            }
        }
    }
}

#[test]
fn window_rows_past_the_frame_are_transparent() {
    let img = checker(2, 2);
    let window = RenderRegion::new(0, 3, 4, 7).unwrap();
    let out = slice_backplate(&img, BackplateFit::Stretch, 4, 6, &window);
    assert_eq!(out.get(0, 0), Some(Rgba32F::TRANSPARENT));
    assert_eq!(out.get(0, 1), Some(Rgba32F::TRANSPARENT));
    assert_ne!(out.get(0, 2), Some(Rgba32F::TRANSPARENT));
}

#[test]
fn empty_image_gives_a_transparent_window() {
    let out = slice_backplate(
        &PixelBuffer::new(),
        BackplateFit::Best,
        4,
        4,
        &RenderRegion::from_size(2, 2),
    );
    assert_eq!(out.len(), 4);
    assert!(out.as_slice().iter().all(|p| *p == Rgba32F::TRANSPARENT));
}
