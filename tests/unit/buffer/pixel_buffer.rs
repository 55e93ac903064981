use super::*;

fn px(v: f32) -> Rgba32F {
    Rgba32F::new(v, v, v, 1.0)
}

#[test]
fn repeated_resize_allocates_once() {
    let mut b = PixelBuffer::new();
    assert!(!b.is_allocated());
    b.resize(16);
    b.resize(16);
    assert_eq!(b.allocations(), 1);
    assert_eq!(b.len(), 16);
    b.resize(32);
    assert_eq!(b.allocations(), 2);
    assert_eq!(b.len(), 32);
    assert_eq!(b.len(), (b.width() * b.height()) as usize);
}

#[test]
fn same_count_resize_keeps_contents() {
    let mut b = PixelBuffer::with_size(4, 4);
    b.fill(px(0.25));
    b.resize_2d(8, 2);
    assert_eq!(b.allocations(), 1);
    assert_eq!((b.width(), b.height()), (8, 2));
    assert!(b.as_slice().iter().all(|p| *p == px(0.25)));
}

#[test]
fn reset_releases_storage_and_is_idempotent() {
    let mut b = PixelBuffer::with_size(3, 3);
    b.reset();
    b.reset();
    assert!(!b.is_allocated());
    assert_eq!((b.width(), b.height(), b.len()), (0, 0, 0));
}

#[test]
fn from_pixels_checks_length() {
    assert!(PixelBuffer::from_pixels(2, 2, vec![px(0.0); 3]).is_err());
    let b = PixelBuffer::from_pixels(2, 2, vec![px(0.5); 4]).unwrap();
    assert_eq!(b.get(1, 1), Some(px(0.5)));
    assert_eq!(b.get(2, 0), None);
}

#[test]
fn flip_vertical_swaps_rows() {
    let mut b =
        PixelBuffer::from_pixels(1, 3, vec![px(0.0), px(1.0), px(2.0)]).unwrap();
    b.flip_vertical();
    assert_eq!(b.as_slice(), &[px(2.0), px(1.0), px(0.0)]);
}

#[test]
fn overwrite_places_tile_rows_top_down() {
    let mut full = PixelBuffer::with_size(4, 4);
    // Upper-right 2x2 quadrant in y-up coordinates.
    let region = RenderRegion::new(2, 3, 2, 3).unwrap();
    let tile = vec![px(1.0), px(2.0), px(3.0), px(4.0)];
    full.overwrite(&tile, &region, 4, 4).unwrap();
    assert_eq!(full.get(2, 0), Some(px(1.0)));
    assert_eq!(full.get(3, 0), Some(px(2.0)));
    assert_eq!(full.get(2, 1), Some(px(3.0)));
    assert_eq!(full.get(3, 1), Some(px(4.0)));
    assert_eq!(full.get(0, 3), Some(Rgba32F::TRANSPARENT));
}

#[test]
fn overwrite_rejects_mismatched_target() {
    let mut full = PixelBuffer::with_size(4, 3);
    let region = RenderRegion::from_size(2, 2);
    assert!(full.overwrite(&[px(0.0); 4], &region, 4, 4).is_err());
    let outside = RenderRegion::new(3, 4, 0, 0).unwrap();
    assert!(full.overwrite(&[px(0.0); 2], &outside, 4, 3).is_err());
}

#[test]
fn rgba8_conversion_clamps() {
    let b = PixelBuffer::from_pixels(1, 1, vec![Rgba32F::new(-1.0, 0.5, 2.0, 1.0)]).unwrap();
    assert_eq!(b.to_rgba8(), vec![0, 128, 255, 255]);
    assert_eq!(b.to_f32_vec(), vec![-1.0, 0.5, 2.0, 1.0]);
}
