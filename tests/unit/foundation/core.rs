use super::*;

#[test]
fn full_frame_region_bounds() {
    let r = RenderRegion::from_size(64, 48);
    assert_eq!((r.left, r.right, r.bottom, r.top), (0, 63, 0, 47));
    assert_eq!(r.width(), 64);
    assert_eq!(r.height(), 48);
    assert_eq!(r.area(), 64 * 48);
    assert!(r.is_full_frame(64, 48));
    assert!(!r.is_full_frame(64, 47));
}

#[test]
fn region_arithmetic_holds_for_many_shapes() {
    for (x, y, w, h) in [(0, 0, 1, 1), (3, 5, 7, 2), (10, 0, 0, 4), (0, 9, 6, 0), (2, 2, 31, 17)] {
        let r = RenderRegion::from_origin(x, y, w, h).unwrap();
        assert_eq!(u64::from(r.width()) * u64::from(r.height()), r.area());
        assert_eq!(r.is_zero_area(), r.width() == 0 || r.height() == 0);
    }
}

#[test]
fn default_region_is_empty() {
    let r = RenderRegion::default();
    assert!(r.is_zero_area());
    assert_eq!(r.area(), 0);
    assert!(RenderRegion::from_size(0, 10).is_zero_area());
}

#[test]
fn inverted_or_negative_regions_are_rejected() {
    assert!(matches!(
        RenderRegion::new(-1, 4, 0, 4),
        Err(RenderError::InvalidUsage(_))
    ));
    assert!(matches!(
        RenderRegion::new(5, 2, 0, 4),
        Err(RenderError::InvalidUsage(_))
    ));
    assert!(RenderRegion::new(5, 4, 0, 4).unwrap().is_zero_area());
}

#[test]
fn containment_and_overlap() {
    let a = RenderRegion::new(0, 9, 0, 9).unwrap();
    let b = RenderRegion::new(9, 12, 9, 12).unwrap();
    let c = RenderRegion::new(10, 12, 0, 3).unwrap();
    assert!(a.contains(9, 0));
    assert!(!a.contains(10, 0));
    assert!(a.overlaps(&b));
    assert!(!a.overlaps(&c));
    assert!(a.fits_within(10, 10));
    assert!(!b.fits_within(10, 10));
}

#[test]
fn pixel_helpers() {
    let p = Rgba32F::new(1.0, 2.0, 3.0, 4.0);
    assert_eq!(p.scale(0.5).to_array(), [0.5, 1.0, 1.5, 2.0]);
    assert_eq!(Rgba32F::BLACK.lerp(Rgba32F::WHITE, 0.5).r, 0.5);
    assert_eq!(Rgba32F::opaque([0.1, 0.2, 0.3]).a, 1.0);
}

#[test]
fn outcome_accessors() {
    let done: Outcome<u32> = Outcome::Finished(3);
    assert!(done.is_finished());
    assert_eq!(done.map(|v| v * 2).finished(), Some(6));
    let aborted: Outcome<u32> = Outcome::Aborted;
    assert!(aborted.is_aborted());
    assert_eq!(aborted.finished(), None);
}
