use super::*;

fn depth(v: f32) -> Rgba32F {
    Rgba32F::new(v, v, v, 1.0)
}

#[test]
fn fixed_bounds_clamp_and_scale() {
    let n = DepthNormalization {
        auto_normalize: false,
        invert: false,
        min: 2.0,
        max: 6.0,
    };
    let mut px = vec![depth(1.0), depth(4.0), depth(8.0), depth(0.0)];
    n.apply(&mut px);
    assert_eq!(px[0].r, 0.0);
    assert_eq!(px[1].r, 0.5);
    assert_eq!(px[2].r, 1.0);
    // Background stays untouched.
    assert_eq!(px[3], depth(0.0));
    assert_eq!(px[1].g, px[1].r);
    assert_eq!(px[1].b, px[1].r);
}

#[test]
fn auto_bounds_ignore_background_and_invert() {
    let n = DepthNormalization {
        auto_normalize: true,
        invert: true,
        ..DepthNormalization::default()
    };
    let mut px = vec![depth(0.0), depth(10.0), depth(20.0), depth(15.0)];
    assert_eq!(DepthNormalization::search_min_max(&px), Some((10.0, 20.0)));
    n.apply(&mut px);
    assert_eq!(px[1].r, 1.0);
    assert_eq!(px[2].r, 0.0);
    assert_eq!(px[3].r, 0.5);
    assert_eq!(px[0].r, 0.0);
}

#[test]
fn auto_bounds_without_valid_pixels_is_noop() {
    let n = DepthNormalization {
        auto_normalize: true,
        ..DepthNormalization::default()
    };
    let mut px = vec![depth(0.0), depth(-1.0)];
    n.apply(&mut px);
    assert_eq!(px, vec![depth(0.0), depth(-1.0)]);
}
