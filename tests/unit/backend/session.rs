use super::*;

#[test]
fn creation_flags_validation() {
    assert!(CreationFlags::default().validate().is_ok());
    let none = CreationFlags {
        devices: vec![],
        threads: None,
    };
    assert!(matches!(none.validate(), Err(RenderError::Configuration(_))));
    let zero = CreationFlags {
        threads: Some(0),
        ..CreationFlags::default()
    };
    assert!(matches!(zero.validate(), Err(RenderError::Configuration(_))));
}

#[test]
fn post_effect_validation_and_kind() {
    assert!(PostEffect::GammaCorrection { gamma: 2.2 }.validate().is_ok());
    assert!(PostEffect::GammaCorrection { gamma: 0.0 }.validate().is_err());
    assert!(
        PostEffect::WhiteBalance {
            temperature: f32::NAN
        }
        .validate()
        .is_err()
    );
    assert_eq!(PostEffect::Normalization.kind(), PostEffectKind::Normalization);
}

#[test]
fn post_effects_parse_from_json() {
    let fx: Vec<PostEffect> = serde_json::from_str(
        r#"[{"kind":"gamma_correction","gamma":2.2},{"kind":"normalization"}]"#,
    )
    .unwrap();
    assert_eq!(fx[0], PostEffect::GammaCorrection { gamma: 2.2 });
    assert_eq!(fx[1], PostEffect::Normalization);
}

#[test]
fn abort_signal_is_shared_and_consumed_once() {
    let a = AbortSignal::new();
    let b = a.clone();
    b.raise();
    assert!(a.is_raised());
    assert!(a.take());
    assert!(!b.take());
}

#[test]
fn camera_extent_follows_projection() {
    let persp = CameraFraming::default();
    assert_eq!(persp.extent(), [36.0, 24.0]);
    let ortho = CameraFraming {
        projection: Projection::Orthographic {
            width: 4.0,
            height: 3.0,
        },
        lens_shift: [0.0, 0.0],
    };
    assert_eq!(ortho.extent(), [4.0, 3.0]);
}
