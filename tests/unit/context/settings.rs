use super::*;

#[test]
fn empty_json_gives_defaults() {
    let s = RenderSettings::from_json_str("{}").unwrap();
    assert_eq!(s, RenderSettings::default());
    assert_eq!(s.samples_per_update, 1);
    assert_eq!((s.tile.width, s.tile.height), (256, 256));
    assert!(s.is_channel_enabled(ChannelId::Color));
    assert!(!s.is_channel_enabled(ChannelId::Depth));
    s.validate().unwrap();
}

#[test]
fn json_fields_are_parsed() {
    let s = RenderSettings::from_json_str(
        r#"{
            "completion": { "mode": "time_limit", "max_seconds": 2.5 },
            "channels": ["opacity", "depth"],
            "render_view": "shading_normal",
            "post_effects": [{ "kind": "gamma_correction", "gamma": 2.2 }],
            "tile": { "enabled": true, "width": 64 },
            "backplate": { "fit": "stretch" },
            "quality": "high"
        }"#,
    )
    .unwrap();
    assert_eq!(s.completion, CompletionCriteriaParams::seconds(2.5));
    assert!(s.is_channel_enabled(ChannelId::Depth));
    assert!(s.is_channel_enabled(ChannelId::ShadingNormal));
    assert_eq!(s.post_effects, vec![PostEffect::GammaCorrection { gamma: 2.2 }]);
    assert_eq!((s.tile.enabled, s.tile.width, s.tile.height), (true, 64, 256));
    assert_eq!(s.backplate.fit, BackplateFit::Stretch);
    assert_eq!(s.quality, RenderQuality::High);
    s.validate().unwrap();
}

#[test]
fn malformed_json_is_a_serde_error() {
    assert!(matches!(
        RenderSettings::from_json_str("{ \"tile\": 3 }"),
        Err(RenderError::Serde(_))
    ));
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let err = RenderSettings::from_path(Path::new("/nonexistent/settings.json")).unwrap_err();
    assert!(err.to_string().contains("settings.json"), "{err}");
}

#[test]
fn validation_rejects_unusable_settings() {
    let cases: Vec<Box<dyn Fn(&mut RenderSettings)>> = vec![
        Box::new(|s| s.samples_per_update = 0),
        Box::new(|s| s.tile.width = 0),
        Box::new(|s| s.catchers.shadow_weight = -1.0),
        Box::new(|s| s.post_effects = vec![PostEffect::GammaCorrection { gamma: f32::NAN }]),
        Box::new(|s| {
            s.depth.min = 5.0;
            s.depth.max = 1.0;
        }),
        Box::new(|s| s.completion = CompletionCriteriaParams::iterations(0)),
    ];
    for (i, edit) in cases.iter().enumerate() {
        let mut s = RenderSettings::default();
        edit(&mut s);
        assert!(
            matches!(s.validate(), Err(RenderError::Configuration(_))),
            "case {i}"
        );
    }
}
