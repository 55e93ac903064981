use super::*;

#[derive(Default)]
struct Recorder {
    framing: CameraFraming,
    rendered: Vec<RenderRegion>,
    windows: Vec<RenderRegion>,
    framings: Vec<CameraFraming>,
    fail_at: Option<usize>,
    abort_at: Option<usize>,
}

impl TileTarget for Recorder {
    fn camera_framing(&self) -> CameraFraming {
        self.framing
    }

    fn set_camera_framing(&mut self, framing: CameraFraming) -> RenderResult<()> {
        self.framing = framing;
        Ok(())
    }

    fn prepare_tile(&mut self, _region: &RenderRegion, window: &RenderRegion) -> RenderResult<()> {
        self.windows.push(*window);
        Ok(())
    }

    fn render_tile(&mut self, region: &RenderRegion) -> RenderResult<Outcome<()>> {
        let n = self.rendered.len();
        if self.fail_at == Some(n) {
            return Err(RenderError::backend("device lost"));
        }
        if self.abort_at == Some(n) {
            return Ok(Outcome::Aborted);
        }
        self.rendered.push(*region);
        self.framings.push(self.framing);
        Ok(Outcome::Finished(()))
    }
}

fn info(w: u32, h: u32, tw: u32, th: u32) -> TileRenderInfo {
    TileRenderInfo {
        total_width: w,
        total_height: h,
        tile_width: tw,
        tile_height: th,
    }
}

#[test]
fn grid_covers_the_frame_exactly_once() {
    for (w, h, tw, th) in [(200, 150, 64, 64), (64, 64, 64, 64), (7, 3, 2, 5), (1, 1, 16, 16)] {
        let i = info(w, h, tw, th);
        let mut hits = vec![0u8; (w * h) as usize];
        for r in tile_grid(&i) {
            assert!(r.fits_within(w, h), "{r:?}");
            for y in r.bottom..=r.top {
                for x in r.left..=r.right {
                    hits[(y as u32 * w + x as u32) as usize] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&c| c == 1), "{w}x{h} tiles {tw}x{th}");
    }
}

#[test]
fn grid_runs_top_row_first_left_to_right() {
    let regions = tile_grid(&info(200, 150, 64, 64));
    assert_eq!(regions.len(), 12);
    assert_eq!(regions[0], RenderRegion::new(0, 63, 128, 149).unwrap());
    assert_eq!(regions[3], RenderRegion::new(192, 199, 128, 149).unwrap());
    assert_eq!(regions[11], RenderRegion::new(192, 199, 0, 63).unwrap());
}

#[test]
fn invalid_grids_are_configuration_errors() {
    assert!(matches!(
        TileRenderer::new(info(0, 10, 4, 4)),
        Err(RenderError::Configuration(_))
    ));
    assert!(matches!(
        TileRenderer::new(info(10, 10, 0, 4)),
        Err(RenderError::Configuration(_))
    ));
}

#[test]
fn callback_sees_every_tile_with_rising_percent() {
    let renderer = TileRenderer::new(info(100, 50, 50, 50)).unwrap();
    let mut target = Recorder::default();
    let mut seen = Vec::new();
    let outcome = renderer
        .render(&mut target, &LensShiftFraming, |p, _| {
            seen.push((p.index, p.percent, p.local_region));
            Ok(true)
        })
        .unwrap();
    let stats = outcome.finished().unwrap();
    assert_eq!(
        stats,
        TileStats {
            rendered: 2,
            total: 2,
            stopped_early: false
        }
    );
    assert_eq!(seen[0].1, 50);
    assert_eq!(seen[1].1, 100);
    assert_eq!(seen[0].2, RenderRegion::from_size(50, 50));
}

#[test]
fn early_stop_skips_remaining_tiles_and_restores_framing() {
    let renderer = TileRenderer::new(info(200, 150, 64, 64)).unwrap();
    let mut target = Recorder::default();
    let before = target.framing;
    let outcome = renderer
        .render(&mut target, &LensShiftFraming, |p, _| Ok(p.index < 2))
        .unwrap();
    let stats = outcome.finished().unwrap();
    assert_eq!(stats.rendered, 3);
    assert!(stats.stopped_early);
    assert_eq!(target.rendered.len(), 3);
    assert_eq!(target.framing, before);
    assert_ne!(target.framings[0], before);
}

#[test]
fn failures_and_aborts_still_restore_framing() {
    let renderer = TileRenderer::new(info(128, 128, 64, 64)).unwrap();
    let mut failing = Recorder {
        fail_at: Some(1),
        ..Recorder::default()
    };
    let before = failing.framing;
    let err = renderer
        .render(&mut failing, &LensShiftFraming, |_, _| Ok(true))
        .unwrap_err();
    assert!(err.to_string().contains("tile 1"), "{err}");
    assert_eq!(failing.framing, before);

    let mut aborting = Recorder {
        abort_at: Some(2),
        ..Recorder::default()
    };
    let outcome = renderer
        .render(&mut aborting, &LensShiftFraming, |_, _| Ok(true))
        .unwrap();
    assert!(outcome.is_aborted());
    assert_eq!(aborting.rendered.len(), 2);
    assert_eq!(aborting.framing, before);
}

#[test]
fn windows_are_tile_sized_even_at_edges() {
    let renderer = TileRenderer::new(info(100, 100, 64, 64)).unwrap();
    let mut target = Recorder::default();
    let outcome = renderer
        .render(&mut target, &LensShiftFraming, |_, _| Ok(true))
        .unwrap();
    assert!(outcome.is_finished());
    for w in &target.windows {
        assert_eq!((w.width(), w.height()), (64, 64));
    }
}

#[test]
fn lens_shift_maps_tile_pixels_onto_frame_pixels() {
    let base = CameraFraming {
        projection: Projection::Orthographic {
            width: 4.0,
            height: 3.0,
        },
        lens_shift: [0.1, -0.2],
    };
    let i = info(200, 150, 64, 64);
    let region = i.tile_region(1, 2);
    let framed = LensShiftFraming.frame_tile(&base, &i, &region);

    let film = |f: &CameraFraming, w: f32, h: f32, px: f32, py: f32| {
        let [ex, ey] = f.extent();
        (
            ((px + 0.5) / w - 0.5 + f.lens_shift[0]) * ex,
            ((py + 0.5) / h - 0.5 + f.lens_shift[1]) * ey,
        )
    };
    for (tx, ty) in [(0.0, 0.0), (13.0, 40.0), (63.0, 63.0)] {
        let tile = film(&framed, 64.0, 64.0, tx, ty);
        let full = film(
            &base,
            200.0,
            150.0,
            region.left as f32 + tx,
            region.bottom as f32 + ty,
        );
        assert!((tile.0 - full.0).abs() < 1e-3, "{tile:?} vs {full:?}");
        assert!((tile.1 - full.1).abs() < 1e-3, "{tile:?} vs {full:?}");
    }
}

#[test]
fn lens_shift_scales_perspective_sensor() {
    let base = CameraFraming::default();
    let i = info(200, 100, 50, 50);
    let framed = LensShiftFraming.frame_tile(&base, &i, &i.tile_region(0, 0));
    assert_eq!(
        framed.projection,
        Projection::Perspective {
            sensor: [36.0 * 0.25, 24.0 * 0.5]
        }
    );
}
