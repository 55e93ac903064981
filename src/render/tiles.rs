use crate::backend::session::{CameraFraming, Projection};
use crate::foundation::core::{Outcome, RenderRegion};
use crate::foundation::error::{RenderError, RenderResult};

/// Frame and tile dimensions of one tiled render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileRenderInfo {
    /// Width of the assembled image.
    pub total_width: u32,
    /// Height of the assembled image.
    pub total_height: u32,
    /// Width every tile is rendered at.
    pub tile_width: u32,
    /// Height every tile is rendered at.
    pub tile_height: u32,
}

impl TileRenderInfo {
    /// Reject zero-sized frames or tiles.
    pub fn validate(&self) -> RenderResult<()> {
        if self.total_width == 0 || self.total_height == 0 {
            return Err(RenderError::configuration(format!(
                "tiled frame must be non-empty, got {}x{}",
                self.total_width, self.total_height
            )));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(RenderError::configuration(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        if i32::try_from(self.total_width).is_err() || i32::try_from(self.total_height).is_err() {
            return Err(RenderError::configuration("tiled frame is too large"));
        }
        Ok(())
    }

    /// Tile columns.
    pub fn x_tiles(&self) -> u32 {
        self.total_width.div_ceil(self.tile_width.max(1))
    }

    /// Tile rows.
    pub fn y_tiles(&self) -> u32 {
        self.total_height.div_ceil(self.tile_height.max(1))
    }

    /// Tiles in the grid.
    pub fn tile_count(&self) -> u32 {
        self.x_tiles() * self.y_tiles()
    }

    /// Region of tile `(x, y)` in the assembled frame, clamped at the far edges.
    ///
    /// `y` counts tile rows upwards, like region rows.
    pub fn tile_region(&self, x: u32, y: u32) -> RenderRegion {
        let left = (x * self.tile_width) as i32;
        let bottom = (y * self.tile_height) as i32;
        RenderRegion {
            left,
            right: (left + self.tile_width as i32).min(self.total_width as i32) - 1,
            bottom,
            top: (bottom + self.tile_height as i32).min(self.total_height as i32) - 1,
        }
    }

    /// `region` expressed in the tile's own frame, anchored at its lower-left corner.
    pub fn local_region(&self, region: &RenderRegion) -> RenderRegion {
        RenderRegion::from_size(region.width(), region.height())
    }

    /// Window a tile renders through: the tile-sized rectangle whose lower-left corner is the
    /// region's. Edge tiles reach past the frame.
    pub fn tile_window(&self, region: &RenderRegion) -> RenderRegion {
        RenderRegion {
            left: region.left,
            right: region.left + self.tile_width as i32 - 1,
            bottom: region.bottom,
            top: region.bottom + self.tile_height as i32 - 1,
        }
    }
}

/// Every tile region of `info`, in render order.
///
/// Tile rows are visited from the highest `bottom` down, so the top image row comes first;
/// columns go left to right.
pub fn tile_grid(info: &TileRenderInfo) -> Vec<RenderRegion> {
    let mut out = Vec::with_capacity(info.tile_count() as usize);
    for y in (0..info.y_tiles()).rev() {
        for x in 0..info.x_tiles() {
            out.push(info.tile_region(x, y));
        }
    }
    out
}

/// Per-tile camera framing strategy.
pub trait TileFraming {
    /// Framing that makes a tile-sized render show exactly `region` of the frame `base` shows.
    fn frame_tile(
        &self,
        base: &CameraFraming,
        info: &TileRenderInfo,
        region: &RenderRegion,
    ) -> CameraFraming;
}

/// Frames tiles by shifting the lens and shrinking the film extent.
///
/// Works for perspective (sensor size) and orthographic (view width and height) cameras.
#[derive(Clone, Copy, Debug, Default)]
pub struct LensShiftFraming;

impl TileFraming for LensShiftFraming {
    fn frame_tile(
        &self,
        base: &CameraFraming,
        info: &TileRenderInfo,
        region: &RenderRegion,
    ) -> CameraFraming {
        let (total_w, total_h) = (info.total_width as f32, info.total_height as f32);
        let (tile_w, tile_h) = (info.tile_width as f32, info.tile_height as f32);
        let (scale_x, scale_y) = (tile_w / total_w, tile_h / total_h);

        let shift_x = (region.left as f32 + 0.5 * (tile_w - total_w)) / tile_w
            + base.lens_shift[0] / scale_x;
        let shift_y = (region.bottom as f32 + 0.5 * (tile_h - total_h)) / tile_h
            + base.lens_shift[1] / scale_y;

        let projection = match base.projection {
            Projection::Perspective { sensor } => Projection::Perspective {
                sensor: [sensor[0] * scale_x, sensor[1] * scale_y],
            },
            Projection::Orthographic { width, height } => Projection::Orthographic {
                width: width * scale_x,
                height: height * scale_y,
            },
        };
        CameraFraming {
            projection,
            lens_shift: [shift_x, shift_y],
        }
    }
}

/// What a tile loop drives.
pub trait TileTarget {
    /// Framing in force before tiling starts. Restored when the loop ends.
    fn camera_framing(&self) -> CameraFraming;

    /// Replace the camera framing.
    fn set_camera_framing(&mut self, framing: CameraFraming) -> RenderResult<()>;

    /// Per-tile setup before rendering, such as slicing the backplate for `window`.
    fn prepare_tile(&mut self, _region: &RenderRegion, _window: &RenderRegion) -> RenderResult<()> {
        Ok(())
    }

    /// Render one tile to completion.
    fn render_tile(&mut self, region: &RenderRegion) -> RenderResult<Outcome<()>>;
}

/// Progress handed to the per-tile callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileProgress {
    /// Tile region in the assembled frame.
    pub region: RenderRegion,
    /// Same region inside the tile's own frame.
    pub local_region: RenderRegion,
    /// Zero-based position in render order.
    pub index: u32,
    /// Tiles in the grid.
    pub count: u32,
    /// `100 * (index + 1) / count`.
    pub percent: u32,
}

/// Summary of a tile loop that was not aborted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileStats {
    /// Tiles rendered and handed to the callback.
    pub rendered: u32,
    /// Tiles in the grid.
    pub total: u32,
    /// The callback asked to stop before the grid was exhausted.
    pub stopped_early: bool,
}

/// Drives a [`TileTarget`] over a tile grid.
#[derive(Clone, Copy, Debug)]
pub struct TileRenderer {
    info: TileRenderInfo,
}

impl TileRenderer {
    /// Renderer for a validated grid.
    pub fn new(info: TileRenderInfo) -> RenderResult<Self> {
        info.validate()?;
        Ok(Self { info })
    }

    /// Grid dimensions.
    pub fn info(&self) -> &TileRenderInfo {
        &self.info
    }

    /// Regions in render order.
    pub fn regions(&self) -> Vec<RenderRegion> {
        tile_grid(&self.info)
    }

    /// Render every tile, calling `on_tile` after each one.
    ///
    /// `on_tile` gets the target back to read the tile's pixels; returning `false` stops the
    /// loop before the next tile. The target's original camera framing is restored on every
    /// exit path.
    #[tracing::instrument(skip_all, fields(
        width = self.info.total_width,
        height = self.info.total_height,
        tiles = self.info.tile_count()
    ))]
    pub fn render<T, F>(
        &self,
        target: &mut T,
        framing: &dyn TileFraming,
        mut on_tile: F,
    ) -> RenderResult<Outcome<TileStats>>
    where
        T: TileTarget + ?Sized,
        F: FnMut(&TileProgress, &mut T) -> RenderResult<bool>,
    {
        let base = target.camera_framing();
        let result = self.visit(target, framing, &base, &mut on_tile);
        let restored = target
            .set_camera_framing(base)
            .map_err(|e| e.context("restore camera framing"));
        let outcome = result?;
        restored?;
        Ok(outcome)
    }

    fn visit<T, F>(
        &self,
        target: &mut T,
        framing: &dyn TileFraming,
        base: &CameraFraming,
        on_tile: &mut F,
    ) -> RenderResult<Outcome<TileStats>>
    where
        T: TileTarget + ?Sized,
        F: FnMut(&TileProgress, &mut T) -> RenderResult<bool>,
    {
        let count = self.info.tile_count();
        let mut stats = TileStats {
            total: count,
            ..TileStats::default()
        };
        for (index, region) in self.regions().into_iter().enumerate() {
            let index = index as u32;
            let window = self.info.tile_window(&region);
            target.set_camera_framing(framing.frame_tile(base, &self.info, &region))?;
            target.prepare_tile(&region, &window)?;
            if target
                .render_tile(&region)
                .map_err(|e| e.context(format!("tile {index}")))?
                .is_aborted()
            {
                tracing::debug!(index, "tile render aborted");
                return Ok(Outcome::Aborted);
            }
            stats.rendered += 1;
            let progress = TileProgress {
                region,
                local_region: self.info.local_region(&region),
                index,
                count,
                percent: 100 * (index + 1) / count,
            };
            if !on_tile(&progress, target)? {
                stats.stopped_early = stats.rendered < count;
                break;
            }
        }
        Ok(Outcome::Finished(stats))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/tiles.rs"]
mod tests;
