use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::backend::session::{CameraFraming, Projection};
use crate::context::render_context::RenderContext;
use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::graph::ObjectSnapshot;

/// One backend-side object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedObject {
    /// Identity the object is registered under.
    pub key: String,
    /// Attributes last sent to the backend.
    pub attributes: ObjectSnapshot,
}

/// Snapshot of the scene as the backend sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneExport {
    /// Session name, empty before initialize.
    pub renderer: String,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Camera framing, `None` before initialize.
    pub camera: Option<CameraFraming>,
    /// Registered objects sorted by key.
    pub objects: Vec<ExportedObject>,
}

/// Output format for [`RenderContext::export_scene`], chosen once per exporter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SceneExporter {
    /// Pretty-printed JSON document of the whole [`SceneExport`].
    #[default]
    Json,
    /// Line-oriented text manifest, one block per object.
    Manifest,
}

impl SceneExporter {
    /// `Json` for `.json` paths, `Manifest` otherwise.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Manifest,
        }
    }

    /// Render `export` in this format.
    pub fn to_text(self, export: &SceneExport) -> RenderResult<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(export)
                .map_err(|e| RenderError::serde(format!("scene export: {e}"))),
            Self::Manifest => manifest(export),
        }
    }

    /// Write `export` to `path`, creating the parent directory.
    pub fn export(self, export: &SceneExport, path: &Path) -> RenderResult<()> {
        let text = self.to_text(export)?;
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create export directory '{}'", dir.display()))?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("write scene export '{}'", path.display()))?;
        tracing::debug!(path = %path.display(), objects = export.objects.len(), "scene exported");
        Ok(())
    }
}

fn manifest(export: &SceneExport) -> RenderResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "renderer {}", export.renderer);
    let _ = writeln!(out, "size {}x{}", export.width, export.height);
    if let Some(camera) = &export.camera {
        let [sx, sy] = camera.lens_shift;
        match camera.projection {
            Projection::Perspective { sensor } => {
                let _ = writeln!(
                    out,
                    "camera perspective {}x{} shift {sx},{sy}",
                    sensor[0], sensor[1]
                );
            }
            Projection::Orthographic { width, height } => {
                let _ = writeln!(out, "camera orthographic {width}x{height} shift {sx},{sy}");
            }
        }
    }
    for obj in &export.objects {
        let _ = writeln!(out, "object {} {}", obj.key, obj.attributes.len());
        for (name, value) in &obj.attributes {
            let value = serde_json::to_string(value)
                .map_err(|e| RenderError::serde(format!("export '{}.{name}': {e}", obj.key)))?;
            let _ = writeln!(out, "  {name} = {value}");
        }
    }
    Ok(out)
}

impl RenderContext {
    /// Snapshot of the synced scene.
    pub fn scene_export(&self) -> SceneExport {
        let guard = self.lock("scene_export");
        let inner = &*guard.inner;
        let mut objects: Vec<ExportedObject> = inner
            .objects
            .iter()
            .map(|(_, o)| ExportedObject {
                key: o.key.clone(),
                attributes: o.snapshot.clone(),
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        SceneExport {
            renderer: inner
                .session
                .as_ref()
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
            width: inner.width,
            height: inner.height,
            camera: inner.session.as_ref().map(|s| s.camera_framing()),
            objects,
        }
    }

    /// Write the synced scene to `path` with `exporter`.
    pub fn export_scene(&self, exporter: SceneExporter, path: &Path) -> RenderResult<()> {
        exporter.export(&self.scene_export(), path)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/context/export.rs"]
mod tests;
