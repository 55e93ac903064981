use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use render_orchestrator::{
    BackendKind, ChannelId, CpuBackendOpts, CreationFlags, ImageFileDescription,
    ImageFileWriter, MemoryScene, Outcome, RenderContext, RenderSettings, RenderType,
    SceneDocument, SceneExporter, create_backend,
};

#[derive(Parser, Debug)]
#[command(name = "render-orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a scene document to an image file.
    Render(RenderArgs),
    /// List the output channel catalogue.
    Channels,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Render settings JSON. Defaults apply when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Frame width.
    #[arg(long, default_value_t = 256)]
    width: u32,

    /// Frame height.
    #[arg(long, default_value_t = 256)]
    height: u32,

    /// Output image path. The extension picks the format.
    #[arg(long)]
    out: PathBuf,

    /// Render tile by tile using the settings' tile size.
    #[arg(long, default_value_t = false)]
    tiles: bool,

    /// Override the tile size (square tiles, implies --tiles).
    #[arg(long)]
    tile_size: Option<u32>,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Also export the synced scene (`.json` for JSON, anything else for a manifest).
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Channels => {
            cmd_channels();
            Ok(())
        }
    }
}

fn cmd_channels() {
    for id in ChannelId::ALL {
        let d = id.descriptor();
        println!("{:>2}  {:<20} {:<22} {}", id.index(), d.name, d.attribute, d.folder);
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let doc = SceneDocument::from_path(&args.scene)?;
    let mut settings = match &args.settings {
        Some(path) => RenderSettings::from_path(path)?,
        None => RenderSettings::default(),
    };
    if let Some(size) = args.tile_size {
        settings.tile.width = size;
        settings.tile.height = size;
    }
    let tiled = args.tiles || args.tile_size.is_some() || settings.tile.enabled;

    let scene = Arc::new(MemoryScene::from_document(&doc));
    let backend = create_backend(BackendKind::Cpu, CpuBackendOpts::default());
    let ctx = RenderContext::new(backend, scene.clone(), RenderType::Production);
    scene.attach(ctx.listener());

    ctx.set_settings(settings).context("apply settings")?;
    let flags = CreationFlags {
        threads: args.threads,
        ..CreationFlags::default()
    };
    ctx.initialize(&flags).context("initialize render context")?;
    ctx.resize(args.width, args.height)
        .with_context(|| format!("resize to {}x{}", args.width, args.height))?;
    if ctx.freshen(&|| false)?.is_aborted() {
        anyhow::bail!("scene sync was aborted");
    }

    if tiled {
        let outcome = ctx.render_tiles(&|| false, |p, _| {
            eprintln!("tile {}/{} ({}%)", p.index + 1, p.count, p.percent);
            true
        })?;
        if outcome.is_aborted() {
            anyhow::bail!("tiled render was aborted");
        }
    } else {
        match ctx.render_until_complete(&|| false)? {
            Outcome::Finished(pass) => {
                eprintln!("rendered {} iterations", pass.total_iterations);
            }
            Outcome::Aborted => anyhow::bail!("render was aborted"),
        }
        ctx.read_frame_buffers(false).context("read frame buffers")?;
    }

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let description = ImageFileDescription::for_path(&args.out);
    let written = ctx
        .save_to_file(&mut ImageFileWriter, &args.out, &description)
        .with_context(|| format!("write '{}'", args.out.display()))?;

    if let Some(path) = &args.export {
        ctx.export_scene(SceneExporter::for_path(path), path)
            .with_context(|| format!("export scene '{}'", path.display()))?;
        eprintln!("exported {}", path.display());
    }

    let stats = ctx.teardown();
    for path in written {
        eprintln!("wrote {}", path.display());
    }
    eprintln!("released {} objects", stats.objects_released);
    Ok(())
}
