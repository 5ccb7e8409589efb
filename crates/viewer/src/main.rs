//! # SDF Viewer
//!
//! Opens a window and raymarches the demo sphere and box scene through the
//! `raymarch` pipeline. Shaders under the shader root are watched and reloaded
//! when they change; `R` reloads by hand, `Space` toggles the frame time
//! readout in the title bar and `Escape` quits.

mod app;
mod overlay;
mod params;
mod watcher;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use raymarch::RendererConfig;
use tracing::Level;

/// Command line options for the viewer
#[derive(Parser, Debug)]
#[command(name = "sdf_viewer", about = "Raymarch a signed distance field scene")]
struct Args {
    /// Initial window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Initial window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Directory holding the WGSL shaders
    #[arg(long, env = "RAYMARCH_SHADER_ROOT", default_value = "shaders")]
    shader_root: PathBuf,
    /// Directory holding textures
    #[arg(long, default_value = "textures")]
    texture_root: PathBuf,
    /// Fragment shader drawn on the full-screen quad
    #[arg(long, default_value = "sdf_scene.frag.wgsl")]
    fragment: String,
    /// Do not reload shaders when their files change
    #[arg(long)]
    no_watch: bool,
    /// Also draw a lit sphere on the cube proxy
    #[arg(long)]
    lit_sphere: bool,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_options(self) -> app::Options {
        app::Options {
            config: RendererConfig {
                width: self.width,
                height: self.height,
                shader_root: self.shader_root,
                texture_root: self.texture_root,
                watch_shaders: !self.no_watch,
                ..RendererConfig::default()
            },
            fragment: self.fragment,
            lit_sphere: self.lit_sphere,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();
    app::run(args.into_options())
}
