// main.rs — sof-bspinfo: load a map and report what the renderer would see
//
// Loads maps/<map>.bsp from the game directory on a loader thread, builds
// its lightmap atlas, then runs one visibility pass from the camera.

mod loader;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::error;

use sof_common::files::FileSystem;
use sof_common::q_shared::Vec3;
use sof_renderer::light::light_point;
use sof_renderer::lightmap::BLOCK_FORMAT;
use sof_renderer::surface::build_face_polygon;
use sof_renderer::{Level, LevelSlot, MemoryUploader, RendererConfig, VisibleFaceAssembler};

use crate::loader::MapLoader;

#[derive(Parser, Debug)]
#[command(name = "sof-bspinfo", version, about = "Inspect a Quake 2 BSP level")]
struct Args {
    /// Directory holding the game directories
    #[arg(long, value_name = "DIR", default_value = ".")]
    basedir: PathBuf,

    /// Game directory under basedir
    #[arg(long, default_value = "base")]
    game: String,

    /// Map name, without maps/ and .bsp
    map: String,

    /// Camera position; defaults to the player start
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    camera: Option<Vec<f32>>,

    /// Ignore the PVS and treat every face as visible
    #[arg(long)]
    novis: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = RendererConfig {
        novis: args.novis,
        ..Default::default()
    };

    let mut fs = FileSystem::new();
    fs.add_game_directory(&args.basedir.join(&args.game));

    let loader = match MapLoader::spawn(fs, &args.map) {
        Ok(loader) => loader,
        Err(e) => {
            error!("couldn't start loader thread: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let world = match loader.wait() {
        Some(Ok(world)) => world,
        Some(Err(e)) => {
            error!("Couldn't load {}: {}", args.map, e);
            return ExitCode::FAILURE;
        }
        None => {
            error!("map loader exited without a result");
            return ExitCode::FAILURE;
        }
    };

    let mut uploader = MemoryUploader::new();
    let slot = LevelSlot::new();
    slot.install(Level::new(world, &mut uploader, &config.lightmap));
    let Some(level) = slot.current() else {
        return ExitCode::FAILURE;
    };

    let camera: Vec3 = match args.camera.as_deref() {
        Some(&[x, y, z]) => [x, y, z],
        _ => level.spawn,
    };

    report(&level, &uploader, &config, &camera);

    drop(level);
    if let Some(level) = slot.clear().and_then(|l| Arc::try_unwrap(l).ok()) {
        level.free(&mut uploader);
    }
    ExitCode::SUCCESS
}

fn report(level: &Level, uploader: &MemoryUploader, config: &RendererConfig, camera: &Vec3) {
    let world = &level.world;
    println!("{}", world.summary());

    let atlas = &level.lightmaps;
    let block_bytes = atlas.block_width * atlas.block_height * BLOCK_FORMAT.bytes_per_pixel();
    println!(
        "lightmaps: {} blocks of {}x{} ({} KiB), {} lit faces, {} live textures",
        atlas.textures.len(),
        atlas.block_width,
        atlas.block_height,
        atlas.textures.len() * block_bytes / 1024,
        atlas.lit_faces(),
        uploader.live()
    );

    let textures = world.texture_names();
    println!("textures: {}", textures.len());

    let mut asm = VisibleFaceAssembler::new(config.novis);
    let visible = asm.visible_faces(world, camera);
    let polys: Vec<_> = visible
        .iter()
        .filter_map(|&f| build_face_polygon(world, atlas, f))
        .collect();
    let lit = polys.iter().filter(|p| p.lightmap_texture.is_some()).count();
    let verts: usize = polys.iter().map(|p| p.verts.len()).sum();
    let visible = visible.len();
    let leaf = world.point_leaf(camera);
    println!(
        "camera ({} {} {}): leaf {}, cluster {}, contents {:#x}",
        camera[0],
        camera[1],
        camera[2],
        leaf,
        asm.view_cluster(),
        world.point_contents(camera)
    );
    println!("visible faces: {} of {}", visible, world.faces.len());
    println!("polygons: {} ({} lightmapped, {} vertices)", polys.len(), lit, verts);

    let light = light_point(world, camera, &config.lightmap);
    println!("light: {:.3} {:.3} {:.3}", light[0], light[1], light[2]);
}
