// World rendering support: lightmap atlas, face polygons, PVS face lists

pub mod config;
pub mod surface;
pub mod lightmap;
pub mod light;
pub mod world_view;
pub mod level;

pub use config::{LightmapConfig, RendererConfig};
pub use level::{Level, LevelSlot};
pub use lightmap::{build_lightmaps, LightmapAtlas, MemoryUploader, TextureUploader};
pub use world_view::VisibleFaceAssembler;
