// level.rs — a loaded level (world + lightmaps) and its hand-off slot

use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use sof_common::bsp::World;
use sof_common::entities::find_player_start;
use sof_common::q_shared::Vec3;

use crate::config::LightmapConfig;
use crate::lightmap::{build_lightmaps, LightmapAtlas, TextureUploader};

/// World and lightmap atlas of one level. Built together, replaced together.
#[derive(Debug)]
pub struct Level {
    pub world: World,
    pub lightmaps: LightmapAtlas,
    /// Camera start: the player start at eye height, or the origin.
    pub spawn: Vec3,
}

impl Level {
    /// Builds the lightmaps for `world` and finds the camera start.
    pub fn new(world: World, uploader: &mut dyn TextureUploader, config: &LightmapConfig) -> Self {
        let lightmaps = build_lightmaps(&world, uploader, config);
        let spawn = find_player_start(&world.entity_string()).unwrap_or([0.0; 3]);
        Self {
            world,
            lightmaps,
            spawn,
        }
    }

    /// Gives back the GPU textures. The world is dropped with `self`.
    pub fn free(self, uploader: &mut dyn TextureUploader) {
        info!("Freeing level {}", self.world.name);
        self.lightmaps.free(uploader);
    }
}

/// Shared slot holding the current level. Readers take an `Arc` snapshot;
/// a new level replaces the old one in a single swap.
#[derive(Debug, Clone, Default)]
pub struct LevelSlot {
    inner: Arc<RwLock<Option<Arc<Level>>>>,
}

impl LevelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current level, if any.
    pub fn current(&self) -> Option<Arc<Level>> {
        self.inner.read().clone()
    }

    /// Installs `level` and returns the one it replaced.
    pub fn install(&self, level: Level) -> Option<Arc<Level>> {
        let level = Arc::new(level);
        info!("Installing level {}", level.world.name);
        self.inner.write().replace(level)
    }

    /// Empties the slot, returning the level that was in it.
    pub fn clear(&self) -> Option<Arc<Level>> {
        self.inner.write().take()
    }
}
