// config.rs — renderer settings (the r_* / vk_* cvars as plain fields)

/// Lightmap atlas limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightmapConfig {
    /// Atlas block size in luxels.
    pub block_width: usize,
    pub block_height: usize,
    /// Most blocks a level may use.
    pub max_blocks: usize,
    /// World units per luxel.
    pub luxel_size: usize,
    /// Largest face lightmap side, in luxels.
    pub max_extent: usize,
    /// Luxel multiplier applied while copying, saturating at 255.
    pub overbright: u32,
}

impl Default for LightmapConfig {
    fn default() -> Self {
        Self {
            block_width: 512,
            block_height: 512,
            max_blocks: 64,
            luxel_size: 16,
            max_extent: 256,
            overbright: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererConfig {
    pub lightmap: LightmapConfig,
    /// r_novis: ignore the PVS and draw every face.
    pub novis: bool,
}
