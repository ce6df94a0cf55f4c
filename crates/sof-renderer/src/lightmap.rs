// lightmap.rs — lightmap atlas building: block packing, luxel copy, upload

use log::{debug, info, warn};

use sof_common::bsp::{TexInfo, World};
use sof_common::q_shared::{texture_axis_project, Vec3};

use crate::config::LightmapConfig;
use crate::surface::{calc_surface_extents, LuxelFormat};

// ============================================================
// Texture upload seam
// ============================================================

pub type TextureHandle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// Receives finished atlas blocks. Implemented by the rasterizer backend.
pub trait TextureUploader {
    fn upload(&mut self, width: usize, height: usize, format: PixelFormat, pixels: &[u8]) -> TextureHandle;
    fn release(&mut self, handle: TextureHandle);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedTexture {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

/// Keeps uploaded textures in memory. Handles start at 1.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    pub textures: Vec<Option<UploadedTexture>>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&UploadedTexture> {
        let slot = (handle as usize).checked_sub(1)?;
        self.textures.get(slot)?.as_ref()
    }

    /// Textures uploaded and not yet released.
    pub fn live(&self) -> usize {
        self.textures.iter().filter(|t| t.is_some()).count()
    }
}

impl TextureUploader for MemoryUploader {
    fn upload(&mut self, width: usize, height: usize, format: PixelFormat, pixels: &[u8]) -> TextureHandle {
        self.textures.push(Some(UploadedTexture {
            width,
            height,
            format,
            pixels: pixels.to_vec(),
        }));
        self.textures.len() as TextureHandle
    }

    fn release(&mut self, handle: TextureHandle) {
        if let Some(slot) = (handle as usize)
            .checked_sub(1)
            .and_then(|i| self.textures.get_mut(i))
        {
            *slot = None;
        }
    }
}

// ============================================================
// LIGHTMAP ALLOCATION
// ============================================================

/// Pixel layout of every atlas block.
pub const BLOCK_FORMAT: PixelFormat = PixelFormat::Rgb8;

/// One atlas block: per-column fill height and the RGB pixel buffer.
#[derive(Debug, Clone)]
pub struct LightmapBlock {
    width: usize,
    height: usize,
    allocated: Vec<usize>,
    buffer: Vec<u8>,
}

impl LightmapBlock {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            allocated: vec![0; width],
            buffer: vec![0; width * height * BLOCK_FORMAT.bytes_per_pixel()],
        }
    }

    pub fn reset(&mut self) {
        self.allocated.iter_mut().for_each(|a| *a = 0);
        self.buffer.iter_mut().for_each(|b| *b = 0);
    }

    /// Finds room for a `w` x `h` rectangle: the lowest placement across all
    /// start columns, leftmost on ties.
    pub fn alloc(&mut self, w: usize, h: usize) -> Option<(usize, usize)> {
        if w == 0 || h == 0 || w > self.width || h > self.height {
            return None;
        }

        let mut best = self.height;
        let mut x = 0;
        for i in 0..=self.width - w {
            let mut best2 = 0;
            let mut fits = true;
            for &col in &self.allocated[i..i + w] {
                if col >= best {
                    fits = false;
                    break;
                }
                best2 = best2.max(col);
            }
            if fits {
                // this is a valid spot
                x = i;
                best = best2;
            }
        }

        if best + h > self.height {
            return None;
        }

        for col in &mut self.allocated[x..x + w] {
            *col = best + h;
        }
        Some((x, best))
    }

    /// Tallest column, i.e. the used height of the block.
    pub fn used_height(&self) -> usize {
        self.allocated.iter().copied().max().unwrap_or(0)
    }

    /// Copies `w` x `h` luxels into the block at `(x, y)`, scaling each
    /// channel by `overbright` and saturating at 255.
    fn write_luxels(
        &mut self,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        format: LuxelFormat,
        samples: &[u8],
        overbright: u32,
    ) {
        let bpp = BLOCK_FORMAT.bytes_per_pixel();
        let stride = self.width * bpp;
        for row in 0..h {
            let dest = &mut self.buffer[(y + row) * stride + x * bpp..][..w * bpp];
            for col in 0..w {
                let rgb = format.luxel(samples, row * w + col);
                for (c, &v) in rgb.iter().enumerate() {
                    dest[col * bpp + c] = boost(v, overbright);
                }
            }
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }
}

/// `v * scale`, saturating at 255.
#[inline]
pub fn boost(v: u8, scale: u32) -> u8 {
    (v as u32 * scale).min(255) as u8
}

// ============================================================
// Atlas
// ============================================================

/// Where a face's lightmap lives in the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceLightmap {
    pub block: usize,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// Texture-space origin of the face lightmap.
    pub s_offset: i32,
    pub t_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightmapUv {
    pub texture: TextureHandle,
    pub u: f32,
    pub v: f32,
}

/// All lightmap blocks of one level plus each face's placement.
#[derive(Debug, Clone, Default)]
pub struct LightmapAtlas {
    pub block_width: usize,
    pub block_height: usize,
    pub luxel_size: usize,
    /// Uploaded block textures, indexed by `FaceLightmap::block`.
    pub textures: Vec<TextureHandle>,
    /// Per world face; `None` for faces without a lightmap.
    pub faces: Vec<Option<FaceLightmap>>,
}

impl LightmapAtlas {
    pub fn face(&self, face: usize) -> Option<&FaceLightmap> {
        self.faces.get(face)?.as_ref()
    }

    /// Atlas texture and coordinates of world point `point` on `face`.
    /// `None` when the face has no lightmap.
    pub fn face_uv(&self, face: usize, point: &Vec3, tex: &TexInfo) -> Option<LightmapUv> {
        let lm = self.face(face)?;
        let texture = *self.textures.get(lm.block)?;
        let luxel = self.luxel_size as f32;

        let s = texture_axis_project(point, &tex.vecs[0]);
        let t = texture_axis_project(point, &tex.vecs[1]);
        let ls = (s - lm.s_offset as f32) / luxel + 0.5;
        let lt = (t - lm.t_offset as f32) / luxel + 0.5;

        Some(LightmapUv {
            texture,
            u: (lm.x as f32 + ls) / self.block_width as f32,
            v: (lm.y as f32 + lt) / self.block_height as f32,
        })
    }

    pub fn lit_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.is_some()).count()
    }

    /// Releases every block texture.
    pub fn free(self, uploader: &mut dyn TextureUploader) {
        for handle in self.textures {
            uploader.release(handle);
        }
    }
}

// ============================================================
// Builder
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Filling the current block.
    Packing,
    /// Current block is full; upload it and start another.
    Finalizing,
    /// Block limit reached; remaining faces get no lightmap.
    Exhausted,
}

/// Why a face got no lightmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unlit,
    NoLightmapFlags,
    BadReference,
    NotEnoughSamples,
    TooLarge,
    Exhausted,
}

/// Packs face lightmaps into blocks, one level at a time.
pub struct LightmapBuilder<'u> {
    config: LightmapConfig,
    uploader: &'u mut dyn TextureUploader,
    block: LightmapBlock,
    state: BuildState,
    textures: Vec<TextureHandle>,
    faces: Vec<Option<FaceLightmap>>,
    exhausted_skips: usize,
}

impl<'u> LightmapBuilder<'u> {
    pub fn new(config: &LightmapConfig, uploader: &'u mut dyn TextureUploader) -> Self {
        Self {
            config: config.clone(),
            uploader,
            block: LightmapBlock::new(config.block_width, config.block_height),
            state: BuildState::Packing,
            textures: Vec::new(),
            faces: Vec::new(),
            exhausted_skips: 0,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Uploads the current block and starts a fresh one, or enters
    /// `Exhausted` when no more blocks may be started.
    fn finalize_block(&mut self) {
        let handle = self.uploader.upload(
            self.config.block_width,
            self.config.block_height,
            BLOCK_FORMAT,
            self.block.pixels(),
        );
        debug!(
            "lightmap block {} uploaded ({} rows used)",
            self.textures.len(),
            self.block.used_height()
        );
        self.textures.push(handle);
        self.block.reset();

        self.state = if self.textures.len() >= self.config.max_blocks {
            warn!("MAX_LIGHTMAPS ({}) exceeded", self.config.max_blocks);
            BuildState::Exhausted
        } else {
            BuildState::Packing
        };
    }

    /// Places face `index` of `world` in the atlas.
    pub fn add_face(&mut self, world: &World, index: usize) -> Result<FaceLightmap, SkipReason> {
        let face = world.faces.get(index).ok_or(SkipReason::BadReference)?;
        let offset = face.light_offset.ok_or(SkipReason::Unlit)?;
        let tex = world.face_texinfo(face).ok_or(SkipReason::BadReference)?;
        if !tex.flags.has_lightmap() {
            return Err(SkipReason::NoLightmapFlags);
        }
        let ext = calc_surface_extents(world, face, &self.config).ok_or(SkipReason::BadReference)?;
        let [w, h] = ext.luxels;

        let format = LuxelFormat::select(world.lightdata.len(), offset, w * h)
            .ok_or(SkipReason::NotEnoughSamples)?;
        if w > self.config.block_width || h > self.config.block_height {
            return Err(SkipReason::TooLarge);
        }

        let (x, y) = loop {
            match self.state {
                BuildState::Exhausted => return Err(SkipReason::Exhausted),
                BuildState::Packing => match self.block.alloc(w, h) {
                    Some(pos) => break pos,
                    None => self.state = BuildState::Finalizing,
                },
                BuildState::Finalizing => {
                    self.finalize_block();
                    if self.state == BuildState::Packing {
                        // a fresh block is the last chance
                        match self.block.alloc(w, h) {
                            Some(pos) => break pos,
                            None => return Err(SkipReason::TooLarge),
                        }
                    }
                }
            }
        };

        let samples = &world.lightdata[offset..offset + w * h * format.bytes_per_luxel()];
        self.block
            .write_luxels(x, y, w, h, format, samples, self.config.overbright);

        Ok(FaceLightmap {
            block: self.textures.len(),
            x,
            y,
            width: w,
            height: h,
            s_offset: ext.texture_mins[0],
            t_offset: ext.texture_mins[1],
        })
    }

    /// Runs every face of `world` through the builder.
    pub fn add_world(&mut self, world: &World) {
        self.faces = vec![None; world.faces.len()];
        for index in 0..world.faces.len() {
            match self.add_face(world, index) {
                Ok(lm) => self.faces[index] = Some(lm),
                Err(SkipReason::Exhausted) => self.exhausted_skips += 1,
                Err(SkipReason::TooLarge) => {
                    warn!("face {}: lightmap too large for an empty block", index)
                }
                Err(SkipReason::NotEnoughSamples) => {
                    warn!("face {}: lighting lump too short for its lightmap", index)
                }
                Err(SkipReason::BadReference) => debug!("face {}: bad reference, skipped", index),
                Err(SkipReason::Unlit | SkipReason::NoLightmapFlags) => {}
            }
        }
    }

    /// Uploads the block in progress, even an empty one, and hands back the
    /// atlas.
    pub fn finish(mut self) -> LightmapAtlas {
        if self.state != BuildState::Exhausted {
            self.finalize_block();
        }
        if self.exhausted_skips > 0 {
            warn!("{} faces left without lightmaps: MAX_LIGHTMAPS reached", self.exhausted_skips);
        }
        LightmapAtlas {
            block_width: self.config.block_width,
            block_height: self.config.block_height,
            luxel_size: self.config.luxel_size,
            textures: self.textures,
            faces: self.faces,
        }
    }
}

/// Builds the lightmap atlas for a freshly loaded world.
pub fn build_lightmaps(
    world: &World,
    uploader: &mut dyn TextureUploader,
    config: &LightmapConfig,
) -> LightmapAtlas {
    let mut builder = LightmapBuilder::new(config, uploader);
    builder.add_world(world);
    let atlas = builder.finish();
    info!(
        "{}: {} lightmapped faces in {} blocks",
        world.name,
        atlas.lit_faces(),
        atlas.textures.len()
    );
    atlas
}
