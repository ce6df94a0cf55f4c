// surface.rs — face lightmap extents and polygon building

use sof_common::bsp::{Face, TexInfo, World};
use sof_common::q_shared::{texture_axis_project, SurfaceFlags, Vec3};

use crate::config::LightmapConfig;
use crate::lightmap::{LightmapAtlas, TextureHandle};

/// Lightmap footprint of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceExtents {
    /// Texture-space position of luxel (0, 0): `floor(min / luxel) * luxel`.
    pub texture_mins: [i32; 2],
    /// Width and height in luxels.
    pub luxels: [usize; 2],
}

impl SurfaceExtents {
    #[inline]
    pub fn luxel_count(&self) -> usize {
        self.luxels[0] * self.luxels[1]
    }
}

/// Projects the face winding onto its texture axes and rounds the bounds
/// out to whole luxels. `None` when the face has no edges or a bad
/// texinfo, surfedge, edge or vertex reference.
pub fn calc_surface_extents(
    world: &World,
    face: &Face,
    config: &LightmapConfig,
) -> Option<SurfaceExtents> {
    let tex = world.face_texinfo(face)?;
    if face.num_edges == 0 {
        return None;
    }

    let mut mins = [f32::MAX; 2];
    let mut maxs = [f32::MIN; 2];
    for i in 0..face.num_edges {
        let v = world.face_vertex(face, i)?;
        for j in 0..2 {
            let val = texture_axis_project(&v, &tex.vecs[j]);
            mins[j] = mins[j].min(val);
            maxs[j] = maxs[j].max(val);
        }
    }

    let luxel = i64::try_from(config.luxel_size).ok()?;
    let mut extents = SurfaceExtents {
        texture_mins: [0; 2],
        luxels: [1; 2],
    };
    for i in 0..2 {
        let bmins = luxel_bound(mins[i], luxel, f64::floor)?;
        let bmaxs = luxel_bound(maxs[i], luxel, f64::ceil)?;
        extents.texture_mins[i] = i32::try_from(bmins * luxel).ok()?;
        extents.luxels[i] = ((bmaxs - bmins + 1).max(1) as usize).min(config.max_extent);
    }
    Some(extents)
}

/// `round(v / luxel)` in luxels, or `None` when the matching texel
/// position does not fit an `i32`.
fn luxel_bound(v: f32, luxel: i64, round: fn(f64) -> f64) -> Option<i64> {
    if luxel <= 0 {
        return None;
    }
    let b = round(v as f64 / luxel as f64);
    let limit = (i32::MAX as i64 / luxel) as f64;
    if b.is_nan() || b.abs() > limit {
        return None;
    }
    Some(b as i64)
}

/// Layout of a face's samples in the lighting lump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuxelFormat {
    Rgb,
    /// One byte per luxel, replicated into every channel.
    Grey,
}

impl LuxelFormat {
    /// RGB when `3 * count` bytes are available from `offset`, greyscale
    /// when only `count` are, otherwise `None`.
    pub fn select(lightdata_len: usize, offset: usize, count: usize) -> Option<Self> {
        let fits = |bytes: usize| {
            offset
                .checked_add(bytes)
                .is_some_and(|end| end <= lightdata_len)
        };
        if fits(count.checked_mul(3)?) {
            Some(LuxelFormat::Rgb)
        } else if fits(count) {
            Some(LuxelFormat::Grey)
        } else {
            None
        }
    }

    #[inline]
    pub fn bytes_per_luxel(self) -> usize {
        match self {
            LuxelFormat::Rgb => 3,
            LuxelFormat::Grey => 1,
        }
    }

    /// RGB of luxel `index` in `samples`.
    #[inline]
    pub fn luxel(self, samples: &[u8], index: usize) -> [u8; 3] {
        match self {
            LuxelFormat::Rgb => [samples[index * 3], samples[index * 3 + 1], samples[index * 3 + 2]],
            LuxelFormat::Grey => [samples[index]; 3],
        }
    }
}

// ============================================================
// Polygons
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyVertex {
    pub pos: Vec3,
    /// Texture coordinates in texels; the rasterizer divides by the image size.
    pub st: [f32; 2],
    /// Normalized atlas coordinates, zero when the face has no lightmap.
    pub lightmap: [f32; 2],
}

/// A face as a triangle fan, ready for the rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct FacePolygon {
    pub face: usize,
    pub texture: String,
    pub flags: SurfaceFlags,
    pub lightmap_texture: Option<TextureHandle>,
    pub verts: Vec<PolyVertex>,
}

fn texture_st(pos: &Vec3, tex: &TexInfo) -> [f32; 2] {
    [
        texture_axis_project(pos, &tex.vecs[0]),
        texture_axis_project(pos, &tex.vecs[1]),
    ]
}

/// Builds the fan for `face_index`. `None` for a bad face reference.
pub fn build_face_polygon(
    world: &World,
    atlas: &LightmapAtlas,
    face_index: usize,
) -> Option<FacePolygon> {
    let face = world.faces.get(face_index)?;
    let tex = world.face_texinfo(face)?;
    let winding = world.face_winding(face)?;

    let mut lightmap_texture = None;
    let verts = winding
        .iter()
        .map(|pos| {
            let lightmap = match atlas.face_uv(face_index, pos, tex) {
                Some(uv) => {
                    lightmap_texture = Some(uv.texture);
                    [uv.u, uv.v]
                }
                None => [0.0, 0.0],
            };
            PolyVertex {
                pos: *pos,
                st: texture_st(pos, tex),
                lightmap,
            }
        })
        .collect();

    Some(FacePolygon {
        face: face_index,
        texture: tex.texture.clone(),
        flags: tex.flags,
        lightmap_texture,
        verts,
    })
}
