// q_shared.rs — math types, contents and surface flags shared by all crates

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

// ============================================================
// Contents flags
// ============================================================

pub const CONTENTS_EMPTY: i32 = 0;
pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WATER: i32 = 32;

// ============================================================
// Surface flags (texinfo)
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SurfaceFlags: i32 {
        /// Value holds a light strength.
        const LIGHT    = 0x1;
        const SLICK    = 0x2;
        /// Don't draw, but add to skybox.
        const SKY      = 0x4;
        /// Turbulent water warp.
        const WARP     = 0x8;
        const TRANS33  = 0x10;
        const TRANS66  = 0x20;
        /// Scroll towards angle.
        const FLOWING  = 0x40;
        /// Don't bother referencing the texture.
        const NODRAW   = 0x80;
    }
}

impl SurfaceFlags {
    /// Surfaces that never carry a lightmap.
    pub const NO_LIGHTMAP: SurfaceFlags = SurfaceFlags::SKY
        .union(SurfaceFlags::WARP)
        .union(SurfaceFlags::NODRAW);

    #[inline]
    pub fn has_lightmap(self) -> bool {
        !self.intersects(Self::NO_LIGHTMAP)
    }
}

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_lerp(a: &Vec3, b: &Vec3, frac: f32) -> Vec3 {
    [
        a[0] + (b[0] - a[0]) * frac,
        a[1] + (b[1] - a[1]) * frac,
        a[2] + (b[2] - a[2]) * frac,
    ]
}

/// Projects `v` onto one texinfo axis `[x, y, z, offset]`.
#[inline]
pub fn texture_axis_project(v: &Vec3, axis: &[f32; 4]) -> f32 {
    v[0] * axis[0] + v[1] * axis[1] + v[2] * axis[2] + axis[3]
}
