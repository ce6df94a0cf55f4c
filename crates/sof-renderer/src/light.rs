// light.rs — world light sampling under a point

use sof_common::bsp::{Child, World};
use sof_common::q_shared::{texture_axis_project, vector_lerp, Vec3};

use crate::config::LightmapConfig;
use crate::lightmap::boost;
use crate::surface::{calc_surface_extents, LuxelFormat};

/// How far below the point to look for a lit floor.
const LIGHT_TRACE_DEPTH: f32 = 2048.0;

const FULLBRIGHT: Vec3 = [1.0, 1.0, 1.0];

/// Lightmap colour of the first lit face straight below `p`, boosted by
/// `config.overbright` and scaled to `0.0..=1.0`. Full bright when the level
/// has no lighting or nothing lit is below.
pub fn light_point(world: &World, p: &Vec3, config: &LightmapConfig) -> Vec3 {
    if world.lightdata.is_empty() || world.nodes.is_empty() {
        return FULLBRIGHT;
    }

    let end = [p[0], p[1], p[2] - LIGHT_TRACE_DEPTH];
    let mut trace = LightTrace {
        world,
        config,
        depth_left: world.nodes.len(),
    };
    match trace.recursive_light_point(Child::Node(0), p, &end) {
        Some(rgb) => rgb.map(|c| boost(c, config.overbright) as f32 / 255.0),
        None => FULLBRIGHT,
    }
}

struct LightTrace<'a> {
    world: &'a World,
    config: &'a LightmapConfig,
    /// Guards against cycles in a malformed tree.
    depth_left: usize,
}

impl LightTrace<'_> {
    fn recursive_light_point(&mut self, child: Child, start: &Vec3, end: &Vec3) -> Option<[u8; 3]> {
        // didn't hit anything
        let Child::Node(num) = child else {
            return None;
        };
        if self.depth_left == 0 {
            return None;
        }
        self.depth_left -= 1;

        let world = self.world;
        let node = world.nodes.get(num)?;
        let plane = world.planes.get(node.plane)?;

        let front = plane.distance(start);
        let back = plane.distance(end);
        let side = usize::from(front < 0.0);

        if (back < 0.0) == (front < 0.0) {
            return self.recursive_light_point(node.children[side], start, end);
        }

        let frac = front / (front - back);
        let mid = vector_lerp(start, end, frac);

        // go down front side
        if let Some(rgb) = self.recursive_light_point(node.children[side], start, &mid) {
            return Some(rgb);
        }

        // check for impact on this node
        for face_index in node.first_face..node.first_face + node.num_faces {
            if let Some(rgb) = self.sample_face(face_index, &mid) {
                return Some(rgb);
            }
        }

        // go down back side
        self.recursive_light_point(node.children[side ^ 1], &mid, end)
    }

    /// Luxel of `face_index` under `point`, if the point lies on its lightmap.
    fn sample_face(&self, face_index: usize, point: &Vec3) -> Option<[u8; 3]> {
        let world = self.world;
        let face = world.faces.get(face_index)?;
        let tex = world.face_texinfo(face)?;
        if !tex.flags.has_lightmap() {
            return None;
        }
        let offset = face.light_offset?;
        let ext = calc_surface_extents(world, face, self.config)?;

        let luxel = i64::try_from(self.config.luxel_size).ok()?;
        let s = texture_axis_project(point, &tex.vecs[0]) as i64;
        let t = texture_axis_project(point, &tex.vecs[1]) as i64;
        let ds = s.checked_sub(ext.texture_mins[0] as i64)?;
        let dt = t.checked_sub(ext.texture_mins[1] as i64)?;
        if ds < 0 || dt < 0 {
            return None;
        }
        let (ds, dt) = ((ds / luxel) as usize, (dt / luxel) as usize);
        let [w, h] = ext.luxels;
        if ds >= w || dt >= h {
            return None;
        }

        let format = LuxelFormat::select(world.lightdata.len(), offset, w * h)?;
        Some(format.luxel(&world.lightdata[offset..], dt * w + ds))
    }
}
