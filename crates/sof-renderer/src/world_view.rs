// world_view.rs — per-frame visible face list from the camera's PVS

use log::debug;

use sof_common::bsp::World;
use sof_common::q_shared::Vec3;

/// Collects the faces to draw for a camera position. Owns its scratch
/// buffers so a frame allocates nothing once they have grown.
#[derive(Debug, Default)]
pub struct VisibleFaceAssembler {
    /// r_novis
    pub novis: bool,
    emitted: Vec<bool>,
    faces: Vec<usize>,
    view_cluster: i32,
}

impl VisibleFaceAssembler {
    pub fn new(novis: bool) -> Self {
        Self {
            novis,
            view_cluster: -1,
            ..Default::default()
        }
    }

    /// Cluster of the camera in the last call.
    pub fn view_cluster(&self) -> i32 {
        self.view_cluster
    }

    /// Every face in a leaf potentially visible from `camera`, each once,
    /// in leaf order. Without vis data (or with `novis`) every face is
    /// returned. Leaves outside all clusters are always included.
    pub fn visible_faces(&mut self, world: &World, camera: &Vec3) -> &[usize] {
        let num_faces = world.faces.len();
        self.faces.clear();
        self.emitted.clear();
        self.emitted.resize(num_faces, false);

        let leaf = world.point_leaf(camera);
        self.view_cluster = world.leaf_cluster(leaf);

        if self.novis || world.vis.is_none() || world.leaf_faces.is_empty() {
            self.faces.extend(0..num_faces);
            return &self.faces;
        }

        let mut bad = 0usize;
        for leaf in &world.leaves {
            if leaf.cluster != -1 && !world.cluster_visible(self.view_cluster, leaf.cluster) {
                continue;
            }
            let marks = leaf
                .first_leaf_face
                .checked_add(leaf.num_leaf_faces)
                .and_then(|end| world.leaf_faces.get(leaf.first_leaf_face..end));
            let Some(marks) = marks else {
                bad += 1;
                continue;
            };
            for &mark in marks {
                let face = mark as usize;
                match self.emitted.get_mut(face) {
                    Some(seen) if !*seen => {
                        *seen = true;
                        self.faces.push(face);
                    }
                    Some(_) => {}
                    None => bad += 1,
                }
            }
        }
        if bad > 0 {
            debug!("visible_faces: skipped {} bad leaf face references", bad);
        }

        &self.faces
    }
}
