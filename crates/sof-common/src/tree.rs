// tree.rs — BSP tree point location and cluster visibility queries

use crate::bsp::{Child, World};
use crate::q_shared::{Vec3, CONTENTS_SOLID};
use crate::qfiles::DVIS_PVS;

impl World {
    // ============================================================
    // Point / leaf queries
    // ============================================================

    /// Index of the leaf containing `p`. Points on a plane go to the front
    /// child. A tree with a bad node, plane or leaf reference resolves to
    /// leaf 0, as does an empty tree.
    pub fn point_leaf(&self, p: &Vec3) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut child = Child::Node(0);
        // a well-formed descent visits each node at most once
        for _ in 0..=self.nodes.len() {
            match child {
                Child::Leaf(leaf) => {
                    return if leaf < self.leaves.len() { leaf } else { 0 };
                }
                Child::Node(num) => {
                    let Some(node) = self.nodes.get(num) else {
                        return 0;
                    };
                    let Some(plane) = self.planes.get(node.plane) else {
                        return 0;
                    };
                    child = if plane.distance(p) >= 0.0 {
                        node.children[0]
                    } else {
                        node.children[1]
                    };
                }
            }
        }
        0
    }

    /// Cluster of a leaf, -1 for a leaf outside every cluster or a bad index.
    pub fn leaf_cluster(&self, leaf: usize) -> i32 {
        self.leaves.get(leaf).map_or(-1, |l| l.cluster)
    }

    /// Contents flags at `p`. An empty world is solid.
    pub fn point_contents(&self, p: &Vec3) -> i32 {
        self.leaves
            .get(self.point_leaf(p))
            .map_or(CONTENTS_SOLID, |l| l.contents)
    }

    // ============================================================
    // PVS
    // ============================================================

    /// The potentially visible set row of `cluster`: bit `n` set means
    /// cluster `n` may be visible. `None` when there is no vis data or the
    /// cluster or its offset is out of range.
    pub fn cluster_pvs(&self, cluster: i32) -> Option<&[u8]> {
        let vis = self.vis.as_ref()?;
        let ofs = vis.bitofs.get(usize::try_from(cluster).ok()?)?[DVIS_PVS];
        vis.data.get(usize::try_from(ofs).ok()?..)
    }

    /// Whether `b` may be seen from `a`. Answers `true` whenever there is
    /// nothing to test against: no vis data, a negative cluster, or an id or
    /// offset outside the table.
    pub fn cluster_visible(&self, a: i32, b: i32) -> bool {
        if a < 0 || b < 0 {
            return true;
        }
        let Some(vis) = self.vis.as_ref() else {
            return true;
        };
        if b as usize >= vis.num_clusters {
            return true;
        }
        match self.cluster_pvs(a).and_then(|row| row.get((b >> 3) as usize)) {
            Some(byte) => byte & (1 << (b & 7)) != 0,
            None => true,
        }
    }
}
