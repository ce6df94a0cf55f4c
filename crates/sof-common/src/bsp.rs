// bsp.rs — world model: runtime BSP structures and the lump loader

use std::borrow::Cow;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian as LE};
use log::info;
use rayon::prelude::*;

use crate::error::LoadError;
use crate::files::FileReader;
use crate::q_shared::{dot_product, SurfaceFlags, Vec3};
use crate::qfiles::{
    lump_element_size, read_short3, read_vec3, DHeader, LumpRecord, LUMP_AREAPORTALS, LUMP_AREAS,
    LUMP_BRUSHES, LUMP_BRUSHSIDES, LUMP_EDGES, LUMP_ENTITIES, LUMP_FACES, LUMP_LEAFBRUSHES,
    LUMP_LEAFFACES, LUMP_LEAFS, LUMP_LIGHTING, LUMP_MODELS, LUMP_NODES, LUMP_PLANES,
    LUMP_SURFEDGES, LUMP_TEXINFO, LUMP_VERTEXES, LUMP_VISIBILITY, MAXLIGHTMAPS, PLANE_X, PLANE_Z,
    TEXINFO_NAME_LEN,
};

/// Below this record count sequential decoding is faster.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

/// Converts an on-disk signed index. Negative values become an index that
/// is out of range for every array, so lookups fail with `None`.
#[inline]
fn index(v: i32) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

// ============================================================
// Runtime structures
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    /// 0..2 for axial planes, used as a fast path.
    pub plane_type: i32,
}

impl Plane {
    /// Signed distance of `p` from the plane. The axial fast path is only
    /// taken when the normal really is that unit axis.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        match self.plane_type {
            t @ PLANE_X..=PLANE_Z if self.normal[t as usize] == 1.0 => {
                p[t as usize] - self.dist
            }
            _ => dot_product(&self.normal, p) - self.dist,
        }
    }
}

impl LumpRecord for Plane {
    const SIZE: usize = 20;

    fn decode(b: &[u8]) -> Self {
        Self {
            normal: read_vec3(b),
            dist: LE::read_f32(&b[12..]),
            plane_type: LE::read_i32(&b[16..]),
        }
    }
}

impl LumpRecord for Vec3 {
    const SIZE: usize = 12;

    fn decode(b: &[u8]) -> Self {
        read_vec3(b)
    }
}

/// A node child: another node, or a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Node(usize),
    Leaf(usize),
}

impl Child {
    /// Negative on-disk children are leaves: `-(c + 1)`.
    #[inline]
    pub fn from_disk(c: i32) -> Self {
        if c < 0 {
            Child::Leaf((-(c as i64 + 1)) as usize)
        } else {
            Child::Node(c as usize)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub plane: usize,
    pub children: [Child; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_face: usize,
    pub num_faces: usize,
}

impl LumpRecord for Node {
    const SIZE: usize = 28;

    fn decode(b: &[u8]) -> Self {
        Self {
            plane: index(LE::read_i32(b)),
            children: [
                Child::from_disk(LE::read_i32(&b[4..])),
                Child::from_disk(LE::read_i32(&b[8..])),
            ],
            mins: read_short3(&b[12..]),
            maxs: read_short3(&b[18..]),
            first_face: LE::read_u16(&b[24..]) as usize,
            num_faces: LE::read_u16(&b[26..]) as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TexInfo {
    /// `[s, t]` projection axes, `[x, y, z, offset]` each.
    pub vecs: [[f32; 4]; 2],
    pub flags: SurfaceFlags,
    /// Light emission, checked by the light tool.
    pub value: i32,
    pub texture: String,
    /// Next frame of an animated texture.
    pub next: Option<usize>,
}

impl Default for TexInfo {
    fn default() -> Self {
        Self {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            flags: SurfaceFlags::empty(),
            value: 0,
            texture: String::new(),
            next: None,
        }
    }
}

impl LumpRecord for TexInfo {
    const SIZE: usize = 76;

    fn decode(b: &[u8]) -> Self {
        let mut vecs = [[0.0f32; 4]; 2];
        for (i, axis) in vecs.iter_mut().enumerate() {
            for (j, v) in axis.iter_mut().enumerate() {
                *v = LE::read_f32(&b[(i * 4 + j) * 4..]);
            }
        }
        let raw = &b[40..40 + TEXINFO_NAME_LEN];
        let name_end = raw.iter().position(|&c| c == 0).unwrap_or(TEXINFO_NAME_LEN);
        let next = LE::read_i32(&b[72..]);
        Self {
            vecs,
            flags: SurfaceFlags::from_bits_retain(LE::read_i32(&b[32..])),
            value: LE::read_i32(&b[36..]),
            texture: String::from_utf8_lossy(&raw[..name_end]).into_owned(),
            next: (next >= 0).then_some(next as usize),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub plane: usize,
    /// Face is on the back of its plane.
    pub side: bool,
    pub first_edge: usize,
    pub num_edges: usize,
    pub texinfo: usize,
    pub styles: [u8; MAXLIGHTMAPS],
    /// Byte offset into the lighting lump, `None` when unlit.
    pub light_offset: Option<usize>,
}

impl Default for Face {
    fn default() -> Self {
        Self {
            plane: 0,
            side: false,
            first_edge: 0,
            num_edges: 0,
            texinfo: 0,
            styles: [0, 255, 255, 255],
            light_offset: None,
        }
    }
}

impl LumpRecord for Face {
    const SIZE: usize = 20;

    fn decode(b: &[u8]) -> Self {
        let mut styles = [0u8; MAXLIGHTMAPS];
        styles.copy_from_slice(&b[12..16]);
        let lightofs = LE::read_i32(&b[16..]);
        Self {
            plane: LE::read_u16(b) as usize,
            side: LE::read_i16(&b[2..]) != 0,
            first_edge: index(LE::read_i32(&b[4..])),
            num_edges: index(LE::read_i16(&b[8..]) as i32),
            texinfo: index(LE::read_i16(&b[10..]) as i32),
            styles,
            light_offset: (lightofs >= 0).then_some(lightofs as usize),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub contents: i32,
    /// -1 = not in any cluster
    pub cluster: i32,
    pub area: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_leaf_face: usize,
    pub num_leaf_faces: usize,
    pub first_leaf_brush: usize,
    pub num_leaf_brushes: usize,
}

impl Default for Leaf {
    fn default() -> Self {
        Self {
            contents: 0,
            cluster: -1,
            area: 0,
            mins: [0; 3],
            maxs: [0; 3],
            first_leaf_face: 0,
            num_leaf_faces: 0,
            first_leaf_brush: 0,
            num_leaf_brushes: 0,
        }
    }
}

impl LumpRecord for Leaf {
    const SIZE: usize = 28;

    fn decode(b: &[u8]) -> Self {
        Self {
            contents: LE::read_i32(b),
            cluster: LE::read_i16(&b[4..]) as i32,
            area: LE::read_i16(&b[6..]) as i32,
            mins: read_short3(&b[8..]),
            maxs: read_short3(&b[14..]),
            first_leaf_face: LE::read_u16(&b[20..]) as usize,
            num_leaf_faces: LE::read_u16(&b[22..]) as usize,
            first_leaf_brush: LE::read_u16(&b[24..]) as usize,
            num_leaf_brushes: LE::read_u16(&b[26..]) as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub v: [usize; 2],
}

impl LumpRecord for Edge {
    const SIZE: usize = 4;

    fn decode(b: &[u8]) -> Self {
        Self {
            v: [LE::read_u16(b) as usize, LE::read_u16(&b[2..]) as usize],
        }
    }
}

/// Signed edge reference: walk `edge` backwards when `reversed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfEdge {
    pub edge: usize,
    pub reversed: bool,
}

impl SurfEdge {
    /// Index into `edge.v` of the vertex that starts this edge.
    #[inline]
    pub fn first_vertex(&self, edge: &Edge) -> usize {
        edge.v[self.reversed as usize]
    }
}

impl LumpRecord for SurfEdge {
    const SIZE: usize = 4;

    fn decode(b: &[u8]) -> Self {
        let v = LE::read_i32(b);
        Self {
            edge: v.unsigned_abs() as usize,
            reversed: v < 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub head_node: i32,
    pub first_face: usize,
    pub num_faces: usize,
}

impl LumpRecord for Model {
    const SIZE: usize = 48;

    fn decode(b: &[u8]) -> Self {
        Self {
            mins: read_vec3(b),
            maxs: read_vec3(&b[12..]),
            origin: read_vec3(&b[24..]),
            head_node: LE::read_i32(&b[36..]),
            first_face: index(LE::read_i32(&b[40..])),
            num_faces: index(LE::read_i32(&b[44..])),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brush {
    pub first_side: usize,
    pub num_sides: usize,
    pub contents: i32,
}

impl LumpRecord for Brush {
    const SIZE: usize = 12;

    fn decode(b: &[u8]) -> Self {
        Self {
            first_side: index(LE::read_i32(b)),
            num_sides: index(LE::read_i32(&b[4..])),
            contents: LE::read_i32(&b[8..]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushSide {
    pub plane: usize,
    pub texinfo: Option<usize>,
}

impl LumpRecord for BrushSide {
    const SIZE: usize = 4;

    fn decode(b: &[u8]) -> Self {
        let texinfo = LE::read_i16(&b[2..]);
        Self {
            plane: LE::read_u16(b) as usize,
            texinfo: (texinfo >= 0).then_some(texinfo as usize),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub num_area_portals: usize,
    pub first_area_portal: usize,
}

impl LumpRecord for Area {
    const SIZE: usize = 8;

    fn decode(b: &[u8]) -> Self {
        Self {
            num_area_portals: index(LE::read_i32(b)),
            first_area_portal: index(LE::read_i32(&b[4..])),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaPortal {
    pub portal_num: i32,
    pub other_area: i32,
}

impl LumpRecord for AreaPortal {
    const SIZE: usize = 8;

    fn decode(b: &[u8]) -> Self {
        Self {
            portal_num: LE::read_i32(b),
            other_area: LE::read_i32(&b[4..]),
        }
    }
}

/// The visibility lump. Offsets in `bitofs` are relative to the start of `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    pub num_clusters: usize,
    /// `[pvs, phs]` byte offset per cluster.
    pub bitofs: Vec<[i32; 2]>,
    pub data: Vec<u8>,
}

impl Visibility {
    /// `None` for an empty lump or a negative cluster count. A table shorter
    /// than the cluster count keeps the entries that fit.
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let declared = usize::try_from(LE::read_i32(data)).ok()?;
        let num_clusters = declared.min((data.len() - 4) / 8);
        let bitofs = data[4..4 + num_clusters * 8]
            .chunks_exact(8)
            .map(|c| [LE::read_i32(c), LE::read_i32(&c[4..])])
            .collect();
        Some(Self {
            num_clusters,
            bitofs,
            data: data.to_vec(),
        })
    }
}

// ============================================================
// World
// ============================================================

/// A loaded level. Immutable after load and dropped as a whole.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub name: String,
    pub planes: Vec<Plane>,
    pub vertices: Vec<Vec3>,
    pub edges: Vec<Edge>,
    pub surfedges: Vec<SurfEdge>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<Face>,
    pub nodes: Vec<Node>,
    pub leaves: Vec<Leaf>,
    pub leaf_faces: Vec<u16>,
    pub leaf_brushes: Vec<u16>,
    pub models: Vec<Model>,
    pub brushes: Vec<Brush>,
    pub brush_sides: Vec<BrushSide>,
    pub areas: Vec<Area>,
    pub area_portals: Vec<AreaPortal>,
    pub vis: Option<Visibility>,
    pub lightdata: Vec<u8>,
    /// Entity text with a trailing NUL.
    pub entity_data: Vec<u8>,
}

/// Decodes every record of a lump, in parallel for large lumps.
fn decode_lump<T: LumpRecord>(bytes: &[u8]) -> Vec<T> {
    if bytes.len() / T::SIZE >= PARALLEL_LUMP_THRESHOLD {
        bytes.par_chunks_exact(T::SIZE).map(T::decode).collect()
    } else {
        bytes.chunks_exact(T::SIZE).map(T::decode).collect()
    }
}

impl World {
    /// Reads `name` through `fs` and parses it.
    pub fn load(fs: &dyn FileReader, name: &str) -> Result<World, LoadError> {
        let data = fs.read_file(name)?;
        Self::from_bytes(name, &data)
    }

    /// Parses a complete IBSP v38 image.
    pub fn from_bytes(name: &str, data: &[u8]) -> Result<World, LoadError> {
        let header = DHeader::parse(data)?;

        let lump = |index: usize| header.lump_bytes(data, index);
        fn records<T: LumpRecord>(lump: usize, bytes: &[u8]) -> Vec<T> {
            debug_assert_eq!(T::SIZE, lump_element_size(lump));
            decode_lump(bytes)
        }

        let mut entity_data = lump(LUMP_ENTITIES)?.to_vec();
        entity_data.push(0);

        let world = World {
            name: name.to_string(),
            planes: records(LUMP_PLANES, lump(LUMP_PLANES)?),
            vertices: records(LUMP_VERTEXES, lump(LUMP_VERTEXES)?),
            edges: records(LUMP_EDGES, lump(LUMP_EDGES)?),
            surfedges: records(LUMP_SURFEDGES, lump(LUMP_SURFEDGES)?),
            texinfo: records(LUMP_TEXINFO, lump(LUMP_TEXINFO)?),
            faces: records(LUMP_FACES, lump(LUMP_FACES)?),
            nodes: records(LUMP_NODES, lump(LUMP_NODES)?),
            leaves: records(LUMP_LEAFS, lump(LUMP_LEAFS)?),
            leaf_faces: records(LUMP_LEAFFACES, lump(LUMP_LEAFFACES)?),
            leaf_brushes: records(LUMP_LEAFBRUSHES, lump(LUMP_LEAFBRUSHES)?),
            models: records(LUMP_MODELS, lump(LUMP_MODELS)?),
            brushes: records(LUMP_BRUSHES, lump(LUMP_BRUSHES)?),
            brush_sides: records(LUMP_BRUSHSIDES, lump(LUMP_BRUSHSIDES)?),
            areas: records(LUMP_AREAS, lump(LUMP_AREAS)?),
            area_portals: records(LUMP_AREAPORTALS, lump(LUMP_AREAPORTALS)?),
            vis: Visibility::parse(lump(LUMP_VISIBILITY)?),
            lightdata: lump(LUMP_LIGHTING)?.to_vec(),
            entity_data,
        };

        info!("Loaded {}: {}", name, world.summary());
        Ok(world)
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            planes: self.planes.len(),
            vertices: self.vertices.len(),
            nodes: self.nodes.len(),
            leaves: self.leaves.len(),
            faces: self.faces.len(),
            texinfo: self.texinfo.len(),
            models: self.models.len(),
            brushes: self.brushes.len(),
            clusters: self.num_clusters(),
            lightdata: self.lightdata.len(),
            entity_chars: self.entity_data.len().saturating_sub(1),
        }
    }

    /// Entity text without the terminator.
    pub fn entity_string(&self) -> Cow<'_, str> {
        let end = self
            .entity_data
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.entity_data.len());
        String::from_utf8_lossy(&self.entity_data[..end])
    }

    pub fn num_clusters(&self) -> usize {
        self.vis.as_ref().map_or(0, |v| v.num_clusters)
    }

    /// Resolves an inline brush model name ("*1", "*2", ...). Model 0 is the
    /// world itself and has no inline name.
    pub fn inline_model(&self, name: &str) -> Option<&Model> {
        let num: usize = name.strip_prefix('*')?.parse().ok()?;
        if num == 0 {
            return None;
        }
        self.models.get(num)
    }

    pub fn face_texinfo(&self, face: &Face) -> Option<&TexInfo> {
        self.texinfo.get(face.texinfo)
    }

    /// Vertex `i` of a face's winding.
    pub fn face_vertex(&self, face: &Face, i: usize) -> Option<Vec3> {
        let se = self.surfedges.get(face.first_edge.checked_add(i)?)?;
        let edge = self.edges.get(se.edge)?;
        self.vertices.get(se.first_vertex(edge)).copied()
    }

    /// The full winding of a face, or `None` if any surfedge, edge or
    /// vertex reference is out of range.
    pub fn face_winding(&self, face: &Face) -> Option<Vec<Vec3>> {
        (0..face.num_edges)
            .map(|i| self.face_vertex(face, i))
            .collect()
    }

    /// Distinct texture names in texinfo order.
    pub fn texture_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for ti in &self.texinfo {
            if !names.contains(&ti.texture.as_str()) {
                names.push(&ti.texture);
            }
        }
        names
    }
}

/// Lump counts of a loaded world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldSummary {
    pub planes: usize,
    pub vertices: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub faces: usize,
    pub texinfo: usize,
    pub models: usize,
    pub brushes: usize,
    pub clusters: usize,
    pub lightdata: usize,
    pub entity_chars: usize,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} planes, {} verts, {} nodes, {} leafs, {} faces, {} texinfo, {} models, \
             {} brushes, {} clusters, {} bytes lighting, {} entity chars",
            self.planes,
            self.vertices,
            self.nodes,
            self.leaves,
            self.faces,
            self.texinfo,
            self.models,
            self.brushes,
            self.clusters,
            self.lightdata,
            self.entity_chars
        )
    }
}

// ============================================================
// Test helpers
// ============================================================

/// Builds IBSP images in memory for loader tests.
#[cfg(test)]
pub(crate) mod testbsp {
    use crate::qfiles::{BSP_HEADER_SIZE, HEADER_LUMPS};

    #[derive(Default)]
    pub struct BspImage {
        lumps: Vec<Vec<u8>>,
    }

    impl BspImage {
        pub fn new() -> Self {
            Self {
                lumps: vec![Vec::new(); HEADER_LUMPS],
            }
        }

        pub fn lump(mut self, index: usize, bytes: Vec<u8>) -> Self {
            self.lumps[index] = bytes;
            self
        }

        pub fn build(&self) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(b"IBSP");
            out.extend_from_slice(&38i32.to_le_bytes());
            let mut ofs = BSP_HEADER_SIZE;
            for l in &self.lumps {
                out.extend_from_slice(&(ofs as i32).to_le_bytes());
                out.extend_from_slice(&(l.len() as i32).to_le_bytes());
                ofs += l.len();
            }
            for l in &self.lumps {
                out.extend_from_slice(l);
            }
            out
        }
    }

    /// Little-endian record writer.
    #[derive(Default)]
    pub struct Rec(pub Vec<u8>);

    impl Rec {
        pub fn i32(mut self, v: i32) -> Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn i16(mut self, v: i16) -> Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn u16(mut self, v: u16) -> Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn f32(mut self, v: f32) -> Self {
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn bytes(mut self, v: &[u8]) -> Self {
            self.0.extend_from_slice(v);
            self
        }
        pub fn i32s(self, vs: &[i32]) -> Self {
            vs.iter().fold(self, |r, &v| r.i32(v))
        }
        pub fn u16s(self, vs: &[u16]) -> Self {
            vs.iter().fold(self, |r, &v| r.u16(v))
        }
        pub fn f32s(self, vs: &[f32]) -> Self {
            vs.iter().fold(self, |r, &v| r.f32(v))
        }
    }

    pub fn plane(normal: [f32; 3], dist: f32, plane_type: i32) -> Vec<u8> {
        Rec::default().f32s(&normal).f32(dist).i32(plane_type).0
    }

    pub fn node(plane: i32, front: i32, back: i32) -> Vec<u8> {
        // mins/maxs as six zero shorts
        Rec::default()
            .i32s(&[plane, front, back])
            .bytes(&[0; 12])
            .u16s(&[0, 0])
            .0
    }

    pub fn leaf(contents: i32, cluster: i16, first_face: u16, num_faces: u16) -> Vec<u8> {
        Rec::default()
            .i32(contents)
            .i16(cluster)
            .i16(0)
            .bytes(&[0; 12])
            .u16s(&[first_face, num_faces, 0, 0])
            .0
    }
}

#[cfg(test)]
mod tests {
    use super::testbsp::{leaf, node, plane, BspImage, Rec};
    use super::*;
    use crate::error::FsError;
    use crate::qfiles::BSP_HEADER_SIZE;
    use std::collections::HashMap;

    /// Two leaves split by the plane x = 0.
    fn two_leaf_image() -> BspImage {
        BspImage::new()
            .lump(LUMP_PLANES, plane([1.0, 0.0, 0.0], 0.0, 0))
            .lump(LUMP_NODES, node(0, -1, -2))
            .lump(
                LUMP_LEAFS,
                [leaf(0, 0, 0, 0), leaf(1, 1, 0, 0)].concat(),
            )
    }

    #[test]
    fn test_load_two_leaf_world() {
        let data = two_leaf_image().build();
        let world = World::from_bytes("maps/test.bsp", &data).unwrap();
        assert_eq!(world.name, "maps/test.bsp");
        assert_eq!(world.planes.len(), 1);
        assert_eq!(world.nodes.len(), 1);
        assert_eq!(world.leaves.len(), 2);
        assert_eq!(world.nodes[0].children, [Child::Leaf(0), Child::Leaf(1)]);
        assert_eq!(world.leaves[1].contents, 1);
        assert!(world.vis.is_none());
        assert!(world.faces.is_empty());
    }

    #[test]
    fn test_lump_counts_match_lengths() {
        let texinfo = Rec::default()
            .f32s(&[1.0, 0.0, 0.0, 0.0])
            .f32s(&[0.0, 1.0, 0.0, 0.0])
            .i32(SurfaceFlags::SKY.bits())
            .i32(300)
            .bytes(&{
                let mut name = [0u8; 32];
                name[..10].copy_from_slice(b"sky/bright");
                name
            })
            .i32(-1)
            .0;
        let verts = Rec::default()
            .f32s(&[0.0, 0.0, 0.0])
            .f32s(&[64.0, 0.0, 0.0])
            .f32s(&[64.0, 64.0, 0.0])
            .0;
        let edges = Rec::default().u16s(&[0, 0, 0, 1, 1, 2, 2, 0]).0;
        let surfedges = Rec::default().i32s(&[1, 2, 3]).0;
        // plane, side, first edge, edge count, texinfo
        let face = Rec::default()
            .u16(0)
            .i16(0)
            .i32(0)
            .i16(3)
            .i16(0)
            .bytes(&[0, 255, 255, 255])
            .i32(-1)
            .0;
        let data = two_leaf_image()
            .lump(LUMP_TEXINFO, texinfo)
            .lump(LUMP_VERTEXES, verts)
            .lump(LUMP_EDGES, edges)
            .lump(LUMP_SURFEDGES, surfedges)
            .lump(LUMP_FACES, face)
            .lump(LUMP_LEAFFACES, Rec::default().u16(0).0)
            .lump(LUMP_LIGHTING, vec![7u8; 30])
            .build();
        let world = World::from_bytes("t", &data).unwrap();

        assert_eq!(world.vertices.len(), 3);
        assert_eq!(world.edges.len(), 4);
        assert_eq!(world.surfedges.len(), 3);
        assert_eq!(world.faces.len(), 1);
        assert_eq!(world.leaf_faces, vec![0]);
        assert_eq!(world.lightdata.len(), 30);

        let ti = &world.texinfo[0];
        assert_eq!(ti.texture, "sky/bright");
        assert_eq!(ti.value, 300);
        assert_eq!(ti.next, None);
        assert!(ti.flags.contains(SurfaceFlags::SKY));

        let face = &world.faces[0];
        assert_eq!(face.light_offset, None);
        assert_eq!(face.num_edges, 3);
        assert_eq!(face.styles, [0, 255, 255, 255]);
    }

    #[test]
    fn test_visibility_length_seven_rejected() {
        let data = two_leaf_image().lump(LUMP_VISIBILITY, vec![0u8; 7]).build();
        match World::from_bytes("t", &data) {
            Err(LoadError::FunnyLumpSize { lump, length, element_size }) => {
                assert_eq!(lump, "visibility");
                assert_eq!(length, 7);
                assert_eq!(element_size, 4);
            }
            other => panic!("expected funny lump size, got {:?}", other.map(|w| w.name)),
        }
    }

    #[test]
    fn test_funny_face_lump_rejected() {
        let data = two_leaf_image().lump(LUMP_FACES, vec![0u8; 30]).build();
        assert!(matches!(
            World::from_bytes("t", &data),
            Err(LoadError::FunnyLumpSize { lump: "faces", length: 30, element_size: 20 })
        ));
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut data = two_leaf_image().build();
        data[4..8].copy_from_slice(&46i32.to_le_bytes());
        assert!(matches!(
            World::from_bytes("t", &data),
            Err(LoadError::BadVersion { found: 46 })
        ));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let data = two_leaf_image().build();
        // planes lump is the first non-empty lump; chop into it
        let cut = &data[..BSP_HEADER_SIZE + 10];
        assert!(matches!(
            World::from_bytes("t", cut),
            Err(LoadError::LumpOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_visibility_parse() {
        // 2 clusters, pvs rows at 20 and 21
        let vis = Rec::default()
            .i32(2)
            .i32s(&[20, 0])
            .i32s(&[21, 0])
            .bytes(&[0b01, 0b11, 0, 0])
            .0;
        let data = two_leaf_image().lump(LUMP_VISIBILITY, vis).build();
        let world = World::from_bytes("t", &data).unwrap();
        let v = world.vis.as_ref().unwrap();
        assert_eq!(v.num_clusters, 2);
        assert_eq!(v.bitofs, vec![[20, 0], [21, 0]]);
        assert_eq!(v.data.len(), 24);
        assert_eq!(world.num_clusters(), 2);
    }

    #[test]
    fn test_visibility_truncated_table() {
        // claims 100 clusters but only one offset pair fits
        let vis = Rec::default().i32s(&[100, 12, 0]).0;
        let v = Visibility::parse(&vis).unwrap();
        assert_eq!(v.num_clusters, 1);
        assert_eq!(v.bitofs.len(), 1);
    }

    #[test]
    fn test_visibility_negative_count_is_no_vis() {
        let vis = Rec::default().i32s(&[-3, 12, 0]).0;
        assert!(Visibility::parse(&vis).is_none());

        let data = two_leaf_image().lump(LUMP_VISIBILITY, vis).build();
        let world = World::from_bytes("t", &data).unwrap();
        assert!(world.vis.is_none());
        assert!(world.cluster_visible(0, 1));
    }

    #[test]
    fn test_entity_string_terminated() {
        let ents = b"{\n\"classname\" \"worldspawn\"\n}\n".to_vec();
        let data = two_leaf_image().lump(LUMP_ENTITIES, ents.clone()).build();
        let world = World::from_bytes("t", &data).unwrap();
        assert_eq!(world.entity_data.last(), Some(&0));
        assert_eq!(world.entity_data.len(), ents.len() + 1);
        assert_eq!(world.entity_string(), String::from_utf8(ents).unwrap());
        assert_eq!(world.summary().entity_chars, world.entity_data.len() - 1);
    }

    #[test]
    fn test_surfedge_decode() {
        assert_eq!(SurfEdge::decode(&5i32.to_le_bytes()), SurfEdge { edge: 5, reversed: false });
        assert_eq!(SurfEdge::decode(&(-5i32).to_le_bytes()), SurfEdge { edge: 5, reversed: true });
    }

    #[test]
    fn test_child_from_disk() {
        assert_eq!(Child::from_disk(3), Child::Node(3));
        assert_eq!(Child::from_disk(-1), Child::Leaf(0));
        assert_eq!(Child::from_disk(-7), Child::Leaf(6));
        assert_eq!(Child::from_disk(i32::MIN), Child::Leaf(i32::MAX as usize));
    }

    #[test]
    fn test_face_winding_walks_reversed_edges() {
        let world = World {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
            edges: vec![
                Edge { v: [0, 0] },
                Edge { v: [0, 1] },
                Edge { v: [2, 1] },
                Edge { v: [2, 0] },
            ],
            surfedges: vec![
                SurfEdge { edge: 1, reversed: false },
                SurfEdge { edge: 2, reversed: true },
                SurfEdge { edge: 3, reversed: false },
            ],
            ..Default::default()
        };
        let face = Face { num_edges: 3, ..Default::default() };
        assert_eq!(
            world.face_winding(&face).unwrap(),
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]
        );

        let bad = Face { first_edge: 2, num_edges: 3, ..Default::default() };
        assert!(world.face_winding(&bad).is_none());
    }

    #[test]
    fn test_inline_model() {
        let model = |n: usize| Model {
            mins: [0.0; 3],
            maxs: [0.0; 3],
            origin: [0.0; 3],
            head_node: 0,
            first_face: n,
            num_faces: 1,
        };
        let world = World {
            models: vec![model(0), model(5)],
            ..Default::default()
        };
        assert_eq!(world.inline_model("*1").map(|m| m.first_face), Some(5));
        assert!(world.inline_model("*0").is_none());
        assert!(world.inline_model("*2").is_none());
        assert!(world.inline_model("1").is_none());
        assert!(world.inline_model("*x").is_none());
    }

    #[test]
    fn test_texture_names_dedup() {
        let ti = |name: &str| TexInfo { texture: name.to_string(), ..Default::default() };
        let world = World {
            texinfo: vec![ti("a/wall"), ti("a/floor"), ti("a/wall")],
            ..Default::default()
        };
        assert_eq!(world.texture_names(), vec!["a/wall", "a/floor"]);
    }

    #[test]
    fn test_plane_distance_axial_fast_path() {
        let axial = Plane { normal: [0.0, 0.0, 1.0], dist: 10.0, plane_type: 2 };
        assert_eq!(axial.distance(&[5.0, 5.0, 15.0]), 5.0);
        let diag = Plane { normal: [0.6, 0.8, 0.0], dist: 0.0, plane_type: 3 };
        assert!((diag.distance(&[3.0, 4.0, 0.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_plane_distance_ignores_mismatched_type() {
        // type says x, normal says y
        let plane = Plane { normal: [0.0, 1.0, 0.0], dist: 0.0, plane_type: 0 };
        assert_eq!(plane.distance(&[10.0, -3.0, 0.0]), -3.0);
        // negative axial normal
        let flipped = Plane { normal: [0.0, 0.0, -1.0], dist: 4.0, plane_type: 2 };
        assert_eq!(flipped.distance(&[0.0, 0.0, 10.0]), -14.0);
    }

    struct MapFiles(HashMap<String, Vec<u8>>);

    impl FileReader for MapFiles {
        fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| FsError::NotFound(path.to_string()))
        }
    }

    #[test]
    fn test_load_through_reader() {
        let mut files = HashMap::new();
        files.insert("maps/a.bsp".to_string(), two_leaf_image().build());
        let fs = MapFiles(files);

        let world = World::load(&fs, "maps/a.bsp").unwrap();
        assert_eq!(world.leaves.len(), 2);

        assert!(matches!(
            World::load(&fs, "maps/b.bsp"),
            Err(LoadError::Fs(FsError::NotFound(_)))
        ));
    }
}
