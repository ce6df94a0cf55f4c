// qfiles.rs — on-disk file format structures (PAK archives, IBSP v38)

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::error::LoadError;

// ============================================================
// PAK files
// ============================================================

/// "PACK" as a little-endian int.
pub const IDPAKHEADER: i32 = (b'K' as i32) << 24 | (b'C' as i32) << 16 | (b'A' as i32) << 8 | b'P' as i32;

/// ident, dirofs, dirlen
pub const PACK_HEADER_SIZE: usize = 12;
/// name[56], filepos, filelen
pub const PACK_FILE_SIZE: usize = 64;
pub const PACK_NAME_LEN: usize = 56;

pub const MAX_FILES_IN_PACK: usize = 4096;

/// One directory entry of a pack file, as stored on disk.
#[derive(Debug, Clone)]
pub struct DPackFile {
    pub name: String,
    pub filepos: i32,
    pub filelen: i32,
}

impl DPackFile {
    /// Decodes a 64-byte directory entry. The name is NUL-terminated.
    pub fn decode(b: &[u8]) -> Self {
        let raw = &b[..PACK_NAME_LEN];
        let name_end = raw.iter().position(|&c| c == 0).unwrap_or(PACK_NAME_LEN);
        Self {
            name: String::from_utf8_lossy(&raw[..name_end]).into_owned(),
            filepos: LE::read_i32(&b[56..]),
            filelen: LE::read_i32(&b[60..]),
        }
    }
}

// ============================================================
// BSP file format
// ============================================================

/// "IBSP" as a little-endian int.
pub const IDBSPHEADER: i32 = (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
pub const BSPVERSION: i32 = 38;

// Lump indices
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_VISIBILITY: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_LEAFFACES: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const LUMP_POP: usize = 16;
pub const LUMP_AREAS: usize = 17;
pub const LUMP_AREAPORTALS: usize = 18;
pub const HEADER_LUMPS: usize = 19;

/// ident + version + lump directory
pub const BSP_HEADER_SIZE: usize = 8 + HEADER_LUMPS * 8;

/// Name and record size of every lump, in directory order.
///
/// Visibility is checked in 4-byte units: the blob starts with an int
/// cluster count followed by int offset pairs.
pub const LUMP_INFO: [(&str, usize); HEADER_LUMPS] = [
    ("entities", 1),
    ("planes", 20),
    ("vertexes", 12),
    ("visibility", 4),
    ("nodes", 28),
    ("texinfo", 76),
    ("faces", 20),
    ("lighting", 1),
    ("leafs", 28),
    ("leaffaces", 2),
    ("leafbrushes", 2),
    ("edges", 4),
    ("surfedges", 4),
    ("models", 48),
    ("brushes", 12),
    ("brushsides", 4),
    ("pop", 1),
    ("areas", 8),
    ("areaportals", 8),
];

#[inline]
pub fn lump_name(lump: usize) -> &'static str {
    LUMP_INFO[lump].0
}

#[inline]
pub fn lump_element_size(lump: usize) -> usize {
    LUMP_INFO[lump].1
}

/// PVS column of a visibility offset pair (the other is the PHS).
pub const DVIS_PVS: usize = 0;

// Plane types: 0..=2 are axial
pub const PLANE_X: i32 = 0;
pub const PLANE_Z: i32 = 2;

pub const MAXLIGHTMAPS: usize = 4;

/// Texture name length inside a texinfo record.
pub const TEXINFO_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl DHeader {
    /// Decodes and validates the header: length, magic and version.
    /// Lump bounds are checked per lump by [`DHeader::lump_bytes`].
    pub fn parse(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < BSP_HEADER_SIZE {
            return Err(LoadError::TooShort { len: data.len() });
        }

        let ident = LE::read_i32(&data[0..4]);
        if ident != IDBSPHEADER {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&data[0..4]);
            return Err(LoadError::BadMagic(magic));
        }

        let version = LE::read_i32(&data[4..8]);
        if version != BSPVERSION {
            return Err(LoadError::BadVersion { found: version });
        }

        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            let base = 8 + i * 8;
            lump.fileofs = LE::read_i32(&data[base..]);
            lump.filelen = LE::read_i32(&data[base + 4..]);
        }

        Ok(Self { ident, version, lumps })
    }

    /// Returns the bytes of lump `index`, after checking that it lies inside
    /// `data` and that its length is a whole number of records.
    pub fn lump_bytes<'a>(&self, data: &'a [u8], index: usize) -> Result<&'a [u8], LoadError> {
        let lump = self.lumps[index];
        let (name, element_size) = LUMP_INFO[index];

        let out_of_bounds = || LoadError::LumpOutOfBounds {
            lump: name,
            offset: lump.fileofs,
            length: lump.filelen,
            file_len: data.len(),
        };

        if lump.fileofs < 0 || lump.filelen < 0 {
            return Err(out_of_bounds());
        }
        let ofs = lump.fileofs as usize;
        let len = lump.filelen as usize;
        let end = ofs.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > data.len() {
            return Err(out_of_bounds());
        }

        if len % element_size != 0 {
            return Err(LoadError::FunnyLumpSize {
                lump: name,
                length: len,
                element_size,
            });
        }

        Ok(&data[ofs..end])
    }
}

// ============================================================
// Lump records
// ============================================================

/// A fixed-size record stored in a lump.
pub trait LumpRecord: Sized + Send {
    /// Record size in bytes.
    const SIZE: usize;

    /// Decodes one record from exactly `SIZE` bytes.
    fn decode(b: &[u8]) -> Self;
}

impl LumpRecord for u16 {
    const SIZE: usize = 2;

    fn decode(b: &[u8]) -> Self {
        LE::read_u16(b)
    }
}

impl LumpRecord for i32 {
    const SIZE: usize = 4;

    fn decode(b: &[u8]) -> Self {
        LE::read_i32(b)
    }
}

/// Reads three consecutive little-endian floats.
#[inline]
pub fn read_vec3(b: &[u8]) -> [f32; 3] {
    [LE::read_f32(&b[0..]), LE::read_f32(&b[4..]), LE::read_f32(&b[8..])]
}

/// Reads three consecutive little-endian shorts.
#[inline]
pub fn read_short3(b: &[u8]) -> [i16; 3] {
    [LE::read_i16(&b[0..]), LE::read_i16(&b[2..]), LE::read_i16(&b[4..])]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a header with every lump pointing at `(ofs, len)`.
    fn header_bytes(ident: &[u8; 4], version: i32, lumps: &[(i32, i32)]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BSP_HEADER_SIZE);
        buf.extend_from_slice(ident);
        buf.extend_from_slice(&version.to_le_bytes());
        for i in 0..HEADER_LUMPS {
            let (ofs, len) = lumps.get(i).copied().unwrap_or((BSP_HEADER_SIZE as i32, 0));
            buf.extend_from_slice(&ofs.to_le_bytes());
            buf.extend_from_slice(&len.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_magic_constants() {
        assert_eq!(IDBSPHEADER.to_le_bytes(), *b"IBSP");
        assert_eq!(IDPAKHEADER.to_le_bytes(), *b"PACK");
    }

    #[test]
    fn test_header_size() {
        assert_eq!(BSP_HEADER_SIZE, 160);
    }

    #[test]
    fn test_lump_table_order() {
        assert_eq!(lump_name(LUMP_ENTITIES), "entities");
        assert_eq!(lump_name(LUMP_VISIBILITY), "visibility");
        assert_eq!(lump_name(LUMP_SURFEDGES), "surfedges");
        assert_eq!(lump_name(LUMP_AREAPORTALS), "areaportals");
        assert_eq!(lump_element_size(LUMP_TEXINFO), 76);
        assert_eq!(lump_element_size(LUMP_MODELS), 48);
        assert_eq!(lump_element_size(LUMP_LEAFFACES), 2);
        assert_eq!(lump_element_size(LUMP_POP), 1);
    }

    #[test]
    fn test_parse_header() {
        let data = header_bytes(b"IBSP", 38, &[(160, 0), (160, 20)]);
        let h = DHeader::parse(&data).unwrap();
        assert_eq!(h.version, 38);
        assert_eq!(h.lumps[LUMP_PLANES], Lump { fileofs: 160, filelen: 20 });
    }

    #[test]
    fn test_parse_too_short() {
        let data = header_bytes(b"IBSP", 38, &[]);
        let err = DHeader::parse(&data[..100]).unwrap_err();
        assert!(matches!(err, LoadError::TooShort { len: 100 }));
    }

    #[test]
    fn test_parse_bad_magic() {
        let data = header_bytes(b"VBSP", 38, &[]);
        let err = DHeader::parse(&data).unwrap_err();
        assert!(matches!(err, LoadError::BadMagic(m) if &m == b"VBSP"));
    }

    #[test]
    fn test_parse_bad_version() {
        let data = header_bytes(b"IBSP", 46, &[]);
        let err = DHeader::parse(&data).unwrap_err();
        assert!(matches!(err, LoadError::BadVersion { found: 46 }));
    }

    #[test]
    fn test_lump_bytes_funny_size() {
        let mut data = header_bytes(b"IBSP", 38, &[(160, 0), (160, 0), (160, 0), (160, 7)]);
        data.extend_from_slice(&[0u8; 7]);
        let h = DHeader::parse(&data).unwrap();
        match h.lump_bytes(&data, LUMP_VISIBILITY) {
            Err(LoadError::FunnyLumpSize { lump, length, element_size }) => {
                assert_eq!(lump, "visibility");
                assert_eq!(length, 7);
                assert_eq!(element_size, 4);
            }
            other => panic!("expected funny lump size, got {:?}", other),
        }
    }

    #[test]
    fn test_lump_bytes_past_eof() {
        let data = header_bytes(b"IBSP", 38, &[(160, 0), (150, 20)]);
        let h = DHeader::parse(&data).unwrap();
        assert!(matches!(
            h.lump_bytes(&data, LUMP_PLANES),
            Err(LoadError::LumpOutOfBounds { lump: "planes", .. })
        ));
    }

    #[test]
    fn test_lump_bytes_negative_offset() {
        let data = header_bytes(b"IBSP", 38, &[(-4, 4)]);
        let h = DHeader::parse(&data).unwrap();
        assert!(matches!(
            h.lump_bytes(&data, LUMP_ENTITIES),
            Err(LoadError::LumpOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_lump_is_ok() {
        let data = header_bytes(b"IBSP", 38, &[]);
        let h = DHeader::parse(&data).unwrap();
        assert!(h.lump_bytes(&data, LUMP_FACES).unwrap().is_empty());
    }

    #[test]
    fn test_pack_file_decode() {
        let mut entry = [0u8; PACK_FILE_SIZE];
        entry[..13].copy_from_slice(b"maps/base.bsp");
        entry[56..60].copy_from_slice(&1024i32.to_le_bytes());
        entry[60..64].copy_from_slice(&77i32.to_le_bytes());
        let pf = DPackFile::decode(&entry);
        assert_eq!(pf.name, "maps/base.bsp");
        assert_eq!(pf.filepos, 1024);
        assert_eq!(pf.filelen, 77);
    }
}
