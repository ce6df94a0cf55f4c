// files.rs — virtual filesystem: game directories and PACK archives

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::FsError;
use crate::qfiles::{
    DPackFile, IDPAKHEADER, MAX_FILES_IN_PACK, PACK_FILE_SIZE, PACK_HEADER_SIZE,
};

use byteorder::{LittleEndian as LE, ReadBytesExt};

/// Source of whole files by game-relative path ("maps/base1.bsp").
pub trait FileReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;
}

// ============================================================
// In-memory structures
// ============================================================

/// A loaded .pak archive directory.
#[derive(Debug)]
pub struct Pack {
    pub filename: PathBuf,
    pub files: Vec<DPackFile>,
    /// lowercase filename -> index in files
    file_index: HashMap<String, usize>,
}

impl Pack {
    pub fn new(filename: PathBuf, files: Vec<DPackFile>) -> Self {
        let file_index = files
            .iter()
            .enumerate()
            .map(|(i, pf)| (pf.name.to_lowercase(), i))
            .collect();
        Self {
            filename,
            files,
            file_index,
        }
    }

    /// Finds a file by name (case-insensitive).
    #[inline]
    pub fn find_file(&self, filename: &str) -> Option<&DPackFile> {
        self.file_index
            .get(&filename.to_lowercase())
            .map(|&idx| &self.files[idx])
    }

    /// Reads the directory of a .pak file.
    pub fn load(path: &Path) -> Result<Pack, FsError> {
        let display = path.display().to_string();
        let io_err = |source| FsError::Io {
            path: display.clone(),
            source,
        };

        let mut f = File::open(path).map_err(io_err)?;
        let file_len = f.metadata().map_err(io_err)?.len();

        let mut header = [0u8; PACK_HEADER_SIZE];
        f.read_exact(&mut header).map_err(io_err)?;
        let mut cursor = &header[..];
        let ident = cursor.read_i32::<LE>().map_err(io_err)?;
        if ident != IDPAKHEADER {
            return Err(FsError::NotAPack(display));
        }
        let dirofs = cursor.read_i32::<LE>().map_err(io_err)?;
        let dirlen = cursor.read_i32::<LE>().map_err(io_err)?;
        if dirofs < 0 || dirlen < 0 {
            return Err(FsError::NotAPack(display));
        }

        let count = dirlen as usize / PACK_FILE_SIZE;
        if count > MAX_FILES_IN_PACK {
            return Err(FsError::TooManyFiles {
                path: display,
                count,
            });
        }

        f.seek(SeekFrom::Start(dirofs as u64)).map_err(io_err)?;
        let mut dir = vec![0u8; count * PACK_FILE_SIZE];
        f.read_exact(&mut dir).map_err(io_err)?;

        const PARALLEL_THRESHOLD: usize = 64;
        let files: Vec<DPackFile> = if count >= PARALLEL_THRESHOLD {
            dir.par_chunks_exact(PACK_FILE_SIZE)
                .map(DPackFile::decode)
                .collect()
        } else {
            dir.chunks_exact(PACK_FILE_SIZE).map(DPackFile::decode).collect()
        };

        for pf in &files {
            let end = pf.filepos as i64 + pf.filelen as i64;
            if pf.filepos < 0 || pf.filelen < 0 || end as u64 > file_len {
                return Err(FsError::EntryOutOfBounds {
                    pack: display,
                    name: pf.name.clone(),
                });
            }
        }

        info!("Added packfile {} ({} files)", display, count);
        Ok(Pack::new(path.to_path_buf(), files))
    }

    fn read_entry(&self, pf: &DPackFile) -> Result<Vec<u8>, FsError> {
        let io_err = |source| FsError::Io {
            path: format!("{}:{}", self.filename.display(), pf.name),
            source,
        };
        let mut f = File::open(&self.filename).map_err(io_err)?;
        f.seek(SeekFrom::Start(pf.filepos as u64)).map_err(io_err)?;
        let mut buf = vec![0u8; pf.filelen as usize];
        f.read_exact(&mut buf).map_err(io_err)?;
        Ok(buf)
    }
}

/// A single element on the search path, either a directory or a pack file.
#[derive(Debug)]
pub enum SearchPath {
    Directory(PathBuf),
    Pack(Pack),
}

// ============================================================
// FileSystem
// ============================================================

/// Ordered search path. Earlier entries win.
#[derive(Debug, Default)]
pub struct FileSystem {
    pub search_paths: Vec<SearchPath>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dir` and every `pak*.pak` inside it to the front of the search
    /// path. Higher-numbered paks override lower ones, and all paks override
    /// loose files in the directory.
    pub fn add_game_directory(&mut self, dir: &Path) {
        self.search_paths
            .insert(0, SearchPath::Directory(dir.to_path_buf()));

        let pakfiles = Self::list_paks(dir);
        let loaded: Vec<Result<Pack, FsError>> =
            pakfiles.par_iter().map(|p| Pack::load(p)).collect();

        // sequential to keep pak order
        for pack in loaded {
            match pack {
                Ok(pack) => self.search_paths.insert(0, SearchPath::Pack(pack)),
                Err(e) => warn!("skipping pack: {}", e),
            }
        }
    }

    /// Adds a single pack file to the front of the search path.
    pub fn add_pack(&mut self, path: &Path) -> Result<(), FsError> {
        let pack = Pack::load(path)?;
        self.search_paths.insert(0, SearchPath::Pack(pack));
        Ok(())
    }

    /// Sorted `pak*.pak` files in `dir` (case-insensitive).
    fn list_paks(dir: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let mut results: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                name.starts_with("pak") && name.ends_with(".pak")
            })
            .map(|entry| entry.path())
            .collect();
        results.sort();
        results
    }
}

impl FileReader for FileSystem {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        for sp in &self.search_paths {
            match sp {
                SearchPath::Pack(pack) => {
                    if let Some(pf) = pack.find_file(path) {
                        debug!("PackFile: {} : {}", pack.filename.display(), path);
                        return pack.read_entry(pf);
                    }
                }
                SearchPath::Directory(dir) => {
                    let netpath = dir.join(path);
                    if netpath.is_file() {
                        debug!("FindFile: {}", netpath.display());
                        return fs::read(&netpath).map_err(|source| FsError::Io {
                            path: netpath.display().to_string(),
                            source,
                        });
                    }
                }
            }
        }
        debug!("FindFile: can't find {}", path);
        Err(FsError::NotFound(path.to_string()))
    }
}
