// error.rs — load and filesystem errors

use std::io;

use thiserror::Error;

use crate::qfiles::{BSP_HEADER_SIZE, BSPVERSION};

/// Errors raised by the virtual filesystem.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("can't find {0}")]
    NotFound(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not a packfile")]
    NotAPack(String),

    #[error("{path} has {count} files")]
    TooManyFiles { path: String, count: usize },

    /// Directory entry points outside the archive.
    #[error("{pack}: entry {name} extends beyond end of file")]
    EntryOutOfBounds { pack: String, name: String },
}

/// Structural errors while loading a BSP. Nothing partial survives one of these.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("file is {len} bytes, shorter than the {header}-byte header", header = BSP_HEADER_SIZE)]
    TooShort { len: usize },

    #[error("not an IBSP file (magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("wrong version number ({found} should be {expected})", expected = BSPVERSION)]
    BadVersion { found: i32 },

    #[error("funny lump size in {lump}: {length} bytes is not a multiple of {element_size}")]
    FunnyLumpSize {
        lump: &'static str,
        length: usize,
        element_size: usize,
    },

    #[error("lump {lump} (offset {offset}, length {length}) extends beyond end of file ({file_len} bytes)")]
    LumpOutOfBounds {
        lump: &'static str,
        offset: i32,
        length: i32,
        file_len: usize,
    },
}
