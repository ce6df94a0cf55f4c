// Shared world data: file formats, filesystem, BSP loading and queries

pub mod q_shared;
pub mod qfiles;
pub mod error;
pub mod files;
pub mod bsp;
pub mod tree;
pub mod entities;

pub use bsp::World;
pub use error::{FsError, LoadError};
pub use files::{FileReader, FileSystem};
