// loader.rs — background map loading
//
// The BSP is read and decoded on its own thread; the result comes back to
// the main thread over a one-slot channel.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};
use log::info;

use sof_common::bsp::World;
use sof_common::error::LoadError;
use sof_common::files::FileSystem;

pub type LoadResult = Result<World, LoadError>;

/// A map load in flight.
pub struct MapLoader {
    receiver: Receiver<LoadResult>,
    handle: JoinHandle<()>,
}

impl MapLoader {
    /// Starts loading `maps/<map>.bsp` from `fs` on a new thread.
    pub fn spawn(fs: FileSystem, map: &str) -> io::Result<Self> {
        let name = format!("maps/{}.bsp", map);
        let (sender, receiver) = bounded(1);
        let handle = thread::Builder::new()
            .name("map-loader".to_string())
            .spawn(move || {
                info!("Loading {}", name);
                // the receiver may already be gone; nothing to do then
                let _ = sender.send(World::load(&fs, &name));
            })?;
        Ok(Self { receiver, handle })
    }

    /// Blocks until the load finishes. `None` if the loader thread died
    /// without producing a result.
    pub fn wait(self) -> Option<LoadResult> {
        let result = self.receiver.recv().ok();
        let _ = self.handle.join();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_map_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystem::new();
        fs.add_game_directory(dir.path());
        let result = MapLoader::spawn(fs, "nowhere").unwrap().wait().unwrap();
        assert!(matches!(result, Err(LoadError::Fs(_))));
    }

    #[test]
    fn test_garbage_map_reports_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("maps")).unwrap();
        fs::write(dir.path().join("maps/junk.bsp"), vec![0u8; 200]).unwrap();

        let mut fs = FileSystem::new();
        fs.add_game_directory(dir.path());
        let result = MapLoader::spawn(fs, "junk").unwrap().wait().unwrap();
        assert!(matches!(result, Err(LoadError::BadMagic(_))));
    }
}
