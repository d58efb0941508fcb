//! Whole-image snapshots.
//!
//! # Layout
//! ==========================================================
//! | Inode table | Block store | Inode bitmap | Block bitmap |
//! ==========================================================
//!
//! Each region is the raw in-memory array, so a record's position in the file
//! is its identity. There is no header; the file length is fixed by the
//! geometry and is the only thing checked on load.
//!
//! Records and bitmap words are stored in host byte order, so a snapshot is
//! only portable between machines of the same endianness.

use crate::alloc::Bitmap;
use crate::config::Geometry;
use crate::fs::FsError;
use crate::image::Image;
use crate::io::BLOCK_SIZE;
use crate::node::Inode;

use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

/// Size in bytes of a snapshot written with `geometry`.
pub fn snapshot_len(geometry: &Geometry) -> u64 {
    let word = std::mem::size_of::<u32>();
    let len = geometry.inode_count * std::mem::size_of::<Inode>()
        + geometry.block_count * BLOCK_SIZE
        + Bitmap::words_for(geometry.inode_count) * word
        + Bitmap::words_for(geometry.block_count) * word;
    len as u64
}

impl Image {
    /// Rewrites the snapshot at `path` in full, truncating any previous one.
    pub(crate) fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FsError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut out = BufWriter::new(&file);
        out.write_all(self.inodes.serialize())?;
        out.write_all(self.blocks.serialize())?;
        out.write_all(self.inodes.allocations().serialize())?;
        out.write_all(self.blocks.allocations().serialize())?;
        out.flush()?;
        drop(out);
        file.sync_all()?;

        info!(
            "saved snapshot to {} ({} inodes in use)",
            path.display(),
            self.inodes.total_nodes()
        );
        Ok(())
    }

    /// Restores an image from the snapshot at `path`. Returns `None` if there is
    /// no snapshot there yet.
    ///
    /// # Errors
    ///
    /// `InvalidSnapshot` if the file length does not match `geometry`.
    pub(crate) fn load<P: AsRef<Path>>(
        path: P,
        geometry: &Geometry,
        uid: u32,
        gid: u32,
    ) -> Result<Option<Image>, FsError> {
        geometry.validate()?;
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let expected = snapshot_len(geometry);
        let found = file.metadata()?.len();
        if found != expected {
            warn!(
                "refusing snapshot {}: {} bytes, expected {}",
                path.display(),
                found,
                expected
            );
            return Err(FsError::InvalidSnapshot { expected, found });
        }

        let mut image = Image::blank(geometry, uid, gid);
        let mut input = BufReader::new(file);
        input.read_exact(image.inodes.serialize_mut())?;
        input.read_exact(image.blocks.serialize_mut())?;
        input.read_exact(image.inodes.allocations_mut().serialize_mut())?;
        input.read_exact(image.blocks.allocations_mut().serialize_mut())?;

        info!(
            "loaded snapshot from {} ({} inodes in use)",
            path.display(),
            image.inodes.total_nodes()
        );
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Image {
        let mut image = Image::format(&Geometry::default(), 0, 0).unwrap();
        image.make_directory("/a", 0o755).unwrap();
        let inum = image.create_file("/a/b.txt", 0o644).unwrap();
        image.write(inum, 0, &vec![0xab; 2 * BLOCK_SIZE + 3]).unwrap();
        image.link("/a/b.txt", "/c").unwrap();
        image.create_file("/gone", 0o600).unwrap();
        image.unlink("/gone").unwrap();
        image
    }

    #[test]
    fn snapshot_length_is_fixed_by_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.snapfs");
        populated().save(&path).unwrap();

        let geometry = Geometry::default();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), snapshot_len(&geometry));
        assert_eq!(snapshot_len(&geometry), 500 * 96 + 500 * 4096 + 16 * 4 * 2);
    }

    #[test]
    fn save_then_load_reproduces_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.snapfs");
        let image = populated();
        image.save(&path).unwrap();

        let loaded = Image::load(&path, &Geometry::default(), 0, 0)
            .unwrap()
            .expect("snapshot should exist");
        // Comparing whole images keeps a failure from dumping megabytes of blocks.
        assert!(loaded == image, "loaded image differs from saved image");
    }

    #[test]
    fn saving_truncates_the_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.snapfs");
        std::fs::write(&path, vec![0xff; 10 * 1024 * 1024]).unwrap();

        let image = Image::format(&Geometry::default(), 0, 0).unwrap();
        image.save(&path).unwrap();

        let loaded = Image::load(&path, &Geometry::default(), 0, 0).unwrap().unwrap();
        assert!(loaded == image);
    }

    #[test]
    fn missing_snapshot_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Image::load(dir.path().join("absent"), &Geometry::default(), 0, 0).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn mismatched_geometry_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        populated().save(file.path()).unwrap();

        let smaller = Geometry {
            inode_count: 10,
            block_count: 10,
        };
        match Image::load(file.path(), &smaller, 0, 0) {
            Err(FsError::InvalidSnapshot { expected, found }) => {
                assert_eq!(expected, snapshot_len(&smaller));
                assert_eq!(found, snapshot_len(&Geometry::default()));
            }
            other => panic!("expected invalid snapshot, got {:?}", other.map(|_| ())),
        }
    }
}
