use crate::dir;
use crate::fs::FsError;
use crate::image::Image;
use crate::node::ROOT_INODE;

/// Longest path accepted by any operation, in bytes.
pub const MAX_PATH_LEN: usize = 500;

fn check_len(path: &str) -> Result<(), FsError> {
    if path.len() > MAX_PATH_LEN {
        return Err(FsError::BadArgument(format!(
            "path exceeds {} bytes",
            MAX_PATH_LEN
        )));
    }
    Ok(())
}

/// Non-empty `/`-separated segments; repeated, leading and trailing slashes
/// are skipped.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Splits `path` into its parent directory path and final name.
///
/// The name must be storable in a directory entry and may not be `.` or `..`,
/// so `/` itself has no parent/name split.
pub fn split_parent(path: &str) -> Result<(&str, &str), FsError> {
    check_len(path)?;
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..=i], &trimmed[i + 1..]),
        None => ("/", trimmed),
    };
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::BadArgument(format!(
            "\"{}\" does not name a directory entry",
            path
        )));
    }
    dir::validate_name(name)?;
    Ok((parent, name))
}

impl Image {
    /// Walks `path` from the root, one directory lookup per segment. Missing
    /// segments fail with `NotFound`; nothing is created on the way.
    pub(crate) fn resolve(&self, path: &str) -> Result<u32, FsError> {
        check_len(path)?;
        if path == "/" {
            return Ok(ROOT_INODE);
        }
        components(path).try_fold(ROOT_INODE, |dir, name| self.lookup(dir, name))
    }

    /// Resolves the parent of `path`, returning it with the final name.
    pub(crate) fn resolve_parent<'p>(&self, path: &'p str) -> Result<(u32, &'p str), FsError> {
        let (parent, name) = split_parent(path)?;
        Ok((self.resolve(parent)?, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geometry;

    #[test]
    fn splits_on_last_separator() {
        assert_eq!(split_parent("/a/b.txt").unwrap(), ("/a/", "b.txt"));
        assert_eq!(split_parent("/top").unwrap(), ("/", "top"));
        assert_eq!(split_parent("/a/dir/").unwrap(), ("/a/", "dir"));
        assert_eq!(split_parent("relative").unwrap(), ("/", "relative"));
    }

    #[test]
    fn root_and_dot_entries_have_no_parent_split() {
        for path in &["/", "", "//", "/a/.", "/a/.."] {
            match split_parent(path) {
                Err(FsError::BadArgument(_)) => (),
                other => panic!("{:?} split into {:?}", path, other),
            }
        }
    }

    #[test]
    fn overlong_paths_are_rejected() {
        let path = format!("/{}", "a/".repeat(MAX_PATH_LEN));
        assert!(matches!(split_parent(&path), Err(FsError::BadArgument(_))));
    }

    #[test]
    fn components_skip_empty_segments() {
        let parts: Vec<&str> = components("//a///b/").collect();
        assert_eq!(parts, vec!["a", "b"]);
    }

    #[test]
    fn resolves_nested_paths() {
        let mut image = Image::format(&Geometry::default(), 0, 0).unwrap();
        let a = image.make_directory("/a", 0o755).unwrap();
        let b = image.create_file("/a/b.txt", 0o644).unwrap();

        assert_eq!(image.resolve("/").unwrap(), ROOT_INODE);
        assert_eq!(image.resolve("/a").unwrap(), a);
        assert_eq!(image.resolve("//a//b.txt/").unwrap(), b);
        assert_eq!(image.resolve("/a/./b.txt").unwrap(), b);
        assert_eq!(image.resolve("/a/..").unwrap(), ROOT_INODE);
    }

    #[test]
    fn missing_segments_fail_closed() {
        let mut image = Image::format(&Geometry::default(), 0, 0).unwrap();
        image.make_directory("/a", 0o755).unwrap();

        assert!(matches!(image.resolve("/missing"), Err(FsError::NotFound)));
        assert!(matches!(image.resolve("/missing/a"), Err(FsError::NotFound)));
        assert!(matches!(image.resolve("/a/missing"), Err(FsError::NotFound)));
        // Failed lookups never create intermediate directories.
        assert!(matches!(image.resolve("/missing"), Err(FsError::NotFound)));
    }

    #[test]
    fn files_cannot_be_traversed() {
        let mut image = Image::format(&Geometry::default(), 0, 0).unwrap();
        image.create_file("/f", 0o644).unwrap();

        assert!(matches!(image.resolve("/f/x"), Err(FsError::NotADirectory)));
    }
}
