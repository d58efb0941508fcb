use snapfs::{Config, SnapFs};
use std::env;

/// Mounts the snapshot in the working directory (or the path given as the
/// first argument), adds a file, prints the tree and saves the snapshot again.
pub fn main() -> Result<(), snapfs::FsError> {
    env_logger::init();

    let mut config = Config::default();
    if let Some(path) = env::args().nth(1) {
        config = config.with_snapshot_path(path);
    }

    let fs = SnapFs::init(config)?;
    if fs.open("/a").is_err() {
        fs.make_directory("/a", 0o755)?;
    }
    let handle = match fs.open("/a/b.txt") {
        Ok(handle) => handle,
        Err(_) => fs.create_file("/a/b.txt", 0o644)?,
    };
    let size = fs.get_attributes("/a/b.txt")?.size;
    fs.write(handle, size, b"hello\n")?;

    for dir in &["/", "/a"] {
        println!("{}:", dir);
        for entry in fs.list_directory(dir)? {
            println!("  {:>4} {:?} {}", entry.ino, entry.kind, entry.name);
        }
    }
    let contents = fs.read(handle, 0, usize::MAX)?;
    print!("/a/b.txt:\n{}", String::from_utf8_lossy(&contents));
    println!("{:?}", fs.stats());

    fs.shutdown()
}
