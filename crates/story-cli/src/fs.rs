use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Replace `path` with `contents` in one rename. The temporary file lives next
/// to the target so the rename never crosses filesystems.
pub fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut staged = Builder::new()
        .prefix(".obs-editor")
        .suffix(".md.tmp")
        .tempfile_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("05.md");

        atomic_write(&path, "# first\n").unwrap();
        atomic_write(&path, "# second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "# second\n");
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
