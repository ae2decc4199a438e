// ABOUTME: Packs a local directory tree into a gzip'd tar stream for upload.
// ABOUTME: Entries are relative to the tree root; .git directories are skipped.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Directory names never shipped to the remote host.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Archive `root` into an in-memory `.tar.gz`.
///
/// Entries are added in sorted order so identical trees produce identical
/// archives.
pub fn archive_tree(root: &Path) -> io::Result<Vec<u8>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    append_dir(&mut tar, root, Path::new(""))?;

    let data = tar.into_inner()?.finish()?;
    tracing::debug!("Archived {} ({} bytes)", root.display(), data.len());
    Ok(data)
}

fn append_dir<W: Write>(tar: &mut tar::Builder<W>, root: &Path, relative: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(root.join(relative))?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        let entry_path = relative.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if SKIPPED_DIRS.iter().any(|skipped| name == *skipped) {
                continue;
            }
            tar.append_dir(&entry_path, entry.path())?;
            append_dir(tar, root, &entry_path)?;
        } else {
            tar.append_path_with_name(entry.path(), &entry_path)?;
        }
    }

    Ok(())
}
