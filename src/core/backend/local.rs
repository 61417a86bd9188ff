//! Local disk adapter.
//!
//! Listing follows symlinks for the directory flag, like a shell `ls -L` would, and keeps
//! broken links as plain files. Unreadable entries are skipped rather than failing the listing.

use crate::core::address::{PathAddress, Scheme};
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing};
use crate::core::error::{BrowseError, Result};

use std::fs::{self, File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn path_of(addr: &PathAddress) -> Result<PathBuf> {
        addr.to_local_path().ok_or_else(|| {
            BrowseError::internal(format!("{} is not a local address", addr))
        })
    }
}

fn entry_from_metadata(name: String, md: &Metadata) -> DirectoryEntry {
    let entry = DirectoryEntry::new(name, md.is_dir())
        .with_size((!md.is_dir()).then(|| md.len()))
        .with_modified(md.modified().ok());
    with_platform_meta(entry, md)
}

#[cfg(unix)]
fn with_platform_meta(entry: DirectoryEntry, md: &Metadata) -> DirectoryEntry {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    entry
        .with_meta("mode", format!("{:o}", md.permissions().mode() & 0o7777))
        .with_meta("uid", md.uid().to_string())
        .with_meta("gid", md.gid().to_string())
}

#[cfg(not(unix))]
fn with_platform_meta(entry: DirectoryEntry, md: &Metadata) -> DirectoryEntry {
    entry.with_meta("readonly", md.permissions().readonly().to_string())
}

/// Directory mtime in nanoseconds since the epoch.
fn mtime_token(md: &Metadata) -> Option<String> {
    let modified = md.modified().ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    Some(nanos.to_string())
}

impl Backend for LocalBackend {
    fn list(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let path = Self::path_of(addr)?;
        let dir_md = fs::metadata(&path)?;
        if !dir_md.is_dir() {
            return Err(BrowseError::not_found(format!("{} is not a directory", addr)));
        }

        let mut entries = Vec::with_capacity(256);
        for entry in fs::read_dir(&path)? {
            let Ok(entry) = entry else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();

            // follow links; a broken link falls back to its own metadata
            let md = match fs::metadata(entry.path()) {
                Ok(md) => md,
                Err(_) => match entry.metadata() {
                    Ok(md) => md,
                    Err(_) => continue,
                },
            };

            let mut item = entry_from_metadata(name, &md);
            if entry.file_type().is_ok_and(|ft| ft.is_symlink()) {
                let target = fs::read_link(entry.path())
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                item = item.with_meta("symlink", target);
            }
            entries.push(item);
        }

        tracing::debug!(path = %path.display(), count = entries.len(), "listed local directory");
        Ok(DirectoryListing::new(addr.clone(), entries, mtime_token(&dir_md)))
    }

    fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
        let path = Self::path_of(addr)?;
        let md = fs::metadata(&path)?;
        let name = addr.name().unwrap_or("/").to_string();
        Ok(entry_from_metadata(name, &md))
    }

    fn open_range(&self, addr: &PathAddress, offset: u64, len: u64) -> Result<Vec<u8>> {
        let path = Self::path_of(addr)?;
        let file = File::open(&path)?;
        if file.metadata()?.is_dir() {
            return Err(BrowseError::unsupported(format!("{} is a directory", addr)));
        }

        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(len.min(1 << 20) as usize);
        file.take(len).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn exists(&self, addr: &PathAddress) -> Result<bool> {
        let path = Self::path_of(addr)?;
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn probe_revision(&self, addr: &PathAddress, _known: Option<&str>) -> Result<Option<String>> {
        let path = Self::path_of(addr)?;
        let md = fs::metadata(&path)?;
        Ok(mtime_token(&md))
    }

    fn label(&self) -> &str {
        Scheme::Local.prefix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    use std::error;
    use std::path::Path;
    use tempfile::tempdir;

    fn addr_of(path: &Path) -> PathAddress {
        PathAddress::local(path, Path::new("/"))
    }

    #[test]
    fn list_orders_and_describes_entries() -> std::result::Result<(), Box<dyn error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("B.txt"), b"hello")?;
        fs::write(dir.path().join("a.txt"), b"")?;

        let listing = LocalBackend::new().list(&addr_of(dir.path()))?;
        let names: Vec<&str> = listing.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["sub", "a.txt", "B.txt"]);
        assert_eq!(listing.find("B.txt").and_then(|e| e.size()), Some(5));
        assert!(listing.revision().is_some());
        Ok(())
    }

    #[test]
    fn open_range_is_partial() -> std::result::Result<(), Box<dyn error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("data.bin");
        fs::write(&file, b"0123456789")?;

        let backend = LocalBackend::new();
        assert_eq!(backend.open_range(&addr_of(&file), 3, 4)?, b"3456");
        assert_eq!(backend.open_range(&addr_of(&file), 8, 100)?, b"89");
        assert!(backend.open_range(&addr_of(&file), 50, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_paths() -> std::result::Result<(), Box<dyn error::Error>> {
        let dir = tempdir()?;
        let missing = addr_of(&dir.path().join("nope"));
        let backend = LocalBackend::new();

        assert!(!backend.exists(&missing)?);
        let err = backend.list(&missing).err().ok_or("listing succeeded")?;
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }
}
