//! Expansion of downloaded zip archives.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};
use zip::ZipArchive;
use zip::result::ZipError;

/// Sibling directory an archive expands into: the archive path without its extension.
#[must_use]
pub fn expansion_dir(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

/// Extracts every entry of `archive` into [`expansion_dir`].
///
/// Entry names that would escape the target directory are rejected by the
/// zip reader.
///
/// # Errors
///
/// Returns the [`ZipError`] if the archive cannot be opened or an entry
/// cannot be written.
#[instrument(fields(archive = %archive.display()))]
pub fn expand_archive(archive: &Path) -> Result<PathBuf, ZipError> {
    let target = expansion_dir(archive);
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    std::fs::create_dir_all(&target)?;
    zip.extract(&target)?;
    info!(entries = zip.len(), target = %target.display(), "Expanded archive");
    Ok(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_expansion_dir_is_stem_sibling() {
        assert_eq!(
            expansion_dir(Path::new("/out/2024/annexes.zip")),
            PathBuf::from("/out/2024/annexes")
        );
    }

    #[test]
    fn test_expand_archive_writes_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("sujet.txt", options).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.start_file("corrige/notes.txt", options).unwrap();
            writer.write_all(b"world").unwrap();
            writer.finish().unwrap();
        }

        let target = expand_archive(&archive).unwrap();
        assert_eq!(target, dir.path().join("bundle"));
        assert_eq!(std::fs::read(target.join("sujet.txt")).unwrap(), b"hello");
        assert_eq!(
            std::fs::read(target.join("corrige").join("notes.txt")).unwrap(),
            b"world"
        );
    }

    #[test]
    fn test_expand_archive_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, b"PK not really").unwrap();
        assert!(expand_archive(&archive).is_err());
    }
}
