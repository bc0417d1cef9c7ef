//! gzip'd tar packing of artifact directories.

use std::fs::{self, File};
use std::path::Path;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::debug;

use crate::error::FleetError;

/// Pack the contents of `dir` (paths relative to `dir`).
pub fn pack_dir(dir: &Path) -> Result<Bytes, FleetError> {
    if !dir.is_dir() {
        return Err(FleetError::MissingDirectory(dir.to_path_buf()));
    }

    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut tar = Builder::new(encoder);

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let relative = path
                .strip_prefix(dir)
                .map_err(|e| FleetError::Archive(format!("Path error: {}", e)))?;
            if relative.as_os_str().is_empty() {
                continue;
            }

            if entry.file_type().is_dir() {
                tar.append_dir(relative, path).map_err(|e| {
                    FleetError::Archive(format!("Failed to add {}: {}", path.display(), e))
                })?;
            } else if entry.file_type().is_file() {
                let mut file = File::open(path)?;
                tar.append_file(relative, &mut file).map_err(|e| {
                    FleetError::Archive(format!("Failed to add {}: {}", path.display(), e))
                })?;
            }
        }

        let encoder = tar
            .into_inner()
            .map_err(|e| FleetError::Archive(format!("Failed to finalize archive: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| FleetError::Archive(format!("Failed to finalize archive: {}", e)))?;
    }

    debug!("Packed {} ({} bytes)", dir.display(), data.len());
    Ok(Bytes::from(data))
}

/// Pack `dir`, or an empty archive when it does not exist.
pub fn pack_dir_or_empty(dir: &Path) -> Result<Bytes, FleetError> {
    match pack_dir(dir) {
        Err(FleetError::MissingDirectory(_)) => {
            debug!("{} does not exist, sending an empty archive", dir.display());
            empty_archive()
        }
        other => other,
    }
}

pub fn empty_archive() -> Result<Bytes, FleetError> {
    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let tar = Builder::new(encoder);
        let encoder = tar
            .into_inner()
            .map_err(|e| FleetError::Archive(format!("Failed to finalize archive: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| FleetError::Archive(format!("Failed to finalize archive: {}", e)))?;
    }
    Ok(Bytes::from(data))
}

/// Unpack a gzip'd tar into `dest`, creating it if needed.
pub fn unpack(data: &[u8], dest: &Path) -> Result<(), FleetError> {
    fs::create_dir_all(dest)?;
    let decoder = GzDecoder::new(data);
    let mut archive = Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| FleetError::Archive(format!("Failed to extract archive: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_and_unpack_tree() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("server-http")).unwrap();
        fs::write(src.path().join("server-http/app.conf"), "location / {}").unwrap();
        fs::write(src.path().join("top.conf"), "x").unwrap();

        let data = pack_dir(src.path()).unwrap();

        let dest = TempDir::new().unwrap();
        unpack(&data, dest.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dest.path().join("server-http/app.conf")).unwrap(),
            "location / {}"
        );
        assert!(dest.path().join("top.conf").is_file());
    }

    #[test]
    fn test_pack_missing_dir() {
        let err = pack_dir(Path::new("/nonexistent/warden/dir")).unwrap_err();
        assert!(matches!(err, FleetError::MissingDirectory(_)));
    }

    #[test]
    fn test_missing_dir_packs_empty_archive() {
        let data = pack_dir_or_empty(Path::new("/nonexistent/warden/dir")).unwrap();
        let dest = TempDir::new().unwrap();
        unpack(&data, dest.path()).unwrap();
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unpack_garbage() {
        let dest = TempDir::new().unwrap();
        assert!(unpack(b"not an archive", dest.path()).is_err());
    }
}
