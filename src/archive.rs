//! Archive packing.
//!
//! Packs a finished export directory into a `.tar.gz` with a plain
//! recursive walk. Also home to the platform-neutral path helpers used for
//! anything that crosses into the archive.

use std::fs::File;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::Result;

/// Pack `dir` into a gzipped tarball at `archive_path`.
pub fn pack(dir: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Convert a path to the platform-neutral (forward-slash) form used inside
/// the archive.
pub fn to_archive_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert an archive path back to the native separator style.
pub fn to_native_path(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_path_round_trip_is_lossless() {
        for input in ["src/lib.rs", "src\\lib.rs", "deep/nested\\mixed/file.rs"] {
            let neutral = to_archive_path(input);
            assert!(!neutral.contains('\\'));
            let native = to_native_path(&neutral);
            let components: Vec<&str> = native
                .split(std::path::MAIN_SEPARATOR)
                .flat_map(|part| part.split('/'))
                .collect();
            let expected: Vec<&str> = input
                .split(['/', '\\'])
                .collect();
            assert_eq!(components, expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_archive_path_is_idempotent() {
        assert_eq!(to_archive_path("a/b/c"), "a/b/c");
        assert_eq!(to_archive_path(&to_archive_path("a\\b")), "a/b");
    }

    #[test]
    fn test_pack_produces_readable_tarball() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("schema.json"), r#"{"version": "1.2.0"}"#).unwrap();
        fs::create_dir_all(src.path().join("repositories").join("acme")).unwrap();
        fs::write(
            src.path().join("repositories").join("acme").join("marker"),
            "x",
        )
        .unwrap();

        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("export.tar.gz");
        pack(src.path(), &archive_path).unwrap();

        let mut entries = Vec::new();
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&archive_path).unwrap()));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            entries.push(entry.path().unwrap().to_string_lossy().into_owned());
        }
        assert!(entries.iter().any(|e| e.ends_with("schema.json")), "{:?}", entries);
        assert!(
            entries.iter().any(|e| e.contains("repositories/acme")),
            "{:?}",
            entries
        );
    }
}
