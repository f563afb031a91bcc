//! Packing a collected entry list into a `.tar.gz` with a manifest, and
//! unpacking it again.

use crate::policy::PathPolicy;
use ccm_common::{Error, Result};
use ccm_manifest::{validate_entries, FileEntry, Manifest, Provenance, MANIFEST_FILENAME};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, HeaderMode};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Turns a directory tree into a single file and back.
pub trait Compressor {
    fn compress(&self, source_dir: &Path, archive: &Path) -> Result<()>;

    fn decompress(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// Gzip-compressed tar with deterministic headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzCompressor;

impl Compressor for TarGzCompressor {
    fn compress(&self, source_dir: &Path, archive: &Path) -> Result<()> {
        let file = File::create(archive)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);

        for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(Error::archive)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(Error::archive)?;
            add_file_to_archive(&mut builder, entry.path(), relative)?;
        }

        builder.into_inner()?.finish()?;
        Ok(())
    }

    fn decompress(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.unpack(dest_dir)?;
        Ok(())
    }
}

fn add_file_to_archive<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &Path,
    relative: &Path,
) -> Result<()> {
    let metadata = fs::metadata(path)?;
    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);

    builder.append_data(&mut header, relative, File::open(path)?)?;
    Ok(())
}

/// Result of unpacking an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpacked {
    /// The archive carried a manifest.
    Manifest(Manifest),
    /// Older or foreign archive without a manifest.
    NoManifest,
}

/// Materializes entries into a staging tree and compresses it.
pub struct Archiver<C: Compressor = TarGzCompressor> {
    compressor: C,
    provenance: Provenance,
}

impl Archiver<TarGzCompressor> {
    pub fn new(provenance: Provenance) -> Self {
        Self::with_compressor(TarGzCompressor, provenance)
    }
}

impl<C: Compressor> Archiver<C> {
    pub fn with_compressor(compressor: C, provenance: Provenance) -> Self {
        Self {
            compressor,
            provenance,
        }
    }

    /// Write `entries` and a manifest into a single archive at `dest`.
    ///
    /// Entries must be unique, stay inside the archive root and avoid every
    /// never-migrate name. The staging directory is created beside `dest` and
    /// removed on every exit path.
    pub fn pack(&self, entries: &[FileEntry], dest: &Path) -> Result<PathBuf> {
        let check = validate_entries(entries, PathPolicy::standard().never_migrate);
        if let Some(problem) = check.errors.first() {
            return Err(Error::archive(problem));
        }

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".ccm-stage-")
            .tempdir_in(&parent)?;
        debug!("Staging archive in {:?}", staging.path());

        for entry in entries {
            stage_entry(staging.path(), entry)?;
        }

        let manifest = Manifest::new(&self.provenance, entries);
        fs::write(
            staging.path().join(MANIFEST_FILENAME),
            manifest.to_pretty_json()?,
        )?;

        self.compressor.compress(staging.path(), dest)?;

        if let Err(e) = staging.close() {
            warn!("Failed to remove staging directory: {}", e);
        }

        info!("Created archive: {:?}", dest);
        Ok(dest.to_path_buf())
    }

    /// Extract `archive` into `dest` and read its manifest, if any.
    pub fn unpack(&self, archive: &Path, dest: &Path) -> Result<Unpacked> {
        fs::create_dir_all(dest)?;
        self.compressor.decompress(archive, dest)?;

        let manifest_path = dest.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            return Ok(Unpacked::NoManifest);
        }

        let bytes = fs::read(&manifest_path)?;
        Ok(Unpacked::Manifest(Manifest::from_slice(&bytes)?))
    }
}

fn stage_entry(staging: &Path, entry: &FileEntry) -> Result<()> {
    let dest = staging.join(&entry.relative_path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match &entry.inline_content {
        Some(content) => fs::write(&dest, content)?,
        None => {
            fs::copy(&entry.source_path, &dest).map_err(|e| {
                Error::Archive(format!(
                    "Failed to copy {:?} to {}: {}",
                    entry.source_path, entry.relative_path, e
                ))
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_manifest::SECRETS_SENTINEL;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn provenance() -> Provenance {
        Provenance {
            source_host: "laptop".to_string(),
            tool_version: Some("2.1.0".to_string()),
        }
    }

    fn source_tree(root: &Path) -> Vec<FileEntry> {
        fs::create_dir_all(root.join("agents")).unwrap();
        fs::write(root.join("CLAUDE.md"), "# Memory\n").unwrap();
        fs::write(root.join("agents").join("reviewer.md"), "review things").unwrap();
        vec![
            FileEntry::file(root.join("CLAUDE.md"), "CLAUDE.md"),
            FileEntry::file(root.join("agents").join("reviewer.md"), "agents/reviewer.md"),
            FileEntry::inline(
                root.join("claude.json"),
                SECRETS_SENTINEL,
                "{\n  \"mcpServers\": {}\n}",
            ),
        ]
    }

    #[test]
    fn test_pack_then_unpack() {
        let dir = tempdir().unwrap();
        let entries = source_tree(&dir.path().join("src"));
        let archive_path = dir.path().join("out").join("backup.tar.gz");

        let archiver = Archiver::new(provenance());
        let written = archiver.pack(&entries, &archive_path).unwrap();
        assert_eq!(written, archive_path);

        let dest = dir.path().join("restored");
        let manifest = match archiver.unpack(&archive_path, &dest).unwrap() {
            Unpacked::Manifest(m) => m,
            Unpacked::NoManifest => panic!("manifest missing"),
        };

        let listed: Vec<&str> = manifest.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(listed, vec!["CLAUDE.md", "agents/reviewer.md", SECRETS_SENTINEL]);
        assert_eq!(manifest.source_host, "laptop");
        assert_eq!(manifest.claude_version.as_deref(), Some("2.1.0"));

        assert_eq!(fs::read_to_string(dest.join("CLAUDE.md")).unwrap(), "# Memory\n");
        assert_eq!(
            fs::read_to_string(dest.join("agents/reviewer.md")).unwrap(),
            "review things"
        );
        assert_eq!(
            fs::read_to_string(dest.join(SECRETS_SENTINEL)).unwrap(),
            "{\n  \"mcpServers\": {}\n}"
        );
    }

    #[test]
    fn test_staging_is_removed() {
        let dir = tempdir().unwrap();
        let entries = source_tree(&dir.path().join("src"));
        let out = dir.path().join("out");
        Archiver::new(provenance())
            .pack(&entries, &out.join("a.tar.gz"))
            .unwrap();

        let names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tar.gz".to_string()]);
    }

    #[test]
    fn test_failed_pack_removes_staging() {
        let dir = tempdir().unwrap();
        let entries = vec![FileEntry::file(dir.path().join("nope"), "CLAUDE.md")];
        let out = dir.path().join("out");

        let result = Archiver::new(provenance()).pack(&entries, &out.join("a.tar.gz"));
        assert!(matches!(result, Err(Error::Archive(_))));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let entries = vec![FileEntry::inline("/x", "../evil", "x")];
        let result = Archiver::new(provenance()).pack(&entries, &dir.path().join("a.tar.gz"));
        assert!(matches!(result, Err(Error::Archive(_))));
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn test_rejects_never_migrate_entries() {
        let dir = tempdir().unwrap();
        let entries = vec![FileEntry::inline("/x", "projects/app/session.jsonl", "{}")];
        let dest = dir.path().join("a.tar.gz");
        match Archiver::new(provenance()).pack(&entries, &dest) {
            Err(Error::Archive(message)) => assert!(message.contains("projects/app/session.jsonl")),
            other => panic!("expected an archive error, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_archive_without_manifest() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("settings.json"), "{}").unwrap();
        let archive = dir.path().join("foreign.tar.gz");
        TarGzCompressor.compress(&tree, &archive).unwrap();

        let dest = dir.path().join("dest");
        let result = Archiver::new(provenance()).unpack(&archive, &dest).unwrap();
        assert_eq!(result, Unpacked::NoManifest);
        assert!(dest.join("settings.json").is_file());
    }

    #[test]
    fn test_unreadable_archive_is_an_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        let result = Archiver::new(provenance()).unpack(&archive, &dir.path().join("dest"));
        assert!(result.is_err());
    }

    #[test]
    fn test_compression_is_deterministic() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("hooks")).unwrap();
        fs::write(tree.join("hooks").join("pre.sh"), "echo hi").unwrap();
        fs::write(tree.join("settings.json"), "{}").unwrap();

        let a = dir.path().join("a.tar.gz");
        let b = dir.path().join("b.tar.gz");
        TarGzCompressor.compress(&tree, &a).unwrap();
        TarGzCompressor.compress(&tree, &b).unwrap();
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_survives() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let script = dir.path().join("statusline.sh");
        fs::write(&script, "#!/bin/sh\necho ok\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let archive = dir.path().join("a.tar.gz");
        Archiver::new(provenance())
            .pack(&[FileEntry::file(&script, "statusline.sh")], &archive)
            .unwrap();

        let dest = dir.path().join("dest");
        Archiver::new(provenance()).unpack(&archive, &dest).unwrap();
        let mode = fs::metadata(dest.join("statusline.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
