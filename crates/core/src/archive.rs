//! Configuration archive creation
//!
//! Packs a Terraform working directory into the gzip-compressed tar that a
//! configuration version accepts. Tool state directories (`.git`,
//! `.terraform`) are left out.
//!
//! # Determinism
//! - Entries are sorted lexicographically per directory
//! - Every header has mtime 0, uid/gid 0 and empty owner names
//! - The gzip header carries mtime 0

use crate::errors::ArchiveError;
use crate::observability;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default archive file name
pub const DEFAULT_ARCHIVE_NAME: &str = "terraform.tar.gz";

/// Directory names never included in the archive
pub const EXCLUDED_DIRS: &[&str] = &[".git", ".terraform"];

/// Result of a successful archive build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Archive-relative paths of the packed files, in archive order
    pub files: Vec<String>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Pack every regular file under `source_dir` into `dest`
///
/// Paths inside the archive are relative to `source_dir`. If `dest` lives
/// inside `source_dir` it is not packed into itself.
pub fn create_archive(source_dir: &Path, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
    let span = observability::archive_create_span(source_dir);
    let _guard = span.enter();

    if !source_dir.is_dir() {
        return Err(ArchiveError::NotADirectory {
            path: source_dir.display().to_string(),
        });
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let file = File::create(dest).map_err(io_error(dest))?;
    let dest_canonical = dest.canonicalize().map_err(io_error(dest))?;

    let encoder = flate2::GzBuilder::new()
        .mtime(0)
        .write(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut files = Vec::new();
    add_dir(&mut builder, source_dir, source_dir, &dest_canonical, &mut files)?;

    let encoder = builder.into_inner().map_err(io_error(dest))?;
    encoder.finish().map_err(io_error(dest))?;

    span.record("files", files.len());
    info!(
        files = files.len(),
        "Created archive {} from {}",
        dest.display(),
        source_dir.display()
    );
    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        files,
    })
}

fn add_dir(
    builder: &mut tar::Builder<GzEncoder<File>>,
    dir: &Path,
    base: &Path,
    dest: &Path,
    files: &mut Vec<String>,
) -> Result<(), ArchiveError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        entries.push(entry.map_err(io_error(dir))?);
    }
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_error(&path))?;

        if file_type.is_dir() {
            let name = entry.file_name();
            if EXCLUDED_DIRS.iter().any(|excluded| name == *excluded) {
                debug!("Skipping {}", path.display());
                continue;
            }
            add_dir(builder, &path, base, dest, files)?;
        } else if file_type.is_file() {
            if path.canonicalize().ok().as_deref() == Some(dest) {
                continue;
            }
            let relative = path.strip_prefix(base).unwrap_or(&path);
            append_file(builder, &path, relative)?;
            debug!("Added {}", relative.display());
            files.push(relative.to_string_lossy().replace('\\', "/"));
        } else {
            warn!("Skipping {} (not a regular file)", path.display());
        }
    }
    Ok(())
}

fn append_file(
    builder: &mut tar::Builder<GzEncoder<File>>,
    path: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    let metadata = file.metadata().map_err(io_error(path))?;

    let mut header = tar::Header::new_gnu();
    header.set_path(relative).map_err(io_error(path))?;
    header.set_size(metadata.len());
    header.set_mode(file_mode(&metadata));
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("").map_err(io_error(path))?;
    header.set_groupname("").map_err(io_error(path))?;
    header.set_cksum();

    builder.append(&header, &mut file).map_err(io_error(path))
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
