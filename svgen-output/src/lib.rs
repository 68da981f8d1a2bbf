use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("SVG payload is empty")]
    EmptyPayload,
    #[error("output file {path} already exists (pass --force to overwrite)")]
    AlreadyExists { path: PathBuf },
    #[error("output path {path} is a directory")]
    IsDirectory { path: PathBuf },
    #[error("output directory {path} does not exist")]
    MissingDirectory { path: PathBuf },
    #[error("failed to read SVG from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write SVG to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Replace an existing file at the destination.
    pub overwrite: bool,
}

/// Check that `path` can receive output before any expensive work is done.
///
/// The same checks run again inside [`write_svg`]; this only lets callers
/// fail early.
pub fn check_target(path: &Path, options: WriteOptions) -> Result<(), OutputError> {
    if path.is_dir() {
        return Err(OutputError::IsDirectory {
            path: path.to_path_buf(),
        });
    }

    if path.exists() && !options.overwrite {
        return Err(OutputError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    let parent = parent_dir(path);
    if !parent.is_dir() {
        return Err(OutputError::MissingDirectory {
            path: parent.to_path_buf(),
        });
    }

    Ok(())
}

/// Atomically write `markup` to `path`.
///
/// The bytes land in a temporary file next to the destination, which is
/// synced and then moved into place. If anything fails the temporary file is
/// dropped and the destination is left untouched.
pub fn write_svg(path: &Path, markup: &str, options: WriteOptions) -> Result<PathBuf, OutputError> {
    if markup.trim().is_empty() {
        return Err(OutputError::EmptyPayload);
    }

    check_target(path, options)?;

    let parent = parent_dir(path);
    let mut temp = Builder::new()
        .prefix(".svgen-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|source| OutputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    log::debug!("staging output in {}", temp.path().display());

    let io_error = |source: io::Error| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    temp.write_all(markup.as_bytes()).map_err(io_error)?;
    temp.flush().map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;

    let persisted = if options.overwrite {
        temp.persist(path)
    } else {
        temp.persist_noclobber(path)
    };

    match persisted {
        Ok(_) => {
            log::debug!("persisted {} bytes to {}", markup.len(), path.display());
            Ok(path.to_path_buf())
        }
        Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => {
            Err(OutputError::AlreadyExists {
                path: path.to_path_buf(),
            })
        }
        Err(error) => Err(io_error(error.error)),
    }
}

/// Read an SVG document verbatim.
pub fn read_svg(path: &Path) -> Result<String, OutputError> {
    fs::read_to_string(path).map_err(|source| OutputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
