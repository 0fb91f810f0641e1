//! Destination handling for fetched files
//!
//! Name collisions are settled before any data is received: ask whether to
//! overwrite, otherwise pick `<stem>2.<ext>`, `<stem>3.<ext>`, ... Data goes to
//! a temp file beside the destination and only replaces it once the transfer
//! is known to be complete.

use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, TransferError};

// First alternate suffix tried, and the last one before giving up
const FIRST_ALTERNATE: u32 = 2;
const MAX_ALTERNATE: u32 = 99;

/// What to do with data already received when the stream is cut short.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Delete the partial data; the destination is left untouched.
    #[default]
    Discard,
    /// Keep it as `<destination>.partial`.
    Keep,
}

pub trait ConflictResolver {
    /// Return true to overwrite `path`, false to write under a new name.
    fn confirm_overwrite(&mut self, path: &Path) -> io::Result<bool>;
}

/// Interactive y/n question on stdin.
pub struct StdinPrompt;

impl ConflictResolver for StdinPrompt {
    fn confirm_overwrite(&mut self, path: &Path) -> io::Result<bool> {
        print!("Overwrite file \"{}\"? (y/n) ", path.display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

pub struct AlwaysOverwrite;
impl ConflictResolver for AlwaysOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

pub struct NeverOverwrite;
impl ConflictResolver for NeverOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// `notes.txt` + 2 -> `notes2.txt`. A name without an extension gets the
/// number appended.
pub fn alternate_name(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}{}", stem, n),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: PathBuf,
    /// True if the requested name was taken and an alternate chosen.
    pub renamed: bool,
}

/// Settle the local name for `wanted` before receiving anything.
pub fn resolve_destination(
    wanted: &Path,
    resolver: &mut dyn ConflictResolver,
) -> Result<Destination> {
    if !wanted.exists() {
        return Ok(Destination {
            path: wanted.to_path_buf(),
            renamed: false,
        });
    }
    if resolver.confirm_overwrite(wanted)? {
        return Ok(Destination {
            path: wanted.to_path_buf(),
            renamed: false,
        });
    }
    (FIRST_ALTERNATE..=MAX_ALTERNATE)
        .map(|n| alternate_name(wanted, n))
        .find(|p| !p.exists())
        .map(|path| Destination {
            path,
            renamed: true,
        })
        .ok_or_else(|| TransferError::DestinationConflict(wanted.to_path_buf()))
}

/// Path used for data kept after a truncated transfer.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Buffered writer into a temp file next to the destination.
pub struct FileSink {
    dest: PathBuf,
    writer: BufWriter<NamedTempFile>,
    chars: u64,
}

impl FileSink {
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let tmp = NamedTempFile::new_in(&dir)?;
        Ok(FileSink {
            dest: dest.to_path_buf(),
            writer: BufWriter::new(tmp),
            chars: 0,
        })
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.chars += text.chars().count() as u64;
        Ok(())
    }

    /// Characters written so far.
    pub fn chars_written(&self) -> u64 {
        self.chars
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Move the finished file into place, replacing any existing file.
    pub fn commit(self) -> Result<PathBuf> {
        let tmp = self.writer.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(self.dest)
    }

    /// Dispose of an incomplete file. Returns where it was kept, if anywhere.
    pub fn abandon(self, policy: TruncationPolicy) -> Result<Option<PathBuf>> {
        match policy {
            TruncationPolicy::Discard => Ok(None),
            TruncationPolicy::Keep => {
                let target = partial_path(&self.dest);
                let tmp = self.writer.into_inner().map_err(|e| e.into_error())?;
                tmp.persist(&target).map_err(|e| e.error)?;
                Ok(Some(target))
            }
        }
    }
}
