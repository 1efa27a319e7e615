use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tar::{Archive, Entry};

use super::codec::{open_decoder, Decoder};
use super::ArchiveFormat;
use crate::error::{ArchiveError, Error, Result};

/// Where a regular-file member sits in the container's entry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLocation {
    /// Zero-based position among all entries, not only regular files.
    pub ordinal: usize,
    /// Declared payload size in bytes.
    pub size: u64,
}

/// Name -> location map for one container, built by a single full scan.
///
/// If a member name repeats, the last occurrence wins.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    path: PathBuf,
    format: ArchiveFormat,
    members: HashMap<String, MemberLocation>,
    entry_count: usize,
}

impl ArchiveIndex {
    /// Decompresses the container at `path` once and records every regular
    /// file's ordinal and size. Payloads are skipped, never buffered.
    pub fn build(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ArchiveFormat::detect(path)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(path.display().to_string()))?;

        let decoder = open_decoder(path, format)?;
        let mut archive = Archive::new(decoder);
        let mut members = HashMap::new();
        let mut entry_count = 0;

        let entries = archive.entries().map_err(|err| decode_error(path, err))?;
        for (ordinal, entry) in entries.enumerate() {
            let entry = entry.map_err(|err| decode_error(path, err))?;
            entry_count = ordinal + 1;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry_name(path, &entry)?;
            members.insert(
                name,
                MemberLocation {
                    ordinal,
                    size: entry.size(),
                },
            );
        }

        log::debug!(
            "indexed {} ({} members, {} entries)",
            path.display(),
            members.len(),
            entry_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            members,
            entry_count,
        })
    }

    /// Container this index was built from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compression format detected from the extension.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Number of regular-file members (after name de-duplication).
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Total entries seen during the scan, including non-file entries.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Location of `member`, if the container holds it as a regular file.
    pub fn get(&self, member: &str) -> Option<MemberLocation> {
        self.members.get(member).copied()
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Opens `member` for reading.
    ///
    /// The container is decoded again from the start and entries are skipped
    /// one by one until the recorded ordinal. The entry found there must carry
    /// the requested name; anything else means the index no longer describes
    /// the file on disk.
    pub fn fetch(&self, member: &str) -> Result<MemberReader> {
        let location = self.get(member).ok_or_else(|| ArchiveError::MissingMember {
            path: self.path.clone(),
            member: member.to_string(),
        })?;

        let decoder = open_decoder(&self.path, self.format)?;
        let mut archive = Archive::new(decoder);
        let size = {
            let mut entries = archive
                .entries()
                .map_err(|err| decode_error(&self.path, err))?;
            let entry = match entries.nth(location.ordinal) {
                Some(entry) => entry.map_err(|err| decode_error(&self.path, err))?,
                None => {
                    return Err(ArchiveError::Truncated {
                        path: self.path.clone(),
                    }
                    .into())
                }
            };
            let found = entry_name(&self.path, &entry)?;
            if found != member {
                log::warn!(
                    "stale index for {}: ordinal {} holds {found}, expected {member}",
                    self.path.display(),
                    location.ordinal
                );
                return Err(ArchiveError::Integrity {
                    path: self.path.clone(),
                    expected: member.to_string(),
                    found,
                }
                .into());
            }
            entry.size()
        };

        // The tar reader stops right after the entry header, so the decoder
        // is positioned at the first payload byte.
        Ok(MemberReader {
            inner: archive.into_inner().take(size),
            size,
        })
    }
}

/// Payload of a single container member.
///
/// Owns the file handle and decompressor; both are released when the reader
/// is dropped.
pub struct MemberReader {
    inner: io::Take<Decoder>,
    size: u64,
}

impl MemberReader {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for MemberReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let read = self.inner.read(buf)?;
        if read == 0 && self.inner.limit() > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive member ended before its declared size",
            ));
        }
        Ok(read)
    }
}

fn entry_name<R: Read>(path: &Path, entry: &Entry<'_, R>) -> Result<String> {
    let name = entry.path().map_err(|err| decode_error(path, err))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Only `UnexpectedEof` counts as truncation; every other failure, including
/// tar's own framing errors, is reported as a decode error.
fn decode_error(path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return ArchiveError::Truncated {
            path: path.to_path_buf(),
        }
        .into();
    }
    ArchiveError::Decode {
        path: path.to_path_buf(),
        source: err,
    }
    .into()
}
