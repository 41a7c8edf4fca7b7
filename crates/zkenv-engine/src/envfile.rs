//! Line-oriented `.env` handling
//!
//! Plaintext files are `KEY=VALUE` lines mixed with `#` comments and blank
//! lines. Blanks, comments and lines without `=` pass through byte-for-byte,
//! line ending included. A line with `=` never passes through.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use zkenv_core::ZkenvResult;

/// One line of a plaintext env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlainLine<'a> {
    /// Blank line, comment, or a line without `=`; emitted unchanged.
    Passthrough(&'a str),
    /// A `KEY=VALUE` assignment. The key is trimmed; the value is everything
    /// after the first `=` up to the end of the trimmed line.
    Variable { key: &'a str, value: &'a str },
    /// An assignment with nothing before the `=`. Its text must not be copied out.
    MissingKey,
}

/// Split file contents into lines, keeping each line's terminator.
pub fn lines(contents: &str) -> impl Iterator<Item = &str> {
    contents.split_inclusive('\n')
}

pub fn parse_plain_line(line: &str) -> PlainLine<'_> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return PlainLine::Passthrough(line);
    }
    match stripped.split_once('=') {
        Some((key, _)) if key.trim().is_empty() => PlainLine::MissingKey,
        Some((key, value)) => PlainLine::Variable {
            key: key.trim(),
            value,
        },
        None => PlainLine::Passthrough(line),
    }
}

/// Write `contents` to `path` in one step: private temp file in the same
/// directory, then rename over the destination.
///
/// Readers never observe a half-written file, and an interrupted run leaves
/// the previous destination (if any) untouched. Concurrent writers each get
/// their own temp file; the last rename wins.
pub fn write_atomic(path: &Path, contents: &str) -> ZkenvResult<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    // NamedTempFile is created 0600 on unix and removed on drop if not persisted.
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// [`write_atomic`] on the blocking pool, for async callers.
pub async fn write_atomic_async(path: &Path, contents: String) -> ZkenvResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
        .await
        .map_err(std::io::Error::other)?
}
