//! The uniform parser contract shared by every format carver.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tag::{Tag, TagSet};

/// A file written below `out_dir` by a parser, together with its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarvedFile {
    /// Absolute path of the extracted file; ownership transfers to the caller.
    pub path: PathBuf,
    /// Labels for the extracted file. May be empty when the content is
    /// opaque (decompressor payloads, archive members).
    pub tags: TagSet,
}

impl CarvedFile {
    /// Label a carved output.
    pub fn new(path: PathBuf, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            path,
            tags: tags.into_iter().collect(),
        }
    }
}

/// Successful recognition of a stream starting at the requested offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Number of bytes the stream spans, starting at `base_offset`.
    /// Always greater than zero and never past the end of the host file.
    pub consumed: u64,
    /// Extracted files in stream order.
    pub carved: Vec<CarvedFile>,
    /// Labels for the *input* file itself. Non-empty only when the stream
    /// spans the whole host file (`base_offset == 0` and
    /// `consumed == file_size`).
    pub stream_tags: TagSet,
}

impl Extraction {
    /// A stream that is the entire host file: labels, nothing carved.
    pub fn whole_file(consumed: u64, stream_tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            consumed,
            carved: Vec::new(),
            stream_tags: stream_tags.into_iter().collect(),
        }
    }

    /// An embedded stream: carved outputs, no stream labels.
    pub fn embedded(consumed: u64, carved: Vec<CarvedFile>) -> Self {
        Self {
            consumed,
            carved,
            stream_tags: TagSet::new(),
        }
    }
}

/// A parse failure, reported as a value.
///
/// `offset` is the absolute position at which the inconsistency was
/// detected, not the offset the parse started from. Format violations are
/// non-fatal; only environment failures (I/O errors, disk full) carry
/// `fatal = true` and tell the caller to stop all further work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason} (offset {offset})")]
pub struct ParseError {
    /// Absolute file offset where the inconsistency was detected.
    pub offset: u64,
    /// Human-readable description of the violation.
    pub reason: String,
    /// Whether the caller should stop probing entirely.
    pub fatal: bool,
}

impl ParseError {
    /// A format violation at `offset`.
    pub fn new(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
            fatal: false,
        }
    }

    /// An environment failure at `offset`; stops all further parsing.
    pub fn io(offset: u64, err: std::io::Error) -> Self {
        Self {
            offset,
            reason: format!("I/O error: {err}"),
            fatal: true,
        }
    }
}

/// Every parser returns either a recognised stream or an error value.
pub type ParseResult = Result<Extraction, ParseError>;

/// The uniform entry point: `(path, base_offset, out_dir, tmp_dir)`.
pub type ParseFn = fn(&Path, u64, &Path, &Path) -> ParseResult;

/// A format carver as a record of handles; the dispatch table is a plain
/// slice of these rather than a trait hierarchy.
#[derive(Clone, Copy)]
pub struct FormatParser {
    /// Short lowercase format name, e.g. `"webp"`.
    pub name: &'static str,
    /// The parser entry point.
    pub parse: ParseFn,
}
