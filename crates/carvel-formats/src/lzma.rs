//! LZMA-alone and XZ carvers sharing one streaming decode routine.
//!
//! Both formats are framed by the decoder itself: feeding windows into a
//! liblzma stream until it reports end-of-stream leaves `total_in()` as the
//! exact compressed length, which is the carving boundary. LZMA-alone gets a
//! preflight on the declared uncompressed size to weed out the many false
//! positives its weak magic allows.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use xz2::stream::{Action, Status, Stream};

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, create_carve_file,
    open_input,
};

/// First probe window; a stream that cannot start decoding inside this is
/// not worth pursuing.
const FIRST_WINDOW: usize = 900_000;
/// Follow-up feed windows.
const WINDOW: usize = 10 * 1024 * 1024;
/// XZ Utils cannot create or unpack files of 256 GiB or more.
const MAX_DECLARED_SIZE: u64 = 274_877_906_944;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lzma,
    Xz,
}

impl Kind {
    /// Uppercase name used in error text.
    fn display(self) -> &'static str {
        match self {
            Kind::Lzma => "LZMA",
            Kind::Xz => "XZ",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Lzma => "lzma",
            Kind::Xz => "xz",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Kind::Lzma => ".lzma",
            Kind::Xz => ".xz",
        }
    }

    fn tag(self) -> Tag {
        match self {
            Kind::Lzma => Tag::Lzma,
            Kind::Xz => Tag::Xz,
        }
    }

    fn decoder(self) -> Result<Stream, xz2::stream::Error> {
        match self {
            Kind::Lzma => Stream::new_lzma_decoder(u64::MAX),
            // No CONCATENATED flag: the decoder must stop at the stream
            // footer so the carving boundary is exact.
            Kind::Xz => Stream::new_stream_decoder(u64::MAX, 0),
        }
    }
}

/// Verify and unpack an LZMA-alone stream at `base_offset`.
pub fn parse_lzma(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < 13 {
        return Err(ParseError::new(base_offset, "not enough bytes"));
    }

    // Bytes 5..13 of the header hold the uncompressed size; all-ones means
    // the size is unknown and the stream ends with an end marker.
    cursor.seek_to(base_offset + 5)?;
    let declared = cursor.u64_le()?;
    let expected = if declared == u64::MAX {
        None
    } else {
        if declared == 0 {
            return Err(ParseError::new(base_offset, "declared size 0"));
        }
        if declared > MAX_DECLARED_SIZE {
            return Err(ParseError::new(base_offset, "declared size too big"));
        }
        Some(declared)
    };

    cursor.seek_to(base_offset)?;
    unpack_stream(cursor, path, base_offset, out_dir, Kind::Lzma, expected)
}

/// Verify and unpack an XZ stream at `base_offset`.
pub fn parse_xz(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;
    unpack_stream(cursor, path, base_offset, out_dir, Kind::Xz, None)
}

fn unpack_stream<R: Read + Seek>(
    mut cursor: ByteCursor<R>,
    path: &Path,
    base_offset: u64,
    out_dir: &Path,
    kind: Kind,
    expected: Option<u64>,
) -> ParseResult {
    let file_size = cursor.file_size();
    let mut stream = kind
        .decoder()
        .map_err(|e| ParseError::io(base_offset, std::io::Error::other(e)))?;

    let source_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let out_name = source_name
        .strip_suffix(kind.extension())
        .filter(|stem| !stem.is_empty())
        .map_or_else(|| format!("unpacked-from-{}", kind.name()), str::to_owned);
    let dest = out_dir.join(out_name);

    let mut output = create_carve_file(&dest)?;
    let fed = feed_stream(&mut cursor, &mut stream, &mut output, kind, base_offset);
    drop(output);
    if let Err(e) = fed {
        let _ = std::fs::remove_file(&dest);
        return Err(e);
    }

    let consumed = stream.total_in();
    let decoded = stream.total_out();

    // Streams that decode to nothing are bogus matches, not carves.
    if decoded == 0 {
        let _ = std::fs::remove_file(&dest);
        return Err(ParseError::new(
            base_offset + consumed,
            format!("File not a valid {} file", kind.display()),
        ));
    }

    if kind == Kind::Lzma {
        if let Some(expected) = expected {
            if expected != decoded {
                let _ = std::fs::remove_file(&dest);
                return Err(ParseError::new(
                    base_offset + consumed,
                    "length of unpacked LZMA data does not correspond with header",
                ));
            }
        }
    }

    debug!(kind = kind.name(), consumed, decoded, "unpacked stream");

    let mut extraction = Extraction::embedded(consumed, vec![CarvedFile::new(dest, [])]);
    if base_offset == 0 && consumed == file_size {
        extraction.stream_tags = [kind.tag(), Tag::Compressed].into_iter().collect();
    }
    Ok(extraction)
}

/// Feed the input window by window until the decoder reports end-of-stream.
fn feed_stream<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    stream: &mut Stream,
    output: &mut File,
    kind: Kind,
    base_offset: u64,
) -> Result<(), ParseError> {
    let mut inbuf = vec![0u8; FIRST_WINDOW];
    let mut outbuf = vec![0u8; 128 * 1024];
    let mut first_window = true;

    loop {
        let filled = cursor.read_up_to(&mut inbuf)?;
        if filled == 0 {
            // Input ran out before the decoder saw an end marker.
            return Err(decode_error(kind, first_window, base_offset, stream.total_in()));
        }

        let mut fed = 0;
        while fed < filled {
            let before_in = stream.total_in();
            let before_out = stream.total_out();
            let status = stream
                .process(&inbuf[fed..filled], &mut outbuf, Action::Run)
                .map_err(|_| decode_error(kind, first_window, base_offset, stream.total_in()))?;
            let took = (stream.total_in() - before_in) as usize;
            let made = (stream.total_out() - before_out) as usize;
            if made > 0 {
                output
                    .write_all(&outbuf[..made])
                    .map_err(|e| ParseError::io(cursor.position(), e))?;
            }
            fed += took;

            match status {
                Status::StreamEnd => return Ok(()),
                _ => {
                    if took == 0 && made == 0 {
                        if fed < filled {
                            // Stuck on bytes the decoder will not accept.
                            return Err(decode_error(
                                kind,
                                first_window,
                                base_offset,
                                stream.total_in(),
                            ));
                        }
                        break;
                    }
                }
            }
        }

        if first_window {
            first_window = false;
            inbuf.resize(WINDOW, 0);
        }
    }
}

fn decode_error(kind: Kind, first_window: bool, base_offset: u64, total_in: u64) -> ParseError {
    let reason = if first_window {
        format!("not valid {} data", kind.display())
    } else {
        format!("File not a valid {} file", kind.display())
    };
    ParseError::new(base_offset + total_in, reason)
}
