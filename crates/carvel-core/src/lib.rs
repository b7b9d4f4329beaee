//! Core contract for the carvel format carvers.
//!
//! A *carver* recognises a binary stream at an arbitrary offset inside a
//! larger host file, validates its structure, reports the exact number of
//! bytes it spans and, when the stream does not cover the whole file,
//! extracts it into its own output file. This crate holds the pieces every
//! carver shares:
//!
//! - the parse result sum type and error value ([`Extraction`],
//!   [`ParseError`], [`ParseResult`]),
//! - the closed tag vocabulary ([`Tag`], [`TagSet`]),
//! - a bounds-checked random-access byte cursor ([`ByteCursor`]),
//! - the carve writer ([`carve_range`]).
//!
//! The format parsers themselves live in `carvel-formats`.

mod carve;
mod contract;
mod cursor;
mod tag;

pub use carve::{carve_range, create_carve_file};
pub use contract::{CarvedFile, Extraction, FormatParser, ParseError, ParseFn, ParseResult};
pub use cursor::{ByteCursor, open_input};
pub use tag::{Tag, TagSet};
