//! Decompressors for the GBA BIOS compression formats.
//!
//! Every format here starts with the same four-byte header: a byte
//! identifying the format, followed by the decompressed length as a 24-bit
//! little-endian integer. Each decompressor comes in two flavors:
//! - `decode()`, which produces the decompressed bytes, and
//! - `dryrun()`, which walks exactly the same state machine but only counts,
//!   making it cheap enough to probe every offset of a ROM with.
//!
//! Both flavors leave their `Cursor` just past the last byte of the stream,
//! so the difference between its starting and ending positions is the
//! compressed size.
//!
//! Decompressors never trust their input: every read is bounds-checked, and
//! every write is checked against the declared length before it happens.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

use crate::error;
use crate::map::MemoryMap;
use crate::rom::Cursor;

pub mod huffman;
pub mod lz77;
pub mod rle;

/// A way of encoding the bytes of a ROM region.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Codec {
  /// Plain, uncompressed bytes.
  Raw,
  /// The BIOS's LZ77 variant, `LZ77UnCompWram` and friends.
  #[serde(rename = "LZ77")]
  Lz77,
  /// The BIOS's Huffman variant, `HuffUnComp`.
  Huffman,
  /// The BIOS's run-length variant, `RLUnCompWram` and friends.
  RunLength,
  /// A Huffman stream whose decompressed bytes are themselves an LZ77
  /// stream.
  #[serde(rename = "HUFFMAN_OVER_LZ77")]
  HuffmanOverLz77,
}

impl Codec {
  /// All codecs, in declaration order.
  pub const ALL: [Codec; 5] = [
    Codec::Raw,
    Codec::Lz77,
    Codec::Huffman,
    Codec::RunLength,
    Codec::HuffmanOverLz77,
  ];

  /// Returns the name this codec goes by in project files and on the
  /// command line.
  pub fn name(self) -> &'static str {
    match self {
      Self::Raw => "RAW",
      Self::Lz77 => "LZ77",
      Self::Huffman => "HUFFMAN",
      Self::RunLength => "RUN_LENGTH",
      Self::HuffmanOverLz77 => "HUFFMAN_OVER_LZ77",
    }
  }

  /// Guesses a codec from the first byte of a stream.
  ///
  /// This only looks at the format nibble; a `Some` result says nothing about
  /// whether the stream actually decodes.
  pub fn from_magic(byte: u8) -> Option<Self> {
    match byte {
      lz77::MAGIC => Some(Self::Lz77),
      rle::MAGIC => Some(Self::RunLength),
      b if b >> 4 == huffman::TYPE => Some(Self::Huffman),
      _ => None,
    }
  }

  /// Decodes a stream starting at `cursor`.
  ///
  /// Raw regions have no stream grammar, and can't be decoded by this
  /// function; see [`resolve`] instead.
  ///
  /// [`resolve`]: fn.resolve.html
  pub fn decode(self, cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
    match self {
      Self::Raw => {
        Err(Error::new(self, cursor.pos(), ErrorType::NotCompressed))
      }
      Self::Lz77 => lz77::decode(cursor),
      Self::Huffman => huffman::decode(cursor),
      Self::RunLength => rle::decode(cursor),
      Self::HuffmanOverLz77 => {
        let start = cursor.pos();
        let inner = huffman::decode(cursor)?;
        lz77::decode(&mut Cursor::new(&inner))
          .map_err(|e| e.nested(Self::HuffmanOverLz77, start))
      }
    }
  }

  /// Walks a stream starting at `cursor` without producing any output.
  ///
  /// The declared decompressed length must lie within `bounds`, or this
  /// function fails with an `ErrorType::OutOfRange` error. `cancel` is polled
  /// once per flag byte (or output byte, for Huffman streams).
  ///
  /// For `HuffmanOverLz77`, the outer Huffman layer must be materialized to
  /// reach the LZ77 header, polling `cancel` as it goes; `bounds` applies to
  /// the final length.
  pub fn dryrun(
    self,
    cursor: &mut Cursor,
    bounds: Bounds,
    cancel: &dyn Cancel,
  ) -> Result<DryRun, Error> {
    match self {
      Self::Raw => {
        Err(Error::new(self, cursor.pos(), ErrorType::NotCompressed))
      }
      Self::Lz77 => lz77::dryrun(cursor, bounds, cancel),
      Self::Huffman => huffman::dryrun(cursor, bounds, cancel),
      Self::RunLength => rle::dryrun(cursor, bounds, cancel),
      Self::HuffmanOverLz77 => {
        let start = cursor.pos();
        let (inner, flow) = huffman::materialize(cursor, cancel)?;
        if flow == Flow::Cancelled {
          return Ok(DryRun::Cancelled);
        }
        let consumed = (cursor.pos() - start) as u32;
        let outcome = lz77::dryrun(&mut Cursor::new(&inner), bounds, cancel)
          .map_err(|e| e.nested(Self::HuffmanOverLz77, start))?;
        Ok(match outcome {
          DryRun::Sized(sizes) => DryRun::Sized(Sizes {
            consumed,
            decoded: sizes.decoded,
          }),
          DryRun::Cancelled => DryRun::Cancelled,
        })
      }
    }
  }
}

impl fmt::Display for Codec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Codec {
  type Err = String;

  /// Parses a codec name, case-insensitively. A few short aliases are
  /// accepted as well.
  fn from_str(s: &str) -> Result<Self, String> {
    let upper = s.to_ascii_uppercase().replace('-', "_");
    let codec = match upper.as_str() {
      "RLE" => Some(Self::RunLength),
      "LZ" => Some(Self::Lz77),
      "HUFF" => Some(Self::Huffman),
      name => Self::ALL.iter().copied().find(|c| c.name() == name),
    };
    codec.ok_or_else(|| format!("unknown codec: {}", s))
  }
}

/// Plausibility bounds on the decompressed length of a stream.
///
/// Scanners use these to throw out streams that are well-formed but
/// obviously bogus, such as a three-byte "image".
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Bounds {
  /// The smallest acceptable length, inclusive.
  pub min: u32,
  /// The largest acceptable length, inclusive.
  pub max: u32,
}

impl Bounds {
  /// Bounds that accept any length.
  pub const ANY: Bounds = Bounds {
    min: 0,
    max: u32::MAX,
  };

  /// Creates new `Bounds`, with either end optional.
  pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
    Self {
      min: min.unwrap_or(Self::ANY.min),
      max: max.unwrap_or(Self::ANY.max),
    }
  }

  /// Returns whether `len` is within these bounds.
  pub fn contains(self, len: u32) -> bool {
    self.min <= len && len <= self.max
  }
}

impl Default for Bounds {
  fn default() -> Self {
    Self::ANY
  }
}

/// A cooperative cancellation flag, polled by long-running work.
pub trait Cancel {
  /// Returns whether the work polling this flag should stop.
  fn is_cancelled(&self) -> bool;
}

/// A `Cancel` that never fires.
#[derive(Copy, Clone, Debug, Default)]
pub struct Never;

impl Cancel for Never {
  fn is_cancelled(&self) -> bool {
    false
  }
}

impl Cancel for AtomicBool {
  fn is_cancelled(&self) -> bool {
    self.load(Ordering::Relaxed)
  }
}

impl<C: Cancel + ?Sized> Cancel for &C {
  fn is_cancelled(&self) -> bool {
    (**self).is_cancelled()
  }
}

/// The result of a dry run that didn't fail.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DryRun {
  /// The stream is well-formed, with the given sizes.
  Sized(Sizes),
  /// The dry run was asked to stop before it reached the end of the stream.
  Cancelled,
}

/// The sizes of a well-formed compressed stream.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Sizes {
  /// The number of compressed bytes, header included.
  pub consumed: u32,
  /// The number of bytes the stream decompresses to.
  pub decoded: u32,
}

/// A type of decompression error.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ErrorType {
  /// Indicates that the header byte doesn't identify the expected format.
  BadMagic {
    /// The header byte (or, for Huffman, its top nibble) we wanted.
    expected: u8,
    /// The header byte we got.
    got: u8,
  },
  /// Indicates a Huffman stream with a symbol width other than 4 or 8.
  BadDepth(u8),
  /// Indicates a header declaring zero bytes of output.
  ZeroLength,
  /// Indicates that the stream ran off the end of the input.
  Truncated,
  /// Indicates that a Huffman tree node points outside of the tree.
  TreeOutOfRange(usize),
  /// Indicates that walking a Huffman tree took too many steps, which means
  /// its nodes are shared or otherwise malformed.
  LoopDetected,
  /// Indicates a Huffman bit sequence that doesn't lead to any leaf.
  BadCode,
  /// Indicates an LZ77 back-reference that would write past the declared
  /// length.
  ReferenceOverflow,
  /// Indicates a run-length run that would write past the declared length.
  RunOverflow,
  /// Indicates an attempt to decode a raw region.
  NotCompressed,
  /// Indicates a well-formed stream whose declared length is implausible.
  OutOfRange {
    /// The declared decompressed length.
    len: u32,
    /// The bounds it fell outside of.
    bounds: Bounds,
  },
}

/// A decompression error.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Error {
  /// The type of the error.
  pub inner: ErrorType,
  /// The codec that hit the error.
  pub codec: Codec,
  /// The input position at which the error was detected.
  pub offset: usize,
}

impl Error {
  /// Creates a new `Error`.
  pub fn new(codec: Codec, offset: usize, inner: ErrorType) -> Self {
    Self {
      inner,
      codec,
      offset,
    }
  }

  /// Returns whether this error means the stream doesn't follow the format's
  /// grammar.
  pub fn is_format(&self) -> bool {
    !self.is_range()
  }

  /// Returns whether this error means the stream was well-formed but
  /// rejected for its size.
  pub fn is_range(&self) -> bool {
    matches!(self.inner, ErrorType::OutOfRange { .. })
  }

  /// Re-labels an error from an inner layer of a stacked codec.
  ///
  /// Inner positions don't correspond to anything in the ROM, so the error is
  /// pinned to the start of the outer stream.
  fn nested(self, codec: Codec, offset: usize) -> Self {
    Self {
      inner: self.inner,
      codec,
      offset,
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}: ", self.codec)?;
    match &self.inner {
      ErrorType::BadMagic { expected, got } => {
        write!(f, "bad header byte 0x{:02x}, expected 0x{:02x}", got, expected)
      }
      ErrorType::BadDepth(depth) => write!(f, "bad symbol width {}", depth),
      ErrorType::ZeroLength => write!(f, "declared length is zero"),
      ErrorType::Truncated => write!(f, "unexpected end of input"),
      ErrorType::TreeOutOfRange(node) => {
        write!(f, "tree node {} is outside of the tree", node)
      }
      ErrorType::LoopDetected => write!(f, "loop detected in tree"),
      ErrorType::BadCode => write!(f, "bit sequence matches no tree leaf"),
      ErrorType::ReferenceOverflow => {
        write!(f, "back-reference overflows the declared length")
      }
      ErrorType::RunOverflow => write!(f, "run overflows the declared length"),
      ErrorType::NotCompressed => write!(f, "raw data has no stream to decode"),
      ErrorType::OutOfRange { len, bounds } => write!(
        f,
        "length {} is outside of {}..={}",
        len, bounds.min, bounds.max
      ),
    }
  }
}

impl std::error::Error for Error {}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Offset(self.offset as u32)
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Decoding)
  }
}

/// Decodes `region` out of `rom`, returning the decoded bytes along with a
/// copy of `region` whose `byte_length` is the number of bytes the codec
/// actually consumed and whose `byte_payload` is the decoded length.
///
/// Raw regions decode to their own bytes, and must have a length.
pub fn resolve(
  rom: &[u8],
  region: &MemoryMap,
) -> Result<(MemoryMap, Vec<u8>), Error> {
  let codec = region.codec();
  let start = region.byte_offset as usize;
  let mut cursor = Cursor::at(rom, start);

  let bytes = match codec {
    Codec::Raw => {
      let len = region.byte_length.unwrap_or(0) as usize;
      cursor
        .read_bytes(len)
        .ok_or_else(|| Error::new(codec, start, ErrorType::Truncated))?
        .to_vec()
    }
    _ => codec.decode(&mut cursor)?,
  };

  let mut resolved = region.clone();
  resolved.byte_length = Some((cursor.pos() - start) as u32);
  resolved.byte_payload = Some(bytes.len() as u32);
  Ok((resolved, bytes))
}

/// Whether a state machine ran to completion.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Flow {
  Done,
  Cancelled,
}

/// An output for a decompressor's state machine.
///
/// `Vec<u8>` materializes the output; `Counter` only tracks its length.
pub(crate) trait Sink {
  /// Returns how many bytes have been output so far.
  fn len(&self) -> usize;
  /// Outputs a single byte.
  fn push(&mut self, byte: u8);
  /// Outputs `n` copies of `byte`.
  fn push_n(&mut self, byte: u8, n: usize);
  /// Outputs a copy of `bytes`.
  fn push_all(&mut self, bytes: &[u8]);
  /// Outputs `n` bytes, each copied from `distance` bytes behind it.
  ///
  /// Copying from before the start of the output yields zeroes.
  fn copy_back(&mut self, distance: usize, n: usize);
}

impl Sink for Vec<u8> {
  fn len(&self) -> usize {
    Vec::len(self)
  }

  fn push(&mut self, byte: u8) {
    Vec::push(self, byte)
  }

  fn push_n(&mut self, byte: u8, n: usize) {
    let len = Vec::len(self);
    self.resize(len + n, byte)
  }

  fn push_all(&mut self, bytes: &[u8]) {
    self.extend_from_slice(bytes)
  }

  fn copy_back(&mut self, distance: usize, n: usize) {
    // The source may overlap the bytes being written, so this has to go one
    // byte at a time.
    for _ in 0..n {
      let len = Vec::len(self);
      let byte = match len.checked_sub(distance) {
        Some(src) => self[src],
        None => 0,
      };
      Vec::push(self, byte);
    }
  }
}

/// A `Sink` that discards its output.
#[derive(Copy, Clone, Default, Debug)]
pub(crate) struct Counter(usize);

impl Sink for Counter {
  fn len(&self) -> usize {
    self.0
  }

  fn push(&mut self, _: u8) {
    self.0 += 1
  }

  fn push_n(&mut self, _: u8, n: usize) {
    self.0 += n
  }

  fn push_all(&mut self, bytes: &[u8]) {
    self.0 += bytes.len()
  }

  fn copy_back(&mut self, _: usize, n: usize) {
    self.0 += n
  }
}

/// Reads a byte for `codec`, failing with `ErrorType::Truncated`.
pub(crate) fn read_u8(cursor: &mut Cursor, codec: Codec) -> Result<u8, Error> {
  let pos = cursor.pos();
  cursor
    .read_u8()
    .ok_or_else(|| Error::new(codec, pos, ErrorType::Truncated))
}

/// Reads the 24-bit length that follows every header byte, rejecting zero.
pub(crate) fn read_len(
  cursor: &mut Cursor,
  codec: Codec,
) -> Result<u32, Error> {
  let pos = cursor.pos();
  let len = cursor
    .read_u24()
    .ok_or_else(|| Error::new(codec, pos, ErrorType::Truncated))?
    .to_u32();
  if len == 0 {
    return Err(Error::new(codec, pos, ErrorType::ZeroLength));
  }
  Ok(len)
}

/// Reads a one-byte magic number followed by a length, as used by the LZ77
/// and run-length formats.
pub(crate) fn read_header(
  cursor: &mut Cursor,
  codec: Codec,
  magic: u8,
) -> Result<u32, Error> {
  let pos = cursor.pos();
  let got = read_u8(cursor, codec)?;
  if got != magic {
    return Err(Error::new(
      codec,
      pos,
      ErrorType::BadMagic {
        expected: magic,
        got,
      },
    ));
  }
  read_len(cursor, codec)
}

/// Checks a declared length against `bounds`.
pub(crate) fn check_bounds(
  codec: Codec,
  start: usize,
  len: u32,
  bounds: Bounds,
) -> Result<(), Error> {
  if bounds.contains(len) {
    Ok(())
  } else {
    Err(Error::new(codec, start, ErrorType::OutOfRange { len, bounds }))
  }
}

/// Packages up the sizes of a finished dry run.
pub(crate) fn sized(
  flow: Flow,
  start: usize,
  end: usize,
  decoded: u32,
) -> DryRun {
  match flow {
    Flow::Done => DryRun::Sized(Sizes {
      consumed: (end - start) as u32,
      decoded,
    }),
    Flow::Cancelled => DryRun::Cancelled,
  }
}
