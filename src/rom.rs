//! Types and functions for reading GBA ROM images.
//!
//! A GBA cartridge is mapped linearly at `0x0800_0000`, so there is no
//! interesting mapping between bus addresses and image offsets: everything in
//! gbasect is addressed by plain byte offset into the image.
//!
//! The image is held behind an `Arc` so that background scan jobs can read it
//! while the owning thread keeps editing the partition.

use std::fs;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::int::u24;

/// The address at which the cartridge ROM is mapped into the GBA's bus.
pub const BUS_BASE: u32 = 0x0800_0000;

/// An immutable, cheaply clonable ROM image.
#[derive(Clone, Debug)]
pub struct Rom {
  bytes: Arc<[u8]>,
}

impl Rom {
  /// Wraps the given bytes as a ROM image.
  pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
    Self {
      bytes: bytes.into(),
    }
  }

  /// Reads a ROM image from disk.
  pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
    let bytes = fs::read(path)?;
    if bytes.len() > u32::MAX as usize {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "ROM image is larger than 4 GiB",
      ));
    }
    Ok(Self::new(bytes))
  }

  /// Returns the number of bytes in this image.
  pub fn len(&self) -> u32 {
    self.bytes.len() as u32
  }

  /// Returns whether this image is empty.
  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// Returns a `Cursor` positioned at `offset`.
  ///
  /// The cursor may start past the end of the image; any read from it will
  /// then simply fail.
  pub fn cursor_at(&self, offset: u32) -> Cursor<'_> {
    Cursor::at(&self.bytes, offset as usize)
  }

  /// Returns the bytes in `start..end`, clamped to the image.
  pub fn slice(&self, start: u32, end: u32) -> &[u8] {
    let len = self.bytes.len();
    let start = (start as usize).min(len);
    let end = (end as usize).clamp(start, len);
    &self.bytes[start..end]
  }

  /// Parses this image's cartridge header, if it has one.
  pub fn header(&self) -> Option<Header> {
    Header::parse(&self.bytes)
  }

  /// Dumps the (interesting) contents of `start..end` to the given `Write`,
  /// in the usual hexdump layout.
  ///
  /// Rows made entirely of zeroes are skipped.
  pub fn dump(
    &self,
    start: u32,
    end: u32,
    w: impl io::Write,
  ) -> io::Result<()> {
    dump(self.slice(start, end), start, w)
  }
}

impl Deref for Rom {
  type Target = [u8];
  fn deref(&self) -> &[u8] {
    &self.bytes
  }
}

/// Dumps `bytes`, which are assumed to live at `base`, to the given `Write`.
pub fn dump(bytes: &[u8], base: u32, mut w: impl io::Write) -> io::Result<()> {
  let mut ascii_str = String::new();
  let iter = bytes
    .chunks(16)
    .enumerate()
    .filter(|(_, c)| c.iter().any(|&byte| byte != 0));
  for (row, chunk) in iter {
    write!(w, "{:08x}:", base as usize + row * 16)?;

    ascii_str.clear();
    for &byte in chunk {
      write!(w, " {:02x}", byte)?;

      if 0x20 <= byte && byte <= 0x7e {
        ascii_str.push(byte as char);
      } else {
        ascii_str.push('.');
      }
    }
    for _ in chunk.len()..16 {
      write!(w, "   ")?;
    }
    writeln!(w, "  |{}|", ascii_str)?;
  }
  Ok(())
}

/// A bounds-checked read cursor over a byte slice.
///
/// Every read returns `None` instead of panicking when it would run off the
/// end of the underlying bytes; in that case the cursor does not move.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  /// Creates a new `Cursor` at the start of `bytes`.
  pub fn new(bytes: &'a [u8]) -> Self {
    Self::at(bytes, 0)
  }

  /// Creates a new `Cursor` at `pos` within `bytes`.
  pub fn at(bytes: &'a [u8], pos: usize) -> Self {
    Self { bytes, pos }
  }

  /// Returns the current position, as an offset into the underlying bytes.
  pub fn pos(&self) -> usize {
    self.pos
  }

  /// Returns how many bytes are left to read.
  pub fn remaining(&self) -> usize {
    self.bytes.len().saturating_sub(self.pos)
  }

  /// Reads `n` bytes, advancing past them.
  pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
    let end = self.pos.checked_add(n)?;
    let bytes = self.bytes.get(self.pos..end)?;
    self.pos = end;
    Some(bytes)
  }

  /// Reads a single byte.
  pub fn read_u8(&mut self) -> Option<u8> {
    let byte = *self.bytes.get(self.pos)?;
    self.pos += 1;
    Some(byte)
  }

  /// Reads a 24-bit little-endian integer.
  pub fn read_u24(&mut self) -> Option<u24> {
    let b = self.read_bytes(3)?;
    Some(u24::from_le_bytes([b[0], b[1], b[2]]))
  }

  /// Reads a 32-bit little-endian integer.
  pub fn read_u32(&mut self) -> Option<u32> {
    let b = self.read_bytes(4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }

  /// Skips `n` bytes.
  pub fn skip(&mut self, n: usize) -> Option<()> {
    self.read_bytes(n).map(|_| ())
  }
}

/// The cartridge header found at the start of every GBA ROM.
///
/// Only the fields that help identify a dump are kept; the entry point and
/// the Nintendo logo are not interesting here.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Header {
  /// The game title, up to twelve uppercase ASCII characters.
  pub title: String,
  /// The four-character game code, e.g. `AXVE`.
  pub game_code: String,
  /// The two-character maker code, e.g. `01` for Nintendo.
  pub maker_code: String,
  /// The software version number.
  pub version: u8,
  /// The header complement check byte.
  pub complement: u8,
  /// Whether `complement` matches the checksum of the header bytes.
  pub checksum_ok: bool,
}

impl Header {
  /// The length of the cartridge header.
  pub const LEN: u32 = 0xc0;

  /// The byte that must appear at offset `0xb2` of every cartridge.
  pub const FIXED_VALUE: u8 = 0x96;

  /// Parses a header out of the start of `bytes`.
  ///
  /// Returns `None` if `bytes` is too short or doesn't carry the fixed value
  /// every real header has.
  pub fn parse(bytes: &[u8]) -> Option<Self> {
    let header = bytes.get(..Self::LEN as usize)?;
    if header[0xb2] != Self::FIXED_VALUE {
      return None;
    }

    let text = |range: std::ops::Range<usize>| -> String {
      header[range]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| {
          if b.is_ascii_graphic() || b == b' ' {
            b as char
          } else {
            '.'
          }
        })
        .collect()
    };

    let complement = header[0xbd];
    Some(Self {
      title: text(0xa0..0xac),
      game_code: text(0xac..0xb0),
      maker_code: text(0xb0..0xb2),
      version: header[0xbc],
      complement,
      checksum_ok: Self::checksum(header) == complement,
    })
  }

  /// Computes the complement check over header bytes `0xa0..=0xbc`.
  ///
  /// Bytes missing from a short `header` are ignored.
  pub fn checksum(header: &[u8]) -> u8 {
    header
      .iter()
      .skip(0xa0)
      .take(0x1d)
      .fold(0u8, |acc, &b| acc.wrapping_sub(b))
      .wrapping_sub(0x19)
  }
}
