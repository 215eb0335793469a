//! The BIOS LZ77 format.
//!
//! After the header, the stream is a sequence of blocks, each made of one
//! flag byte followed by eight tokens. Flag bits are read from the most
//! significant down; a clear bit means the token is a single literal byte,
//! and a set bit means it is a two-byte back-reference:
//! ```text
//!   byte 0          byte 1
//! +------+-------+ +----------+
//! | len  | disp  | |   disp   |
//! | 7..4 | 11..8 | |   7..0   |
//! +------+-------+ +----------+
//! ```
//! which copies `len + 3` bytes from `disp + 1` bytes back in the output.
//!
//! Some encoders emit references that reach before the start of the output,
//! as if the window were primed with zeroes. Real ROMs depend on this, so
//! such references produce zeroes rather than an error.

use crate::codec::check_bounds;
use crate::codec::read_header;
use crate::codec::read_u8;
use crate::codec::sized;
use crate::codec::Bounds;
use crate::codec::Cancel;
use crate::codec::Codec;
use crate::codec::Counter;
use crate::codec::DryRun;
use crate::codec::Error;
use crate::codec::ErrorType;
use crate::codec::Flow;
use crate::codec::Never;
use crate::codec::Sink;
use crate::rom::Cursor;

/// The header byte of an LZ77 stream.
pub const MAGIC: u8 = 0x10;

/// The shortest run a back-reference can copy.
pub const MIN_MATCH: usize = 3;

/// Decompresses the LZ77 stream at `cursor`.
pub fn decode(cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
  let len = read_header(cursor, Codec::Lz77, MAGIC)? as usize;
  let mut out = Vec::with_capacity(len);
  // `Never` can't cancel, so this always runs to the end.
  inflate(cursor, &mut out, len, &Never)?;
  Ok(out)
}

/// Walks the LZ77 stream at `cursor`, checking that it's well-formed and
/// measuring it.
pub fn dryrun(
  cursor: &mut Cursor,
  bounds: Bounds,
  cancel: &dyn Cancel,
) -> Result<DryRun, Error> {
  let start = cursor.pos();
  let len = read_header(cursor, Codec::Lz77, MAGIC)?;
  check_bounds(Codec::Lz77, start, len, bounds)?;

  let mut out = Counter::default();
  let flow = inflate(cursor, &mut out, len as usize, cancel)?;
  Ok(sized(flow, start, cursor.pos(), len))
}

fn inflate<S: Sink>(
  cursor: &mut Cursor,
  out: &mut S,
  len: usize,
  cancel: &dyn Cancel,
) -> Result<Flow, Error> {
  while out.len() < len {
    if cancel.is_cancelled() {
      return Ok(Flow::Cancelled);
    }

    let flags = read_u8(cursor, Codec::Lz77)?;
    for bit in (0..8).rev() {
      if out.len() >= len {
        break;
      }

      if flags & (1 << bit) == 0 {
        let byte = read_u8(cursor, Codec::Lz77)?;
        out.push(byte);
        continue;
      }

      let pos = cursor.pos();
      let hi = read_u8(cursor, Codec::Lz77)? as usize;
      let lo = read_u8(cursor, Codec::Lz77)? as usize;
      let n = (hi >> 4) + MIN_MATCH;
      let distance = 1 + lo + ((hi & 0xf) << 8);

      if out.len() + n > len {
        return Err(Error::new(Codec::Lz77, pos, ErrorType::ReferenceOverflow));
      }
      out.copy_back(distance, n);
    }
  }
  Ok(Flow::Done)
}

#[cfg(test)]
pub(crate) mod test {
  use super::*;

  use std::sync::atomic::AtomicBool;

  use crate::codec::Sizes;

  /// A 6x8 sprite of a blob with a darker center.
  pub(crate) const SPRITE: [u8; 32] = [
    0x10, 0x30, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x30, 0x03, 0x01,
    0x01, 0x01, 0x4b, 0x01, 0x10, 0x06, 0x02, 0x02, 0x20, 0x08, 0x01, 0x10,
    0x06, 0x20, 0x10, 0xc0, 0x30, 0x06, 0x40, 0x25,
  ];

  #[test]
  fn sprite() {
    let mut cursor = Cursor::new(&SPRITE);
    let out = decode(&mut cursor).unwrap();
    assert_eq!(cursor.pos(), SPRITE.len());

    let rows = out.chunks(8).collect::<Vec<_>>();
    assert_eq!(
      rows,
      [
        &[0, 0, 0, 0, 0, 0, 0, 0][..],
        &[0, 0, 1, 1, 1, 1, 0, 0][..],
        &[0, 1, 2, 2, 1, 1, 1, 0][..],
        &[0, 1, 2, 1, 1, 1, 1, 0][..],
        &[0, 0, 1, 1, 1, 1, 0, 0][..],
        &[0, 0, 0, 0, 0, 0, 0, 0][..],
      ]
    );
  }

  #[test]
  fn sprite_dryrun() {
    let mut cursor = Cursor::new(&SPRITE);
    let outcome = dryrun(&mut cursor, Bounds::ANY, &Never).unwrap();
    assert_eq!(
      outcome,
      DryRun::Sized(Sizes {
        consumed: 32,
        decoded: 48
      })
    );
  }

  #[test]
  fn dryrun_respects_bounds() {
    let mut cursor = Cursor::new(&SPRITE);
    let err = dryrun(&mut cursor, Bounds::new(Some(64), None), &Never)
      .unwrap_err();
    assert!(err.is_range());
    assert_eq!(
      err.inner,
      ErrorType::OutOfRange {
        len: 48,
        bounds: Bounds::new(Some(64), None)
      }
    );

    let mut cursor = Cursor::new(&SPRITE);
    assert!(dryrun(&mut cursor, Bounds::new(None, Some(47)), &Never).is_err());
    let mut cursor = Cursor::new(&SPRITE);
    let exact = Bounds::new(Some(48), Some(48));
    assert!(dryrun(&mut cursor, exact, &Never).is_ok());
  }

  #[test]
  fn dryrun_cancels() {
    let cancel = AtomicBool::new(true);
    let mut cursor = Cursor::new(&SPRITE);
    assert_eq!(
      dryrun(&mut cursor, Bounds::ANY, &cancel),
      Ok(DryRun::Cancelled)
    );
  }

  #[test]
  fn reference_before_start_yields_zeroes() {
    // A reference as the very first token, with nothing to copy from.
    let stream = [0x10, 0x06, 0x00, 0x00, 0x80, 0x30, 0x09];
    assert_eq!(decode(&mut Cursor::new(&stream)).unwrap(), [0; 6]);

    // A reference that starts two bytes before the output and runs into it.
    let stream = [0x10, 0x04, 0x00, 0x00, 0x40, 0xaa, 0x00, 0x02];
    assert_eq!(
      decode(&mut Cursor::new(&stream)).unwrap(),
      [0xaa, 0x00, 0x00, 0xaa]
    );
  }

  #[test]
  fn overlapping_reference_repeats() {
    // One literal, then a reference one byte back of length 5.
    let stream = [0x10, 0x06, 0x00, 0x00, 0x40, 0x07, 0x20, 0x00];
    assert_eq!(decode(&mut Cursor::new(&stream)).unwrap(), [7; 6]);
  }

  #[test]
  fn malformed_streams() {
    macro_rules! assert_fails {
      ($bytes:expr => $err:pat) => {
        match decode(&mut Cursor::new(&$bytes)) {
          Err(Error { inner: $err, .. }) => {}
          other => panic!("expected {}, got {:?}", stringify!($err), other),
        }
      };
    }

    assert_fails!(
      [0x11, 0x04, 0x00, 0x00] => ErrorType::BadMagic { got: 0x11, .. }
    );
    assert_fails!([0x10, 0x00, 0x00, 0x00, 0x00] => ErrorType::ZeroLength);
    assert_fails!([0x10, 0x04] => ErrorType::Truncated);
    assert_fails!([0x10, 0x04, 0x00, 0x00, 0x00, 0x01] => ErrorType::Truncated);
    // A reference of 3 bytes with only 1 left to write.
    assert_fails!(
      [0x10, 0x03, 0x00, 0x00, 0x20, 0x01, 0x00, 0x00, 0x00]
        => ErrorType::ReferenceOverflow
    );
  }

  #[test]
  fn error_offsets() {
    let stream = [0x10, 0x03, 0x00, 0x00, 0x20, 0x01, 0x00, 0x00, 0x00];
    let err = decode(&mut Cursor::new(&stream)).unwrap_err();
    assert_eq!(err.offset, 7);
    assert_eq!(err.codec, Codec::Lz77);
    assert!(err.is_format());
  }
}
