//! The BIOS run-length format.
//!
//! After the header, the stream is a sequence of flag bytes, each followed by
//! its data. If bit 7 of the flag is set, one data byte follows, repeated
//! `(flag & 0x7f) + 3` times; otherwise `(flag & 0x7f) + 1` literal bytes
//! follow.

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

/// The header byte of a run-length stream.
pub const MAGIC: u8 = 0x30;

/// Decompresses the run-length stream at `cursor`.
pub fn decode(cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
  let len = read_header(cursor, Codec::RunLength, MAGIC)? as usize;
  let mut out = Vec::with_capacity(len);
  inflate(cursor, &mut out, len, &Never)?;
  Ok(out)
}

/// Walks the run-length stream at `cursor`, checking that it's well-formed
/// and measuring it.
pub fn dryrun(
  cursor: &mut Cursor,
  bounds: Bounds,
  cancel: &dyn Cancel,
) -> Result<DryRun, Error> {
  let start = cursor.pos();
  let len = read_header(cursor, Codec::RunLength, MAGIC)?;
  check_bounds(Codec::RunLength, start, len, bounds)?;

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

    let pos = cursor.pos();
    let flag = read_u8(cursor, Codec::RunLength)?;
    let is_run = flag & 0x80 != 0;
    let n = (flag & 0x7f) as usize + if is_run { 3 } else { 1 };
    if out.len() + n > len {
      return Err(Error::new(Codec::RunLength, pos, ErrorType::RunOverflow));
    }

    if is_run {
      let byte = read_u8(cursor, Codec::RunLength)?;
      out.push_n(byte, n);
    } else {
      let data_pos = cursor.pos();
      let bytes = cursor.read_bytes(n).ok_or_else(|| {
        Error::new(Codec::RunLength, data_pos, ErrorType::Truncated)
      })?;
      out.push_all(bytes);
    }
  }
  Ok(Flow::Done)
}

#[cfg(test)]
mod test {
  use super::*;

  use std::sync::atomic::AtomicBool;

  use crate::codec::Sizes;

  const STREAM: [u8; 10] =
    [0x30, 0x08, 0x00, 0x00, 0x82, 0xaa, 0x02, 0x01, 0x02, 0x03];

  #[test]
  fn runs_and_literals() {
    let mut cursor = Cursor::new(&STREAM);
    let out = decode(&mut cursor).unwrap();
    assert_eq!(out, [0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01, 0x02, 0x03]);
    assert_eq!(cursor.pos(), STREAM.len());
  }

  #[test]
  fn dryrun_matches_decode() {
    let mut cursor = Cursor::new(&STREAM);
    let outcome = dryrun(&mut cursor, Bounds::ANY, &Never).unwrap();
    assert_eq!(
      outcome,
      DryRun::Sized(Sizes {
        consumed: 10,
        decoded: 8
      })
    );

    // Trailing bytes are not part of the stream.
    let mut padded = STREAM.to_vec();
    padded.extend_from_slice(&[0xff; 4]);
    let mut cursor = Cursor::new(&padded);
    decode(&mut cursor).unwrap();
    assert_eq!(cursor.pos(), 10);
  }

  #[test]
  fn longest_runs() {
    // 0xff is a run of 130; 0x7f is 128 literals.
    let mut stream = vec![0x30, 0x02, 0x01, 0x00, 0xff, 0x55, 0x7f];
    stream.extend((0..128).map(|i| i as u8));
    let out = decode(&mut Cursor::new(&stream)).unwrap();
    assert_eq!(out.len(), 258);
    assert!(out[..130].iter().all(|&b| b == 0x55));
    assert_eq!(out[130..], (0..128).map(|i| i as u8).collect::<Vec<_>>()[..]);
  }

  #[test]
  fn overflowing_runs_fail() {
    let run = [0x30, 0x04, 0x00, 0x00, 0x82, 0xaa];
    let err = decode(&mut Cursor::new(&run)).unwrap_err();
    assert_eq!(err.inner, ErrorType::RunOverflow);
    assert_eq!(err.offset, 4);

    let literal = [0x30, 0x02, 0x00, 0x00, 0x02, 0x01, 0x02, 0x03];
    let err = decode(&mut Cursor::new(&literal)).unwrap_err();
    assert_eq!(err.inner, ErrorType::RunOverflow);

    let mut cursor = Cursor::new(&literal);
    let err = dryrun(&mut cursor, Bounds::ANY, &Never).unwrap_err();
    assert_eq!(err.inner, ErrorType::RunOverflow);
  }

  #[test]
  fn truncated_literals_fail() {
    let stream = [0x30, 0x08, 0x00, 0x00, 0x07, 0x01, 0x02];
    let err = decode(&mut Cursor::new(&stream)).unwrap_err();
    assert_eq!(err.inner, ErrorType::Truncated);
    assert_eq!(err.offset, 5);
  }

  #[test]
  fn bad_headers_fail() {
    let err = decode(&mut Cursor::new(&[0x10, 0x08, 0x00, 0x00])).unwrap_err();
    assert_eq!(
      err.inner,
      ErrorType::BadMagic {
        expected: MAGIC,
        got: 0x10
      }
    );
    let err = decode(&mut Cursor::new(&[0x30, 0x00, 0x00, 0x00])).unwrap_err();
    assert_eq!(err.inner, ErrorType::ZeroLength);
  }

  #[test]
  fn dryrun_cancels_between_flags() {
    let cancel = AtomicBool::new(true);
    let mut cursor = Cursor::new(&STREAM);
    assert_eq!(
      dryrun(&mut cursor, Bounds::ANY, &cancel),
      Ok(DryRun::Cancelled)
    );
    let err = dryrun(
      &mut Cursor::new(&STREAM),
      Bounds::new(Some(9), None),
      &cancel,
    )
    .unwrap_err();
    assert!(err.is_range());
  }
}
