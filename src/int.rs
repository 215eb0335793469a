//! Integer types and parsing used by gbasect.
//!
//! Every compressed block on the GBA begins with a 24-bit little-endian
//! length, and ROM offsets are typed in by users in a handful of different
//! notations. This module provides types for handling both cleanly.

use std::convert::TryFrom;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

/// A 24-bit unsigned integer, as stored in BIOS compression headers.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct u24(u32);

impl u24 {
  /// The largest value a `u24` can hold.
  pub const MAX: u24 = u24(0xff_ffff);

  /// Creates a `u24` by truncating a `u32`.
  #[inline]
  pub const fn from_u32(i: u32) -> Self {
    Self(i & 0xff_ffff)
  }

  /// Zero-extends this `u24` into a `u32`.
  #[inline]
  pub const fn to_u32(self) -> u32 {
    self.0
  }

  /// Builds a `u24` from three bytes, in little-endian order.
  #[inline]
  pub const fn from_le_bytes(bytes: [u8; 3]) -> Self {
    Self((bytes[0] as u32) | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16)
  }

  /// Converts this `u24`'s bytes into an array, in little-endian order.
  #[inline]
  pub fn to_le_bytes(self) -> [u8; 3] {
    let [a, b, c, _] = self.0.to_le_bytes();
    [a, b, c]
  }
}

impl TryFrom<u32> for u24 {
  type Error = u32;

  /// Converts `i` into a `u24`, handing it back if it doesn't fit.
  fn try_from(i: u32) -> Result<Self, u32> {
    if i > Self::MAX.0 {
      Err(i)
    } else {
      Ok(Self(i))
    }
  }
}

impl From<u24> for u32 {
  #[inline]
  fn from(n: u24) -> u32 {
    n.0
  }
}

macro_rules! impl_fmt_u24 {
  ($($trait:ident),*) => {
    $(impl fmt::$trait for u24 {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::$trait::fmt(&self.to_u32(), f)
      }
    })*
  }
}
impl_fmt_u24!(Display, Binary, Octal, LowerHex, UpperHex);

/// A notation for an integer literal.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Radix {
  /// Plain decimal digits, like `1234`.
  Dec,
  /// Hexadecimal, like `0x4d2`, `$4d2` or `4d2h`.
  Hex,
  /// Binary, like `0b10011010010` or `%10011010010`.
  Bin,
}

impl Radix {
  /// Returns the numeric base of this `Radix`.
  pub fn base(self) -> u32 {
    match self {
      Self::Dec => 10,
      Self::Hex => 16,
      Self::Bin => 2,
    }
  }
}

lazy_static! {
  static ref INT_LIT: Regex = Regex::new(
    r"(?x)^(?:
      (?:0[xX]|\$)(?P<hex>[0-9a-fA-F_]+)
      |(?P<hex_suffix>[0-9][0-9a-fA-F_]*)[hH]
      |(?:0[bB]|%)(?P<bin>[01_]+)
      |(?P<dec>[0-9][0-9_]*)
    )$"
  )
  .unwrap();
}

/// Parses an unsigned integer written in any of the notations that ROM
/// hackers commonly use.
///
/// Underscores are accepted as digit separators.
/// ```
/// # use gbasect::int::parse_u32;
/// assert_eq!(parse_u32("0x8000c0"), Some(0x8000c0));
/// assert_eq!(parse_u32("$c0"), Some(0xc0));
/// assert_eq!(parse_u32("0c0h"), Some(0xc0));
/// assert_eq!(parse_u32("192"), Some(192));
/// assert_eq!(parse_u32("%1100_0000"), Some(192));
/// assert_eq!(parse_u32("0xg"), None);
/// ```
pub fn parse_u32(s: &str) -> Option<u32> {
  let (digits, radix) = split_radix(s.trim())?;
  let digits = digits.replace('_', "");
  if digits.is_empty() {
    return None;
  }
  u32::from_str_radix(&digits, radix.base()).ok()
}

/// Splits an integer literal into its digits and the `Radix` they are
/// written in.
pub fn split_radix(s: &str) -> Option<(&str, Radix)> {
  let caps = INT_LIT.captures(s)?;
  [
    ("hex", Radix::Hex),
    ("hex_suffix", Radix::Hex),
    ("bin", Radix::Bin),
    ("dec", Radix::Dec),
  ]
  .iter()
  .find_map(|&(name, radix)| caps.name(name).map(|m| (m.as_str(), radix)))
}

#[cfg(test)]
mod test {
  use super::*;

  macro_rules! assert_parse {
    ($text:literal => None) => {
      assert_eq!(parse_u32($text), None, "{}", $text);
    };
    ($text:literal => $expected:expr) => {
      assert_eq!(parse_u32($text), Some($expected), "{}", $text);
    };
  }

  #[test]
  fn int_literals() {
    assert_parse!("0" => 0);
    assert_parse!("4096" => 4096);
    assert_parse!("1_000" => 1000);
    assert_parse!("0x1000" => 0x1000);
    assert_parse!("0X1f" => 0x1f);
    assert_parse!("$08000000" => 0x0800_0000);
    assert_parse!("0ffh" => 0xff);
    assert_parse!("10H" => 0x10);
    assert_parse!("0b101" => 5);
    assert_parse!("%11" => 3);
    assert_parse!("  0x10  " => 0x10);
    assert_parse!("" => None);
    assert_parse!("0x" => None);
    assert_parse!("$_" => None);
    assert_parse!("ffh" => None);
    assert_parse!("0x1_0000_0000" => None);
    assert_parse!("-1" => None);
  }

  #[test]
  fn u24_bytes() {
    let n = u24::from_le_bytes([0x30, 0x00, 0x01]);
    assert_eq!(n.to_u32(), 0x01_0030);
    assert_eq!(n.to_le_bytes(), [0x30, 0x00, 0x01]);
    assert_eq!(u24::from_u32(0x1ff_ffff), u24::MAX);
    assert_eq!(u24::try_from(0x100_0000), Err(0x100_0000));
    assert_eq!(format!("{:06x}", u24::from_u32(0xc0)), "0000c0");
  }
}
