//! The BIOS Huffman format.
//!
//! The header byte is `0x20 | width`, where `width` is the number of bits
//! per symbol, either 4 or 8. After the length comes the tree: one byte `n`
//! giving its size as `(n + 1) * 2` bytes (counting `n` itself), then the
//! nodes, root first. Each node byte looks like
//! ```text
//! +---+---+--------+
//! | L | R | offset |
//! | 7 | 6 |  5..0  |
//! +---+---+--------+
//! ```
//! and its two children live at `(addr & !1) + offset * 2 + 2` and the byte
//! after it, where `addr` is the node's position counted from `n`. `L` and
//! `R` mark children that are leaves, whose bytes are symbol values rather
//! than nodes.
//!
//! The compressed bits follow the tree as little-endian 32-bit words, each
//! consumed from its most significant bit down. In 4-bit mode, the first
//! symbol of each pair is the low nibble of the output byte.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::codec::check_bounds;
use crate::codec::read_len;
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

/// The top nibble of a Huffman header byte.
pub const TYPE: u8 = 2;

/// The most nodes that walking a tree may visit before it is considered
/// malformed.
pub const MAX_VISITS: usize = 256 * 4;

/// The largest possible tree, counting its size byte.
pub const MAX_TREE_LEN: usize = 512;

/// Decompresses the Huffman stream at `cursor`.
pub fn decode(cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
  let (out, _) = materialize(cursor, &Never)?;
  Ok(out)
}

/// Decompresses the Huffman stream at `cursor`, stopping early if `cancel`
/// fires.
///
/// Stacked codecs use this to produce their inner stream while a scan is
/// still able to interrupt them.
pub(crate) fn materialize(
  cursor: &mut Cursor,
  cancel: &dyn Cancel,
) -> Result<(Vec<u8>, Flow), Error> {
  let (width, len) = read_header(cursor)?;
  let tree = Tree::parse(cursor, width)?;

  // Every symbol costs at least one bit, so the rest of the stream caps the
  // output no matter what the header claims.
  let per_byte = if width == 8 { 8 } else { 4 };
  let cap = (len as usize).min(cursor.remaining().saturating_mul(per_byte));
  let mut out = Vec::with_capacity(cap);
  let flow = tree.inflate(cursor, &mut out, len as usize, cancel)?;
  Ok((out, flow))
}

/// Walks the Huffman stream at `cursor`, checking that it's well-formed and
/// measuring it.
pub fn dryrun(
  cursor: &mut Cursor,
  bounds: Bounds,
  cancel: &dyn Cancel,
) -> Result<DryRun, Error> {
  let start = cursor.pos();
  let (width, len) = read_header(cursor)?;
  check_bounds(Codec::Huffman, start, len, bounds)?;

  let tree = Tree::parse(cursor, width)?;
  let mut out = Counter::default();
  let flow = tree.inflate(cursor, &mut out, len as usize, cancel)?;
  Ok(sized(flow, start, cursor.pos(), len))
}

/// Reads a Huffman header, returning the symbol width and the decompressed
/// length.
fn read_header(cursor: &mut Cursor) -> Result<(u8, u32), Error> {
  let pos = cursor.pos();
  let got = read_u8(cursor, Codec::Huffman)?;
  if got >> 4 != TYPE {
    return Err(Error::new(
      Codec::Huffman,
      pos,
      ErrorType::BadMagic {
        expected: TYPE << 4,
        got,
      },
    ));
  }

  let width = got & 0xf;
  if width != 4 && width != 8 {
    return Err(Error::new(Codec::Huffman, pos, ErrorType::BadDepth(width)));
  }

  let len = read_len(cursor, Codec::Huffman)?;
  Ok((width, len))
}

/// A decoded Huffman tree, flattened into a table of codes.
#[derive(Clone, Debug)]
pub struct Tree {
  width: u8,
  codes: HashMap<Vec<bool>, u8>,
  longest: usize,
}

impl Tree {
  /// Parses the tree at `cursor`, leaving it at the start of the bitstream.
  ///
  /// The tree is walked breadth-first, so a hostile tree can't blow the
  /// stack; since nodes may be shared, the walk gives up after
  /// `MAX_VISITS` nodes.
  pub fn parse(cursor: &mut Cursor, width: u8) -> Result<Self, Error> {
    let base = cursor.pos();
    let n = read_u8(cursor, Codec::Huffman)?;
    let size = (n as usize + 1) * 2;
    debug_assert!(size <= MAX_TREE_LEN);

    let nodes = cursor.read_bytes(size - 1).ok_or_else(|| {
      Error::new(Codec::Huffman, base + 1, ErrorType::Truncated)
    })?;
    // Nodes are addressed from the size byte, which is never a node itself.
    let node_at = |addr: usize| -> Result<u8, Error> {
      match addr.checked_sub(1).and_then(|i| nodes.get(i)) {
        Some(&byte) => Ok(byte),
        None => Err(Error::new(
          Codec::Huffman,
          base,
          ErrorType::TreeOutOfRange(addr),
        )),
      }
    };

    let mut codes = HashMap::new();
    let mut longest = 0;
    let mut visits = 0;
    let mut frontier = VecDeque::new();
    frontier.push_back((Vec::new(), 1usize));

    while let Some((prefix, addr)) = frontier.pop_front() {
      visits += 1;
      if visits > MAX_VISITS {
        return Err(Error::new(Codec::Huffman, base, ErrorType::LoopDetected));
      }

      let node = node_at(addr)?;
      let children = (addr & !1) + (node & 0x3f) as usize * 2 + 2;
      let leaves = [node & 0x80 != 0, node & 0x40 != 0];
      for (bit, &is_leaf) in leaves.iter().enumerate() {
        let child = children + bit;
        let mut code: Vec<bool> = prefix.clone();
        code.push(bit == 1);

        if is_leaf {
          let mut symbol = node_at(child)?;
          if width == 4 {
            symbol &= 0xf;
          }
          longest = longest.max(code.len());
          codes.insert(code, symbol);
        } else {
          frontier.push_back((code, child));
        }
      }
    }

    Ok(Self {
      width,
      codes,
      longest,
    })
  }

  /// Returns the symbol width of this tree, in bits.
  pub fn width(&self) -> u8 {
    self.width
  }

  /// Returns the length of the longest code in this tree.
  pub fn longest(&self) -> usize {
    self.longest
  }

  /// Looks up the symbol for `code`, if it's a complete code.
  pub fn symbol(&self, code: &[bool]) -> Option<u8> {
    self.codes.get(code).copied()
  }

  fn inflate<S: Sink>(
    &self,
    cursor: &mut Cursor,
    out: &mut S,
    len: usize,
    cancel: &dyn Cancel,
  ) -> Result<Flow, Error> {
    let mut bits = Bits::new(cursor);
    let mut code = Vec::with_capacity(self.longest);
    while out.len() < len {
      if cancel.is_cancelled() {
        return Ok(Flow::Cancelled);
      }

      let byte = if self.width == 8 {
        self.next_symbol(&mut bits, &mut code)?
      } else {
        let lo = self.next_symbol(&mut bits, &mut code)?;
        let hi = self.next_symbol(&mut bits, &mut code)?;
        hi << 4 | lo
      };
      out.push(byte);
    }
    Ok(Flow::Done)
  }

  fn next_symbol(
    &self,
    bits: &mut Bits,
    code: &mut Vec<bool>,
  ) -> Result<u8, Error> {
    code.clear();
    let pos = bits.pos();
    while code.len() < self.longest {
      code.push(bits.next()?);
      if let Some(symbol) = self.symbol(code) {
        return Ok(symbol);
      }
    }
    Err(Error::new(Codec::Huffman, pos, ErrorType::BadCode))
  }
}

/// A reader over a stream of little-endian words, yielding bits from the
/// most significant end of each word.
struct Bits<'c, 'a> {
  cursor: &'c mut Cursor<'a>,
  word: u32,
  left: u32,
}

impl<'c, 'a> Bits<'c, 'a> {
  fn new(cursor: &'c mut Cursor<'a>) -> Self {
    Self {
      cursor,
      word: 0,
      left: 0,
    }
  }

  /// Returns the position of the word currently being read.
  fn pos(&self) -> usize {
    if self.left == 0 {
      self.cursor.pos()
    } else {
      self.cursor.pos() - 4
    }
  }

  fn next(&mut self) -> Result<bool, Error> {
    if self.left == 0 {
      let pos = self.cursor.pos();
      self.word = self
        .cursor
        .read_u32()
        .ok_or_else(|| Error::new(Codec::Huffman, pos, ErrorType::Truncated))?;
      self.left = 32;
    }
    self.left -= 1;
    Ok(self.word >> self.left & 1 != 0)
  }
}
