//! The gbasect memory map.
//!
//! A ROM is described by a sequence of *regions*, each a [`MemoryMap`]
//! describing a contiguous byte range and how to interpret it. Regions are
//! kept in a [`Partition`], which guarantees that they are sorted and never
//! overlap.
//!
//! Regions that are raw and of unknown type are *unclassified*: they are
//! filler standing in for "something we haven't looked at yet", and are the
//! only regions that bulk operations will carve new regions out of.
//!
//! [`MemoryMap`]: struct.MemoryMap.html
//! [`Partition`]: struct.Partition.html

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::codec::Codec;

mod partition;
mod split;

pub use partition::*;
pub use split::*;

/// A contiguous range of ROM bytes, and how to interpret them.
///
/// Only `byte_offset` is required; every other field has a default, and is
/// left out of project files when it has its default value.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Deserialize, Serialize)]
pub struct MemoryMap {
  /// The offset of the first byte of this region.
  pub byte_offset: u32,
  /// The number of ROM bytes this region spans, if known.
  ///
  /// For compressed regions, this is the compressed size, and is unknown
  /// until the region has been decoded or dry-run.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub byte_length: Option<u32>,
  /// How the bytes are encoded; `None` means [`Codec::Raw`].
  ///
  /// [`Codec::Raw`]: ../codec/enum.Codec.html#variant.Raw
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub byte_codec: Option<Codec>,
  /// The number of useful bytes this region decodes to, if known.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub byte_payload: Option<u32>,
  /// What the decoded bytes represent; `None` means [`DataType::Unknown`].
  ///
  /// [`DataType::Unknown`]: enum.DataType.html#variant.Unknown
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data_type: Option<DataType>,

  /// Image dimensions, in pixels, as `[width, height]`.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_shape: Option<[u32; 2]>,
  /// Image color mode, as understood by whatever displays the image.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_color: Option<String>,
  /// Image pixel order, as understood by whatever displays the image.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_order: Option<String>,
  /// The offset of the palette region used to display this region.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub palette_offset: Option<u32>,
}

impl MemoryMap {
  /// Creates a new unclassified region.
  pub fn new(byte_offset: u32, byte_length: Option<u32>) -> Self {
    Self {
      byte_offset,
      byte_length,
      ..Self::default()
    }
  }

  /// Creates a new unclassified region spanning `start..end`.
  pub fn span(start: u32, end: u32) -> Self {
    Self::new(start, Some(end.saturating_sub(start)))
  }

  /// Returns a copy of this region with the given codec.
  #[must_use]
  pub fn with_codec(mut self, codec: Codec) -> Self {
    self.byte_codec = Some(codec);
    self
  }

  /// Returns a copy of this region with the given data type.
  #[must_use]
  pub fn with_data_type(mut self, data_type: DataType) -> Self {
    self.data_type = Some(data_type);
    self
  }

  /// Returns the number of ROM bytes in this region, treating an unknown
  /// length as zero.
  pub fn len(&self) -> u32 {
    self.byte_length.unwrap_or(0)
  }

  /// Returns whether this region spans no bytes.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the offset one past the last byte of this region.
  ///
  /// This is computed in 64 bits, so that a bogus length can't wrap around.
  pub fn byte_end(&self) -> u64 {
    self.byte_offset as u64 + self.len() as u64
  }

  /// Returns this region's codec, with `None` meaning raw.
  pub fn codec(&self) -> Codec {
    self.byte_codec.unwrap_or(Codec::Raw)
  }

  /// Returns this region's data type, with `None` meaning unknown.
  pub fn data_type(&self) -> DataType {
    self.data_type.unwrap_or(DataType::Unknown)
  }

  /// Returns whether this region is raw, unknown filler.
  pub fn is_unclassified(&self) -> bool {
    self.codec() == Codec::Raw && self.data_type() == DataType::Unknown
  }

  /// Returns whether `offset` falls within this region.
  pub fn contains(&self, offset: u32) -> bool {
    self.byte_offset <= offset && (offset as u64) < self.byte_end()
  }

  /// Returns whether this region shares any bytes with `other`.
  pub fn overlaps(&self, other: &MemoryMap) -> bool {
    (self.byte_offset as u64) < other.byte_end()
      && (other.byte_offset as u64) < self.byte_end()
  }
}

impl fmt::Display for MemoryMap {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "0x{:08x}..0x{:08x}", self.byte_offset, self.byte_end())?;
    if self.byte_length.is_none() {
      write!(f, " (length unknown)")?;
    }
    write!(f, " {} {}", self.codec(), self.data_type())?;
    if let Some(payload) = self.byte_payload {
      write!(f, " -> {} bytes", payload)?;
    }
    Ok(())
  }
}

/// The kind of data a region holds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
  /// A bitmap or tiled image.
  Image,
  /// A color palette.
  Palette,
  /// A set of tiles, meant to be arranged by a tile map.
  TileSet,
  /// A sound sample.
  Sample,
  /// Sound engine structures, such as songs or instruments.
  Music,
  /// Unused filler bytes.
  Padding,
  /// Anything not yet identified.
  Unknown,
  /// The cartridge header.
  RomHeader,
}

impl DataType {
  /// Returns the name this data type goes by in project files.
  pub fn name(self) -> &'static str {
    match self {
      Self::Image => "IMAGE",
      Self::Palette => "PALETTE",
      Self::TileSet => "TILE_SET",
      Self::Sample => "SAMPLE",
      Self::Music => "MUSIC",
      Self::Padding => "PADDING",
      Self::Unknown => "UNKNOWN",
      Self::RomHeader => "ROM_HEADER",
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// An error indicating that an edit would break the partition's invariants.
///
/// Any of these signals a bug in the caller: the edit is abandoned without
/// touching the partition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum InvariantError {
  /// Indicates a new region starting before the region it's carved from.
  StartsBeforeParent {
    /// The start of the parent.
    parent: u32,
    /// The start of the new region.
    start: u32,
  },
  /// Indicates a new region ending after the region it's carved from.
  EndsAfterParent {
    /// The end of the parent.
    parent: u64,
    /// The end of the new region.
    end: u64,
  },
  /// Indicates that split pieces don't end where their parent did.
  Uncovered {
    /// The end of the parent.
    parent: u64,
    /// The end of the last piece.
    end: u64,
  },
  /// Indicates a region carved out of its parent with no length.
  UnknownLength(u32),
  /// Indicates two regions out of order.
  Unsorted {
    /// The start of the earlier region.
    first: u32,
    /// The start of the later region.
    second: u32,
  },
  /// Indicates two overlapping regions.
  Overlap {
    /// The start of the earlier region.
    first: u32,
    /// The start of the later region.
    second: u32,
  },
  /// Indicates a region extending past the end of the ROM.
  OutOfBounds {
    /// The start of the region.
    start: u32,
    /// The length of the ROM.
    len: u32,
  },
  /// Indicates an edit addressing regions that don't exist.
  BadRange {
    /// The start of the range being replaced.
    start: usize,
    /// The end of the range being replaced.
    end: usize,
    /// The number of regions in the partition.
    len: usize,
  },
}

impl fmt::Display for InvariantError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::StartsBeforeParent { parent, start } => write!(
        f,
        "region at 0x{:08x} starts before its parent at 0x{:08x}",
        start, parent
      ),
      Self::EndsAfterParent { parent, end } => write!(
        f,
        "region ending at 0x{:08x} ends after its parent at 0x{:08x}",
        end, parent
      ),
      Self::Uncovered { parent, end } => write!(
        f,
        "pieces end at 0x{:08x} but their parent ends at 0x{:08x}",
        end, parent
      ),
      Self::UnknownLength(start) => {
        write!(f, "region at 0x{:08x} has no length", start)
      }
      Self::Unsorted { first, second } => write!(
        f,
        "region at 0x{:08x} comes after region at 0x{:08x}",
        second, first
      ),
      Self::Overlap { first, second } => write!(
        f,
        "region at 0x{:08x} overlaps region at 0x{:08x}",
        second, first
      ),
      Self::OutOfBounds { start, len } => write!(
        f,
        "region at 0x{:08x} runs past the end of the ROM (0x{:08x})",
        start, len
      ),
      Self::BadRange { start, end, len } => write!(
        f,
        "regions {}..{} don't exist in a map of {}",
        start, end, len
      ),
    }
  }
}

impl std::error::Error for InvariantError {}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn defaults() {
    let region = MemoryMap::new(0x100, None);
    assert_eq!(region.codec(), Codec::Raw);
    assert_eq!(region.data_type(), DataType::Unknown);
    assert!(region.is_unclassified());
    assert_eq!(region.byte_end(), 0x100);
    assert!(!region.contains(0x100));

    let image =
      MemoryMap::new(0x100, Some(0x20)).with_data_type(DataType::Image);
    assert!(!image.is_unclassified());
    let lz = MemoryMap::new(0x100, Some(0x20)).with_codec(Codec::Lz77);
    assert!(!lz.is_unclassified());
  }

  #[test]
  fn containment() {
    let region = MemoryMap::span(0x10, 0x20);
    assert!(!region.contains(0x0f));
    assert!(region.contains(0x10));
    assert!(region.contains(0x1f));
    assert!(!region.contains(0x20));

    assert!(region.overlaps(&MemoryMap::span(0x1f, 0x30)));
    assert!(!region.overlaps(&MemoryMap::span(0x20, 0x30)));
    assert!(!region.overlaps(&MemoryMap::span(0x00, 0x10)));
    assert!(region.overlaps(&MemoryMap::span(0x00, 0x40)));
  }

  #[test]
  fn end_never_wraps() {
    let region = MemoryMap::new(u32::MAX, Some(u32::MAX));
    assert_eq!(region.byte_end(), u32::MAX as u64 * 2);
  }

  #[test]
  fn display() {
    let region = MemoryMap::span(0x10, 0x20).with_codec(Codec::Lz77);
    assert_eq!(region.to_string(), "0x00000010..0x00000020 LZ77 UNKNOWN");
  }
}
