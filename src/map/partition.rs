//! Ordered, non-overlapping collections of regions.

use std::ops::Range;

use crate::map::DataType;
use crate::map::InvariantError;
use crate::map::MemoryMap;
use crate::rom::Header;
use crate::rom::Rom;

/// The regions of a ROM image, sorted by offset.
///
/// A `Partition` always satisfies two invariants: offsets are strictly
/// ascending, and each region ends at or before the start of the next. Every
/// region also lies within the image.
///
/// Regions need not cover the whole image; bytes outside of any region are
/// *gaps*, which scanning with the insert policy can briefly leave behind.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Partition {
  rom_size: u32,
  regions: Vec<MemoryMap>,
}

impl Partition {
  /// Creates a partition made of one unclassified region spanning an image of
  /// `rom_size` bytes.
  pub fn new(rom_size: u32) -> Self {
    let regions = if rom_size > 0 {
      vec![MemoryMap::new(0, Some(rom_size))]
    } else {
      Vec::new()
    };
    Self { rom_size, regions }
  }

  /// Creates a partition out of existing regions, checking its invariants.
  pub fn from_regions(
    rom_size: u32,
    regions: Vec<MemoryMap>,
  ) -> Result<Self, InvariantError> {
    validate(rom_size, &regions)?;
    Ok(Self { rom_size, regions })
  }

  /// Creates the starting partition for `rom`.
  ///
  /// If the image starts with a cartridge header, the header gets a region
  /// of its own; the rest is left unclassified.
  pub fn seed(rom: &Rom) -> Self {
    let mut partition = Self::new(rom.len());
    if rom.header().is_some() {
      partition.regions = vec![
        MemoryMap::new(0, Some(Header::LEN))
          .with_data_type(DataType::RomHeader),
      ];
      if rom.len() > Header::LEN {
        partition.regions.push(MemoryMap::span(Header::LEN, rom.len()));
      }
    }
    partition
  }

  /// Returns the size of the image this partition describes.
  pub fn rom_size(&self) -> u32 {
    self.rom_size
  }

  /// Returns the regions, in ascending order.
  pub fn regions(&self) -> &[MemoryMap] {
    &self.regions
  }

  /// Consumes this partition, returning its regions.
  pub fn into_regions(self) -> Vec<MemoryMap> {
    self.regions
  }

  /// Returns the number of regions.
  pub fn len(&self) -> usize {
    self.regions.len()
  }

  /// Returns whether there are no regions at all.
  pub fn is_empty(&self) -> bool {
    self.regions.is_empty()
  }

  /// Returns the region starting exactly at `offset`.
  pub fn get(&self, offset: u32) -> Option<&MemoryMap> {
    self.index_of(offset).map(|i| &self.regions[i])
  }

  /// Returns the index of the region starting exactly at `offset`.
  pub fn index_of(&self, offset: u32) -> Option<usize> {
    self
      .regions
      .binary_search_by_key(&offset, |r| r.byte_offset)
      .ok()
  }

  /// Returns the region containing `offset`, along with its index.
  pub fn containing(&self, offset: u32) -> Option<(usize, &MemoryMap)> {
    let idx = self.insertion_index(offset).checked_sub(1)?;
    let region = &self.regions[idx];
    if region.contains(offset) {
      Some((idx, region))
    } else {
      None
    }
  }

  /// Returns the index of the first region whose offset is greater than
  /// `offset`; that is, where a region at `offset` would need to go.
  pub fn insertion_index(&self, offset: u32) -> usize {
    self.regions.partition_point(|r| r.byte_offset <= offset)
  }

  /// Replaces the regions in `range` with `with`, returning the regions that
  /// were removed.
  ///
  /// The replacement is all-or-nothing: if the result would break any
  /// invariant, the partition is left as it was.
  pub fn replace_range(
    &mut self,
    range: Range<usize>,
    with: Vec<MemoryMap>,
  ) -> Result<Vec<MemoryMap>, InvariantError> {
    if range.start > range.end || range.end > self.regions.len() {
      return Err(InvariantError::BadRange {
        start: range.start,
        end: range.end,
        len: self.regions.len(),
      });
    }

    // Only the new regions and their immediate neighbors can be out of
    // place; everything else was already checked.
    for region in &with {
      check_in_rom(self.rom_size, region)?;
    }
    let before = range.start.checked_sub(1).map(|i| &self.regions[i]);
    let after = self.regions.get(range.end);
    let seam = before.into_iter().chain(&with).chain(after);
    for (a, b) in seam.clone().zip(seam.skip(1)) {
      check_pair(a, b)?;
    }

    Ok(self.regions.splice(range, with).collect())
  }

  /// Returns the byte ranges not covered by any region.
  pub fn gaps(&self) -> Vec<Range<u32>> {
    let mut gaps = Vec::new();
    let mut cursor = 0u32;
    for region in &self.regions {
      if region.byte_offset > cursor {
        gaps.push(cursor..region.byte_offset);
      }
      // Regions are within the image, so their ends fit in a `u32`.
      cursor = cursor.max(region.byte_end() as u32);
    }
    if cursor < self.rom_size {
      gaps.push(cursor..self.rom_size);
    }
    gaps
  }

  /// Re-checks every invariant.
  pub fn validate(&self) -> Result<(), InvariantError> {
    validate(self.rom_size, &self.regions)
  }
}

/// Checks that `regions` are sorted, don't overlap, and fit in an image of
/// `rom_size` bytes.
pub fn validate(
  rom_size: u32,
  regions: &[MemoryMap],
) -> Result<(), InvariantError> {
  for region in regions {
    check_in_rom(rom_size, region)?;
  }
  for pair in regions.windows(2) {
    check_pair(&pair[0], &pair[1])?;
  }
  Ok(())
}

fn check_in_rom(
  rom_size: u32,
  region: &MemoryMap,
) -> Result<(), InvariantError> {
  if region.byte_end() > rom_size as u64 {
    return Err(InvariantError::OutOfBounds {
      start: region.byte_offset,
      len: rom_size,
    });
  }
  Ok(())
}

fn check_pair(a: &MemoryMap, b: &MemoryMap) -> Result<(), InvariantError> {
  if b.byte_offset <= a.byte_offset {
    return Err(InvariantError::Unsorted {
      first: a.byte_offset,
      second: b.byte_offset,
    });
  }
  if a.byte_end() > b.byte_offset as u64 {
    return Err(InvariantError::Overlap {
      first: a.byte_offset,
      second: b.byte_offset,
    });
  }
  Ok(())
}
