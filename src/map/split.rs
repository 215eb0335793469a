//! Carving new regions out of existing ones.

use crate::map::InvariantError;
use crate::map::MemoryMap;

/// The result of carving a region out of a parent: the new region, plus
/// whatever is left of the parent on either side of it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Split {
  /// The part of the parent before `region`, if any.
  pub before: Option<MemoryMap>,
  /// The new region, unchanged.
  pub region: MemoryMap,
  /// The part of the parent after `region`, if any.
  pub after: Option<MemoryMap>,
}

impl Split {
  /// Returns the pieces of this split, in address order.
  pub fn pieces(&self) -> impl Iterator<Item = &MemoryMap> {
    self
      .before
      .iter()
      .chain(Some(&self.region))
      .chain(self.after.iter())
  }

  /// Consumes this split, returning its pieces in address order.
  pub fn into_vec(self) -> Vec<MemoryMap> {
    let mut pieces = Vec::with_capacity(3);
    pieces.extend(self.before);
    pieces.push(self.region);
    pieces.extend(self.after);
    pieces
  }
}

/// Carves `region` out of `parent`.
///
/// The leftover pieces are unclassified, and are only produced when they
/// aren't empty. `region` must have a nonzero length and lie entirely within
/// `parent`.
///
/// This function doesn't modify any partition; the caller is responsible for
/// replacing `parent` with the pieces.
pub fn split(
  parent: &MemoryMap,
  region: MemoryMap,
) -> Result<Split, InvariantError> {
  // An empty region would share its offset with the piece after it.
  if region.is_empty() {
    return Err(InvariantError::UnknownLength(region.byte_offset));
  }

  let parent_end = parent.byte_end();
  let region_end = region.byte_end();

  if region.byte_offset < parent.byte_offset {
    return Err(InvariantError::StartsBeforeParent {
      parent: parent.byte_offset,
      start: region.byte_offset,
    });
  }
  if region_end > parent_end {
    return Err(InvariantError::EndsAfterParent {
      parent: parent_end,
      end: region_end,
    });
  }

  let before = region.byte_offset - parent.byte_offset;
  let before = if before > 0 {
    Some(MemoryMap::new(parent.byte_offset, Some(before)))
  } else {
    None
  };

  // `region_end <= parent_end`, which fits in a `u32` as long as the
  // parent's does; a parent whose end doesn't can't be split.
  let after = (parent_end - region_end) as u32;
  let after = if after > 0 {
    Some(MemoryMap::new(region_end as u32, Some(after)))
  } else {
    None
  };

  let pieces = Split {
    before,
    region,
    after,
  };

  let end = pieces
    .pieces()
    .last()
    .map(MemoryMap::byte_end)
    .unwrap_or(region_end);
  if end != parent_end || parent_end > u32::MAX as u64 {
    return Err(InvariantError::Uncovered {
      parent: parent_end,
      end,
    });
  }
  Ok(pieces)
}

/// Carves a region whose extent was measured by a codec out of `parent`.
///
/// This has the same contract as `split()`; a dry-run always determines a
/// length, so `region` is never empty unless it was built by hand.
pub fn extract(
  parent: &MemoryMap,
  region: MemoryMap,
) -> Result<Split, InvariantError> {
  split(parent, region)
}
