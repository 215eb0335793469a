//! Invertible edits to a [`Partition`].
//!
//! Every change to a memory map goes through an [`Edit`], which knows both
//! the regions it expects to find and the regions it leaves behind. This
//! makes every edit its own inverse: reverting swaps the two lists. Both
//! directions go through [`replace_range()`], so an edit either happens
//! completely or not at all.
//!
//! [`Partition`]: ../map/struct.Partition.html
//! [`replace_range()`]: ../map/struct.Partition.html#method.replace_range
//! [`Edit`]: enum.Edit.html

use std::fmt;

use log::debug;

use crate::error;
use crate::map;
use crate::map::InvariantError;
use crate::map::MemoryMap;
use crate::map::Partition;
use crate::map::Split;

/// A single, invertible change to a partition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Edit {
  /// Carves a user-chosen region out of `original`.
  Split {
    /// The region being carved up.
    original: MemoryMap,
    /// What `original` is replaced with.
    pieces: Split,
  },
  /// Carves a region found by a dry-run out of `original`.
  Extract {
    /// The region being carved up.
    original: MemoryMap,
    /// What `original` is replaced with.
    pieces: Split,
  },
  /// Swaps one region for another, e.g. to record a decoded length.
  Replace {
    /// The region being replaced.
    old: MemoryMap,
    /// Its replacement.
    new: MemoryMap,
  },
  /// Removes a region, leaving a gap.
  Remove {
    /// The region being removed.
    region: MemoryMap,
  },
  /// Inserts a region into a gap.
  Insert {
    /// The region being inserted.
    region: MemoryMap,
  },
}

impl Edit {
  /// Creates an edit carving `region` out of `original`.
  ///
  /// See [`map::split()`](../map/fn.split.html).
  pub fn split(original: MemoryMap, region: MemoryMap) -> Result<Self, Error> {
    let offset = region.byte_offset;
    let pieces =
      map::split(&original, region).map_err(|e| Error::invariant(offset, e))?;
    Ok(Edit::Split { original, pieces })
  }

  /// Creates an edit carving a dry-run-sized `region` out of `original`.
  ///
  /// See [`map::extract()`](../map/fn.extract.html).
  pub fn extract(
    original: MemoryMap,
    region: MemoryMap,
  ) -> Result<Self, Error> {
    let offset = region.byte_offset;
    let pieces =
      map::extract(&original, region).map_err(|e| Error::invariant(offset, e))?;
    Ok(Edit::Extract { original, pieces })
  }

  /// Returns the offset this edit is about, for diagnostics.
  pub fn offset(&self) -> u32 {
    match self {
      Self::Split { pieces, .. } | Self::Extract { pieces, .. } => {
        pieces.region.byte_offset
      }
      Self::Replace { new, .. } => new.byte_offset,
      Self::Remove { region } | Self::Insert { region } => region.byte_offset,
    }
  }

  /// The regions that must be present for this edit to apply.
  fn before(&self) -> Vec<MemoryMap> {
    match self {
      Self::Split { original, .. } | Self::Extract { original, .. } => {
        vec![original.clone()]
      }
      Self::Replace { old, .. } => vec![old.clone()],
      Self::Remove { region } => vec![region.clone()],
      Self::Insert { .. } => Vec::new(),
    }
  }

  /// The regions this edit leaves behind.
  fn after(&self) -> Vec<MemoryMap> {
    match self {
      Self::Split { pieces, .. } | Self::Extract { pieces, .. } => {
        pieces.clone().into_vec()
      }
      Self::Replace { new, .. } => vec![new.clone()],
      Self::Remove { .. } => Vec::new(),
      Self::Insert { region } => vec![region.clone()],
    }
  }

  /// Performs this edit on `partition`.
  pub fn apply(&self, partition: &mut Partition) -> Result<(), Error> {
    debug!("applying {}", self);
    self.swap(partition, &self.before(), self.after())
  }

  /// Undoes this edit on `partition`, which must be in the state `apply()`
  /// left it in.
  pub fn revert(&self, partition: &mut Partition) -> Result<(), Error> {
    debug!("reverting {}", self);
    self.swap(partition, &self.after(), self.before())
  }

  /// Finds `from` as a contiguous run in `partition`, and replaces it with
  /// `to`.
  fn swap(
    &self,
    partition: &mut Partition,
    from: &[MemoryMap],
    to: Vec<MemoryMap>,
  ) -> Result<(), Error> {
    let range = match from.first() {
      Some(first) => {
        let start = partition
          .index_of(first.byte_offset)
          .ok_or_else(|| Error::new(first.byte_offset, ErrorType::Missing))?;
        let end = start + from.len();
        if partition.regions().get(start..end) != Some(from) {
          return Err(Error::new(first.byte_offset, ErrorType::Mismatch));
        }
        start..end
      }
      None => match to.first() {
        Some(first) => {
          let idx = partition.insertion_index(first.byte_offset);
          idx..idx
        }
        None => return Ok(()),
      },
    };

    partition
      .replace_range(range, to)
      .map(|_| ())
      .map_err(|e| Error::invariant(self.offset(), e))
  }
}

impl fmt::Display for Edit {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Split { original, pieces } => write!(
        f,
        "split {} out of 0x{:08x}",
        pieces.region, original.byte_offset
      ),
      Self::Extract { original, pieces } => write!(
        f,
        "extract {} out of 0x{:08x}",
        pieces.region, original.byte_offset
      ),
      Self::Replace { new, .. } => write!(f, "replace with {}", new),
      Self::Remove { region } => write!(f, "remove {}", region),
      Self::Insert { region } => write!(f, "insert {}", region),
    }
  }
}

/// A type of edit error.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ErrorType {
  /// Indicates that no region starts where the edit expected one.
  Missing,
  /// Indicates that the regions present differ from what the edit expected.
  Mismatch,
  /// Indicates that the edit would break the partition's invariants.
  Invariant(InvariantError),
}

/// An error from applying or reverting an edit.
///
/// When this is returned, the partition has not been modified.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Error {
  /// The type of the error.
  pub inner: ErrorType,
  /// The offset of the region the edit was about.
  pub offset: u32,
}

impl Error {
  /// Creates a new `Error`.
  pub fn new(offset: u32, inner: ErrorType) -> Self {
    Self { inner, offset }
  }

  fn invariant(offset: u32, e: InvariantError) -> Self {
    Self::new(offset, ErrorType::Invariant(e))
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.inner {
      ErrorType::Missing => {
        write!(f, "no region starts at 0x{:08x}", self.offset)
      }
      ErrorType::Mismatch => write!(
        f,
        "regions at 0x{:08x} changed since the edit was made",
        self.offset
      ),
      ErrorType::Invariant(e) => write!(f, "{}", e),
    }
  }
}

impl std::error::Error for Error {}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Offset(self.offset)
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Editing)
  }
}

/// An undo/redo stack of edits.
#[derive(Clone, Default, Debug)]
pub struct History {
  done: Vec<Edit>,
  undone: Vec<Edit>,
}

impl History {
  /// Creates an empty `History`.
  pub fn new() -> Self {
    Self::default()
  }

  /// Applies `edit` to `partition`, and records it.
  ///
  /// This forgets anything that could have been redone.
  pub fn apply(
    &mut self,
    edit: Edit,
    partition: &mut Partition,
  ) -> Result<(), Error> {
    edit.apply(partition)?;
    self.done.push(edit);
    self.undone.clear();
    Ok(())
  }

  /// Reverts the last applied edit, returning it.
  ///
  /// Returns `Ok(None)` if there was nothing to undo. If reverting fails, the
  /// edit stays where it was.
  pub fn undo(
    &mut self,
    partition: &mut Partition,
  ) -> Result<Option<&Edit>, Error> {
    let edit = match self.done.pop() {
      Some(edit) => edit,
      None => return Ok(None),
    };
    if let Err(e) = edit.revert(partition) {
      self.done.push(edit);
      return Err(e);
    }
    self.undone.push(edit);
    Ok(self.undone.last())
  }

  /// Re-applies the last undone edit, returning it.
  ///
  /// Returns `Ok(None)` if there was nothing to redo.
  pub fn redo(
    &mut self,
    partition: &mut Partition,
  ) -> Result<Option<&Edit>, Error> {
    let edit = match self.undone.pop() {
      Some(edit) => edit,
      None => return Ok(None),
    };
    if let Err(e) = edit.apply(partition) {
      self.undone.push(edit);
      return Err(e);
    }
    self.done.push(edit);
    Ok(self.done.last())
  }

  /// Returns the applied edits, oldest first.
  pub fn done(&self) -> &[Edit] {
    &self.done
  }

  /// Returns whether there is anything to undo.
  pub fn can_undo(&self) -> bool {
    !self.done.is_empty()
  }

  /// Returns whether there is anything to redo.
  pub fn can_redo(&self) -> bool {
    !self.undone.is_empty()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  use crate::codec::Codec;
  use crate::map::DataType;

  fn spans(p: &Partition) -> Vec<(u32, u64)> {
    p.regions()
      .iter()
      .map(|r| (r.byte_offset, r.byte_end()))
      .collect()
  }

  #[test]
  fn split_apply_and_revert() {
    let mut p = Partition::new(100);
    let original = p.regions()[0].clone();
    let image = MemoryMap::new(10, Some(20)).with_data_type(DataType::Image);
    let edit = Edit::split(original, image.clone()).unwrap();

    edit.apply(&mut p).unwrap();
    assert_eq!(spans(&p), vec![(0, 10), (10, 30), (30, 100)]);
    assert_eq!(p.get(10), Some(&image));

    edit.revert(&mut p).unwrap();
    assert_eq!(p, Partition::new(100));
  }

  #[test]
  fn uncontained_split_is_refused() {
    let original = MemoryMap::span(0x40, 0x80);
    let err = Edit::extract(original, MemoryMap::new(0x70, Some(0x20)))
      .unwrap_err();
    assert_eq!(err.offset, 0x70);
    assert!(matches!(err.inner, ErrorType::Invariant(_)));
  }

  #[test]
  fn empty_split_is_refused() {
    let original = MemoryMap::new(0, Some(100));
    let err = Edit::split(original, MemoryMap::new(10, None)).unwrap_err();
    assert_eq!(err.offset, 10);
    assert!(matches!(
      err.inner,
      ErrorType::Invariant(InvariantError::UnknownLength(10))
    ));
  }

  #[test]
  fn stale_edits_are_refused() {
    let mut p = Partition::new(100);
    let edit =
      Edit::split(MemoryMap::span(0, 100), MemoryMap::span(10, 30)).unwrap();
    edit.apply(&mut p).unwrap();
    let snapshot = p.clone();

    // Applying twice finds the pieces instead of the original.
    let err = edit.apply(&mut p).unwrap_err();
    assert_eq!(err.inner, ErrorType::Mismatch);
    assert_eq!(p, snapshot);

    let other = Edit::Remove {
      region: MemoryMap::span(5, 10),
    };
    assert_eq!(other.apply(&mut p).unwrap_err().inner, ErrorType::Missing);
    assert_eq!(p, snapshot);
  }

  #[test]
  fn remove_insert_replace() {
    let mut p = Partition::new(0x100);
    Edit::split(MemoryMap::span(0, 0x100), MemoryMap::span(0x40, 0x80))
      .unwrap()
      .apply(&mut p)
      .unwrap();

    let remove = Edit::Remove {
      region: MemoryMap::span(0x40, 0x80),
    };
    remove.apply(&mut p).unwrap();
    assert_eq!(p.gaps(), vec![0x40..0x80]);

    let lz = MemoryMap::span(0x50, 0x60).with_codec(Codec::Lz77);
    let insert = Edit::Insert { region: lz.clone() };
    insert.apply(&mut p).unwrap();
    assert_eq!(spans(&p), vec![(0, 0x40), (0x50, 0x60), (0x80, 0x100)]);

    // Inserting over an existing region is refused.
    let clash = Edit::Insert {
      region: MemoryMap::span(0x30, 0x48),
    };
    assert!(matches!(
      clash.apply(&mut p).unwrap_err().inner,
      ErrorType::Invariant(InvariantError::Overlap { .. })
    ));

    let mut fixed = lz.clone();
    fixed.byte_length = Some(0x18);
    fixed.byte_payload = Some(0x40);
    let replace = Edit::Replace {
      old: lz,
      new: fixed.clone(),
    };
    replace.apply(&mut p).unwrap();
    assert_eq!(p.get(0x50), Some(&fixed));

    replace.revert(&mut p).unwrap();
    insert.revert(&mut p).unwrap();
    remove.revert(&mut p).unwrap();
    assert_eq!(spans(&p), vec![(0, 0x40), (0x40, 0x80), (0x80, 0x100)]);
  }

  #[test]
  fn undo_redo() {
    let mut p = Partition::new(0x100);
    let mut history = History::new();
    assert_eq!(history.undo(&mut p), Ok(None));

    let first =
      Edit::split(MemoryMap::span(0, 0x100), MemoryMap::span(0x10, 0x20))
        .unwrap();
    history.apply(first.clone(), &mut p).unwrap();
    let second =
      Edit::split(MemoryMap::span(0x20, 0x100), MemoryMap::span(0x80, 0x100))
        .unwrap();
    history.apply(second.clone(), &mut p).unwrap();
    assert_eq!(p.len(), 4);

    assert_eq!(history.undo(&mut p).unwrap(), Some(&second));
    assert_eq!(history.undo(&mut p).unwrap(), Some(&first));
    assert_eq!(p, Partition::new(0x100));
    assert!(!history.can_undo());

    assert_eq!(history.redo(&mut p).unwrap(), Some(&first));
    assert_eq!(spans(&p), vec![(0, 0x10), (0x10, 0x20), (0x20, 0x100)]);

    // A new edit forgets the redo stack.
    history
      .apply(
        Edit::Remove {
          region: MemoryMap::span(0x10, 0x20),
        },
        &mut p,
      )
      .unwrap();
    assert!(!history.can_redo());
    assert_eq!(history.done().len(), 2);
  }
}
