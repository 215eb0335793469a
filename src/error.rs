//! Error printing facilities.
//!
//! These functions are used to simplify the display of various gbasect
//! errors to the user. The [`Error`] trait describes how a Rust error type
//! can be converted into a simple diagnostic.
//!
//! [`Error`]: trait.Error.html

use std::fmt;
use std::io;
use std::path::Path;

use crate::rom::BUS_BASE;

/// An error which can be described as a diagnostic.
///
/// Types that implement `Error` must also implement [`std::fmt::Display`]. For
/// the user-displayed error to look right, this implementation should only be
/// one line long.
///
/// [`std::fmt::Display`]: https://doc.rust-lang.org/std/fmt/trait.Display.html
pub trait Error: fmt::Debug + fmt::Display {
  /// Returns a `Cause` describing the input that resulted in the error.
  fn cause(&self) -> Cause<'_>;
  /// Returns an action this error is associated with, if any at all.
  fn action(&self) -> Option<Action>;
}

/// A collection of errors that may built up over the course of an action.
///
/// The type parameter `E` should be a type implementing [`Error`].
///
/// [`Error`]: trait.Error.html
#[derive(Debug)]
pub struct Errors<E>(Vec<E>);

impl<E> Errors<E> {
  /// Creates an empty `Errors`.
  pub fn new() -> Self {
    Errors(Vec::new())
  }

  /// Returns true if this `Errors` hasn't had any errors added yet.
  pub fn is_ok(&self) -> bool {
    self.0.is_empty()
  }

  /// Returns the number of errors collected so far.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Iterates over the collected errors, in the order they were added.
  pub fn iter(&self) -> impl Iterator<Item = &E> {
    self.0.iter()
  }

  /// Adds a new error to this `Errors`.
  pub fn push(&mut self, error: E) {
    self.0.push(error);
  }

  /// Extends this `Errors` by consuming another `Errors`.
  pub fn extend(&mut self, mut errors: Errors<E>) {
    self.0.reserve(errors.0.len());
    for e in errors.0.drain(..) {
      self.push(e);
    }
  }
}

impl<E> Default for Errors<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E: Error> Errors<E> {
  /// Dumps this collection of errors as user-displayable text into `sink`.
  ///
  /// Returns `Ok(true)` if anything was written.
  pub fn dump_to(&self, mut sink: impl io::Write) -> io::Result<bool> {
    if self.0.is_empty() {
      return Ok(false);
    }

    for (i, error) in self.0.iter().enumerate() {
      writeln!(sink, "error: {}", error)?;
      let place = match error.cause() {
        Cause::Offset(offset) => format!(
          "offset 0x{:06x} (bus 0x{:08x})",
          offset,
          BUS_BASE.wrapping_add(offset)
        ),
        Cause::File(path) => path.display().to_string(),
      };
      if let Some(action) = error.action() {
        writeln!(sink, "  while {} at {}", action.describe(), place)?;
      } else {
        writeln!(sink, "  at {}", place)?;
      }

      if i != self.0.len() - 1 {
        writeln!(sink)?;
      }
    }

    Ok(true)
  }

  /// Calls `dump_to()` on `stderr`, exiting the process with the given
  /// `code` if any errors are present.
  pub fn dump_and_die(self, code: i32) {
    // A failed write to stderr still exits with `code`.
    let wrote = self.dump_to(io::stderr()).unwrap_or(true);
    if wrote {
      eprintln!();
      eprintln!("error: there were {} errors", self.0.len());
      std::process::exit(code)
    }
  }
}

/// The place where an error occured, to varrying degrees of specificity.
#[derive(Copy, Clone, Debug)]
pub enum Cause<'a> {
  /// An offset into the ROM image.
  Offset(u32),
  /// A file, for when we don't know much about where the error came from
  /// within.
  File(&'a Path),
}

/// An action that gbasect performs, which an error may be associated with.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Action {
  /// Decompressing a block.
  Decoding,
  /// Probing a ROM for compressed blocks.
  Scanning,
  /// Applying or reverting an edit to a memory map.
  Editing,
  /// Reading or writing a project file.
  Loading,
}

impl Action {
  fn describe(self) -> &'static str {
    match self {
      Self::Decoding => "decoding",
      Self::Scanning => "scanning",
      Self::Editing => "editing",
      Self::Loading => "loading",
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[derive(Debug)]
  struct Oops(u32);

  impl fmt::Display for Oops {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "oops #{}", self.0)
    }
  }

  impl Error for Oops {
    fn cause(&self) -> Cause<'_> {
      Cause::Offset(0x1234)
    }

    fn action(&self) -> Option<Action> {
      if self.0 == 0 {
        None
      } else {
        Some(Action::Scanning)
      }
    }
  }

  #[test]
  fn dump() {
    let mut errors = Errors::new();
    let mut out = Vec::new();
    assert!(!errors.dump_to(&mut out).unwrap());
    assert!(out.is_empty());

    errors.push(Oops(0));
    let mut more = Errors::new();
    more.push(Oops(1));
    errors.extend(more);
    assert_eq!(errors.len(), 2);

    assert!(errors.dump_to(&mut out).unwrap());
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
      text,
      "error: oops #0\n  at offset 0x001234 (bus 0x08001234)\n\n\
       error: oops #1\n  while scanning at offset 0x001234 (bus 0x08001234)\n"
    );
  }
}
