//! Project files, which persist a memory map between sessions.
//!
//! Projects are stored as JSON5. Each region lists its `byte_offset` plus
//! whichever other fields differ from their defaults, so a freshly seeded
//! project is tiny:
//! ```text
//! {
//!   rom_size: 0x1000000,
//!   regions: [
//!     {byte_offset: 0, byte_length: 192, data_type: "ROM_HEADER"},
//!     {byte_offset: 192, byte_length: 16776960},
//!   ],
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use log::info;
use serde::Deserialize;
use serde::Serialize;

use crate::error;
use crate::map::InvariantError;
use crate::map::MemoryMap;
use crate::map::Partition;
use crate::rom::Rom;

/// The persisted state of a dissection.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Project {
  /// The size of the ROM image the regions describe.
  pub rom_size: u32,
  /// The game code from the ROM's header, used to catch mismatched ROMs.
  #[serde(default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub game_code: Option<String>,
  /// The regions, in ascending order.
  pub regions: Vec<MemoryMap>,
}

impl Project {
  /// Creates a new project for `rom`, with a freshly seeded partition.
  pub fn new(rom: &Rom) -> Self {
    Self {
      rom_size: rom.len(),
      game_code: rom.header().map(|h| h.game_code),
      regions: Partition::seed(rom).into_regions(),
    }
  }

  /// Creates a project recording `partition`.
  pub fn from_partition(
    partition: &Partition,
    game_code: Option<String>,
  ) -> Self {
    Self {
      rom_size: partition.rom_size(),
      game_code,
      regions: partition.regions().to_vec(),
    }
  }

  /// Parses a project out of JSON5 text, checking its regions.
  pub fn parse(text: &str) -> Result<Self, ErrorType> {
    let project: Self = json5::from_str(text)?;
    project.partition()?;
    Ok(project)
  }

  /// Serializes this project as JSON5 text.
  pub fn to_text(&self) -> Result<String, ErrorType> {
    Ok(json5::to_string(self)?)
  }

  /// Loads a project from `path`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let text =
      fs::read_to_string(path).map_err(|e| Error::new(path, e.into()))?;
    let project = Self::parse(&text).map_err(|e| Error::new(path, e))?;
    info!(
      "loaded {} regions from {}",
      project.regions.len(),
      path.display()
    );
    Ok(project)
  }

  /// Saves this project to `path`.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let text = self.to_text().map_err(|e| Error::new(path, e))?;
    fs::write(path, text).map_err(|e| Error::new(path, e.into()))?;
    info!("saved {} regions to {}", self.regions.len(), path.display());
    Ok(())
  }

  /// Builds a `Partition` out of this project's regions.
  pub fn partition(&self) -> Result<Partition, InvariantError> {
    Partition::from_regions(self.rom_size, self.regions.clone())
  }

  /// Checks that this project plausibly describes `rom`.
  pub fn matches(&self, rom: &Rom) -> bool {
    if self.rom_size != rom.len() {
      return false;
    }
    match (&self.game_code, rom.header()) {
      (Some(code), Some(header)) => *code == header.game_code,
      _ => true,
    }
  }
}

/// A type of project error.
#[derive(Debug)]
pub enum ErrorType {
  /// Indicates that the file couldn't be read or written.
  Io(io::Error),
  /// Indicates that the file isn't a well-formed project.
  Syntax(json5::Error),
  /// Indicates that the project's regions are inconsistent.
  Invariant(InvariantError),
}

impl From<io::Error> for ErrorType {
  fn from(e: io::Error) -> Self {
    Self::Io(e)
  }
}

impl From<json5::Error> for ErrorType {
  fn from(e: json5::Error) -> Self {
    Self::Syntax(e)
  }
}

impl From<InvariantError> for ErrorType {
  fn from(e: InvariantError) -> Self {
    Self::Invariant(e)
  }
}

impl fmt::Display for ErrorType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Io(e) => write!(f, "{}", e),
      Self::Syntax(e) => write!(f, "malformed project: {}", e),
      Self::Invariant(e) => write!(f, "inconsistent project: {}", e),
    }
  }
}

/// An error from loading or saving a project file.
#[derive(Debug)]
pub struct Error {
  /// The type of the error.
  pub inner: ErrorType,
  /// The file being loaded or saved.
  pub path: PathBuf,
}

impl Error {
  /// Creates a new `Error`.
  pub fn new(path: impl Into<PathBuf>, inner: ErrorType) -> Self {
    Self {
      inner,
      path: path.into(),
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.inner)
  }
}

impl std::error::Error for Error {}

impl error::Error for Error {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::File(&self.path)
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Loading)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  use crate::codec::Codec;
  use crate::map::DataType;
  use crate::rom::test::fake_header;

  #[test]
  fn defaults_are_omitted() {
    let project = Project {
      rom_size: 0x100,
      game_code: None,
      regions: vec![
        MemoryMap::span(0, 0x10),
        MemoryMap::span(0x10, 0x100).with_codec(Codec::HuffmanOverLz77),
      ],
    };
    let text = project.to_text().unwrap();
    assert!(!text.contains("game_code"));
    assert!(!text.contains("data_type"));
    assert!(!text.contains("byte_payload"));
    assert!(text.contains("\"HUFFMAN_OVER_LZ77\""));
    assert_eq!(text.matches("byte_codec").count(), 1);

    assert_eq!(Project::parse(&text).unwrap(), project);
  }

  #[test]
  fn parses_handwritten_json5() {
    let text = r#"
      // Written by hand.
      {
        rom_size: 256,
        regions: [
          {byte_offset: 0, byte_length: 192, data_type: 'ROM_HEADER'},
          {
            byte_offset: 192,
            byte_length: 32,
            byte_codec: 'LZ77',
            byte_payload: 48,
            data_type: 'IMAGE',
            image_shape: [8, 6],
            palette_offset: 224,
          },
          {byte_offset: 224},
        ],
      }
    "#;
    let project = Project::parse(text).unwrap();
    assert_eq!(project.regions.len(), 3);
    assert_eq!(project.regions[0].data_type(), DataType::RomHeader);

    let image = &project.regions[1];
    assert_eq!(image.codec(), Codec::Lz77);
    assert_eq!(image.byte_payload, Some(48));
    assert_eq!(image.image_shape, Some([8, 6]));
    assert_eq!(image.image_color, None);

    let rest = &project.regions[2];
    assert_eq!(rest.byte_length, None);
    assert!(rest.is_unclassified());
  }

  #[test]
  fn rejects_bad_projects() {
    let overlapping = r#"{
      rom_size: 256,
      regions: [{byte_offset: 0, byte_length: 32}, {byte_offset: 16}],
    }"#;
    assert!(matches!(
      Project::parse(overlapping),
      Err(ErrorType::Invariant(InvariantError::Overlap { .. }))
    ));

    assert!(matches!(
      Project::parse("{rom_size: 256}"),
      Err(ErrorType::Syntax(_))
    ));
    assert!(matches!(
      Project::parse("{rom_size: 256, regions: [{byte_codec: 'ZIP'}]}"),
      Err(ErrorType::Syntax(_))
    ));
  }

  #[test]
  fn new_project_from_rom() {
    let mut bytes = fake_header();
    bytes.resize(0x400, 0);
    let rom = Rom::new(bytes);
    let project = Project::new(&rom);
    assert_eq!(project.game_code.as_deref(), Some("BPEE"));
    assert_eq!(project.regions.len(), 2);
    assert!(project.matches(&rom));
    assert!(!project.matches(&Rom::new(vec![0u8; 0x400 - 1])));

    let partition = project.partition().unwrap();
    let round_trip =
      Project::from_partition(&partition, project.game_code.clone());
    assert_eq!(round_trip, project);
  }

  #[test]
  fn missing_file() {
    let err = Project::load("/nonexistent/gbasect/project.json5").unwrap_err();
    assert!(matches!(err.inner, ErrorType::Io(_)));
    assert!(!err.to_string().is_empty());
  }
}
