//! gbasect, a Game Boy Advance ROM dissection tool.
//!
//! gbasect finds and decodes the compressed blocks that GBA games keep their
//! graphics, sound and text in, and tracks what is known about every byte of
//! a ROM as a [`Partition`] of [`MemoryMap`] regions.
//!
//! [`Partition`]: map/struct.Partition.html
//! [`MemoryMap`]: map/struct.MemoryMap.html

#![deny(missing_docs)]
#![deny(unused)]
#![deny(warnings)]
#![deny(unsafe_code)]

pub mod codec;
pub mod edit;
pub mod error;
pub mod int;
pub mod map;
pub mod project;
pub mod rom;
pub mod scan;
