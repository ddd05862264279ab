//! AMQP 1.0 type encoding and value trees in Rust
//!
//! Every frame body, message property and link attachment of the protocol
//! is a tree of typed values in a self-describing binary format. This crate
//! holds the value-representation core: a wire codec for the AMQP 1.0 type
//! system, the [`Data`] tree that builds and navigates such values, and a
//! format-string interpreter that drives both in one call.

/// Borrowed wire elements and semantic kinds
pub mod atom;
mod bytes;
/// Wire decode into flat atom streams
pub mod codec;
/// Wire type codes
pub mod codes;
/// The value tree
pub mod data;
mod display;
mod error;
/// Fill/scan format-string interpreter
pub mod format;

pub use self::atom::{Atom, Kind};
pub use self::codes::TypeCode;
pub use self::data::{Data, Point};
pub use self::error::Error;
pub use self::format::{Fill, Scan};
