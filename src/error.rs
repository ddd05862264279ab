use std::{error, fmt};

use crate::atom::Kind;
use crate::bytes;

/// Codec, tree and format-interpreter errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input exhausted before a complete value was read
    Underflow,
    /// Output range too small for the encoded value
    Overflow,
    UnknownTypeCode(u8),
    /// A descriptor marker where a value code was required
    UnexpectedDescriptor,
    InvalidChar(u32),
    /// An element-kind reference outside an array stream
    StrayElementKind,
    /// An array stream with no element-kind reference
    MissingElementKind,
    KindMismatch { expected: Kind, found: Kind },
    OddMapChildren(usize),
    ExitFailed,
    NakedType,
    UnrecognizedFill(char),
    UnrecognizedScan(char),
    OrphanOption,
    MissingArgument(char),
    ArgumentMismatch(char),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow => write!(f, "input underflow"),
            Self::Overflow => write!(f, "output overflow"),
            Self::UnknownTypeCode(code) => write!(f, "unrecognised typecode: 0x{code:02x}"),
            Self::UnexpectedDescriptor => write!(f, "descriptor where a value was expected"),
            Self::InvalidChar(raw) => write!(f, "invalid character scalar: 0x{raw:08x}"),
            Self::StrayElementKind => write!(f, "element kind outside an array"),
            Self::MissingElementKind => write!(f, "array carries no element kind"),
            Self::KindMismatch { expected, found } => {
                write!(f, "cannot encode {found} where {expected} is required")
            }
            Self::OddMapChildren(count) => {
                write!(f, "map has an odd number of children: {count}")
            }
            Self::ExitFailed => write!(f, "exit failed"),
            Self::NakedType => write!(f, "naked type"),
            Self::UnrecognizedFill(code) => write!(f, "unrecognized fill code: {code:?}"),
            Self::UnrecognizedScan(code) => write!(f, "unrecognized scan code: {code:?}"),
            Self::OrphanOption => write!(f, "codes must follow a ?"),
            Self::MissingArgument(code) => write!(f, "missing argument for {code:?}"),
            Self::ArgumentMismatch(code) => write!(f, "mismatched argument for {code:?}"),
        }
    }
}

impl error::Error for Error {}

impl From<bytes::Error> for Error {
    fn from(err: bytes::Error) -> Self {
        match err {
            bytes::Error::Underflow => Self::Underflow,
            bytes::Error::Overflow => Self::Overflow,
        }
    }
}
