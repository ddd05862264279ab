//! Debug pretty-printer for flat atom streams.
//!
//! The grammar looks reversible but is never parsed: `@d v` described
//! values, `@kind[…]` arrays, `[…]` lists, `{k=v, …}` maps, `b"…"` binaries,
//! `:name` symbols, everything else as its natural literal.

use std::fmt::{self, Write};

use crate::atom::Atom;

/// Format a stream of top-level values, space separated.
pub(crate) fn fmt_atoms(atoms: &[Atom<'_>], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut rest = atoms;
    let mut first = true;
    while !rest.is_empty() {
        if !first {
            f.write_char(' ')?;
        }
        first = false;
        rest = fmt_one(rest, f)?;
    }
    Ok(())
}

/// Format one value (compounds consume their bodies) and return the rest of
/// the stream. A truncated stream is a formatting error.
fn fmt_one<'stream, 'a>(
    atoms: &'stream [Atom<'a>],
    f: &mut fmt::Formatter<'_>,
) -> Result<&'stream [Atom<'a>], fmt::Error> {
    let (&atom, mut rest) = atoms.split_first().ok_or(fmt::Error)?;
    match atom {
        Atom::Descriptor => {
            f.write_char('@')?;
            rest = fmt_one(rest, f)?;
            f.write_char(' ')?;
            fmt_one(rest, f)
        }
        Atom::Array(count) => {
            f.write_char('@')?;
            rest = fmt_one(rest, f)?;
            f.write_char('[')?;
            for i in 0..count {
                rest = fmt_one(rest, f)?;
                if i + 1 < count {
                    f.write_str(", ")?;
                }
            }
            f.write_char(']')?;
            Ok(rest)
        }
        Atom::List(count) => {
            f.write_char('[')?;
            for i in 0..count {
                rest = fmt_one(rest, f)?;
                if i + 1 < count {
                    f.write_str(", ")?;
                }
            }
            f.write_char(']')?;
            Ok(rest)
        }
        Atom::Map(count) => {
            f.write_char('{')?;
            for i in 0..count {
                rest = fmt_one(rest, f)?;
                if i % 2 == 0 {
                    f.write_char('=')?;
                } else if i + 1 < count {
                    f.write_str(", ")?;
                }
            }
            f.write_char('}')?;
            Ok(rest)
        }
        _ => {
            fmt_leaf(&atom, f)?;
            Ok(rest)
        }
    }
}

fn fmt_leaf(atom: &Atom<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *atom {
        Atom::Null => f.write_str("null"),
        Atom::Bool(value) => f.write_str(if value { "true" } else { "false" }),
        Atom::Ubyte(value) => write!(f, "{value}"),
        Atom::Byte(value) => write!(f, "{value}"),
        Atom::Ushort(value) => write!(f, "{value}"),
        Atom::Short(value) => write!(f, "{value}"),
        Atom::Uint(value) => write!(f, "{value}"),
        Atom::Int(value) => write!(f, "{value}"),
        Atom::Char(value) => write!(f, "{value}"),
        Atom::Ulong(value) => write!(f, "{value}"),
        Atom::Long(value) => write!(f, "{value}"),
        Atom::Timestamp(value) => write!(f, "{value}"),
        Atom::Float(value) => write!(f, "{value}"),
        Atom::Double(value) => write!(f, "{value}"),
        Atom::Decimal32(value) => write!(f, "D32({value})"),
        Atom::Decimal64(value) => write!(f, "D64({value})"),
        Atom::Decimal128(bytes) => {
            f.write_str("D128(")?;
            for byte in bytes {
                write!(f, "{byte:02x}")?;
            }
            f.write_char(')')
        }
        Atom::Uuid(bytes) => {
            f.write_str("UUID(")?;
            for (i, byte) in bytes.iter().enumerate() {
                if matches!(i, 4 | 6 | 8 | 10) {
                    f.write_char('-')?;
                }
                write!(f, "{byte:02x}")?;
            }
            f.write_char(')')
        }
        Atom::Binary(bytes) => {
            f.write_str("b\"")?;
            quote(bytes, f)?;
            f.write_char('"')
        }
        Atom::String(bytes) => {
            f.write_char('"')?;
            quote(bytes, f)?;
            f.write_char('"')
        }
        Atom::Symbol(bytes) => {
            f.write_char(':')?;
            if bytes.iter().all(u8::is_ascii_alphabetic) {
                for &byte in bytes {
                    f.write_char(byte as char)?;
                }
                Ok(())
            } else {
                f.write_char('"')?;
                quote(bytes, f)?;
                f.write_char('"')
            }
        }
        Atom::ElementKind(kind) => write!(f, "{kind}"),
        // compounds are handled by fmt_one
        _ => Err(fmt::Error),
    }
}

fn quote(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for &byte in bytes {
        match byte {
            b'"' => f.write_str("\\\"")?,
            b'\\' => f.write_str("\\\\")?,
            0x20..=0x7e => f.write_char(byte as char)?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    Ok(())
}
