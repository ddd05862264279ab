//! Wire decode: one self-describing value into a flat atom stream.

use log::debug;

use crate::atom::Atom;
use crate::bytes::ReadCursor;
use crate::codes::TypeCode;
use crate::error::Error;

/// Decode a single top-level value from `input`, appending its flat atom
/// stream to `atoms`. Returns the number of input bytes consumed, so callers
/// feeding from a larger stream can re-enter at the next value.
///
/// On error the stream may hold a partial prefix; callers discard it.
pub fn decode_one<'input>(
    input: &'input [u8],
    atoms: &mut Vec<Atom<'input>>,
) -> Result<usize, Error> {
    let mut cursor = ReadCursor::new(input);
    decode_atom(&mut cursor, atoms)?;
    Ok(cursor.offset())
}

fn decode_atom<'input>(
    cursor: &mut ReadCursor<'input>,
    atoms: &mut Vec<Atom<'input>>,
) -> Result<(), Error> {
    let code = decode_type(cursor, atoms)?;
    decode_value(cursor, atoms, code)
}

/// Read the next type code, unrolling descriptor prefixes into the stream:
/// each 0x00 emits a `Descriptor` atom followed by the decoded descriptor
/// value, and the described value's code is returned.
fn decode_type<'input>(
    cursor: &mut ReadCursor<'input>,
    atoms: &mut Vec<Atom<'input>>,
) -> Result<TypeCode, Error> {
    let byte = cursor.read_u8()?;
    let code = TypeCode::try_from(byte).map_err(|_| {
        debug!("unrecognised typecode: 0x{byte:02x}");
        Error::UnknownTypeCode(byte)
    })?;
    if code != TypeCode::Described {
        return Ok(code);
    }
    atoms.push(Atom::Descriptor);
    decode_atom(cursor, atoms)?;
    decode_type(cursor, atoms)
}

fn decode_value<'input>(
    cursor: &mut ReadCursor<'input>,
    atoms: &mut Vec<Atom<'input>>,
    code: TypeCode,
) -> Result<(), Error> {
    let atom = match code {
        TypeCode::Described => return Err(Error::UnexpectedDescriptor),
        TypeCode::Null => Atom::Null,
        TypeCode::True => Atom::Bool(true),
        TypeCode::False => Atom::Bool(false),
        TypeCode::Boolean => Atom::Bool(cursor.read_u8()? != 0),
        TypeCode::Ubyte => Atom::Ubyte(cursor.read_u8()?),
        TypeCode::Byte => Atom::Byte(cursor.read_u8()? as i8),
        TypeCode::Ushort => Atom::Ushort(cursor.read_u16()?),
        TypeCode::Short => Atom::Short(cursor.read_u16()? as i16),
        TypeCode::Uint => Atom::Uint(cursor.read_u32()?),
        TypeCode::Uint0 => Atom::Uint(0),
        TypeCode::SmallUint => Atom::Uint(cursor.read_u8()?.into()),
        TypeCode::Int => Atom::Int(cursor.read_u32()? as i32),
        TypeCode::SmallInt => Atom::Int((cursor.read_u8()? as i8).into()),
        TypeCode::Char => {
            let raw = cursor.read_u32()?;
            Atom::Char(char::from_u32(raw).ok_or(Error::InvalidChar(raw))?)
        }
        TypeCode::Float => Atom::Float(f32::from_bits(cursor.read_u32()?)),
        TypeCode::Decimal32 => Atom::Decimal32(cursor.read_u32()?),
        TypeCode::Ulong => Atom::Ulong(cursor.read_u64()?),
        TypeCode::Ulong0 => Atom::Ulong(0),
        TypeCode::SmallUlong => Atom::Ulong(cursor.read_u8()?.into()),
        TypeCode::Long => Atom::Long(cursor.read_u64()? as i64),
        TypeCode::SmallLong => Atom::Long((cursor.read_u8()? as i8).into()),
        TypeCode::Timestamp => Atom::Timestamp(cursor.read_u64()? as i64),
        TypeCode::Double => Atom::Double(f64::from_bits(cursor.read_u64()?)),
        TypeCode::Decimal64 => Atom::Decimal64(cursor.read_u64()?),
        TypeCode::Decimal128 => Atom::Decimal128(cursor.read_fixed16()?),
        TypeCode::Uuid => Atom::Uuid(cursor.read_fixed16()?),
        TypeCode::Vbin8 | TypeCode::Str8 | TypeCode::Sym8 => {
            let size = cursor.read_u8()? as usize;
            variable(cursor, code, size)?
        }
        TypeCode::Vbin32 | TypeCode::Str32 | TypeCode::Sym32 => {
            let size = cursor.read_u32()? as usize;
            variable(cursor, code, size)?
        }
        TypeCode::List0 => Atom::List(0),
        TypeCode::Array8 | TypeCode::Array32 => {
            let (_size, count) = compound_header(cursor, code == TypeCode::Array8)?;
            atoms.push(Atom::Array(count));
            let element = decode_type(cursor, atoms)?;
            let kind = element.kind().ok_or(Error::UnexpectedDescriptor)?;
            atoms.push(Atom::ElementKind(kind));
            for _ in 0..count {
                decode_value(cursor, atoms, element)?;
            }
            return Ok(());
        }
        TypeCode::List8 | TypeCode::List32 | TypeCode::Map8 | TypeCode::Map32 => {
            let small = matches!(code, TypeCode::List8 | TypeCode::Map8);
            let (_size, count) = compound_header(cursor, small)?;
            if matches!(code, TypeCode::List8 | TypeCode::List32) {
                atoms.push(Atom::List(count));
            } else {
                atoms.push(Atom::Map(count));
            }
            for _ in 0..count {
                decode_atom(cursor, atoms)?;
            }
            return Ok(());
        }
    };
    atoms.push(atom);
    Ok(())
}

/// Size and count prefixes of a compound, both at the width the code picked.
/// The size is not validated against the remaining input: every child read
/// is underflow-checked on its own.
fn compound_header(cursor: &mut ReadCursor<'_>, small: bool) -> Result<(usize, usize), Error> {
    if small {
        let size = cursor.read_u8()? as usize;
        let count = cursor.read_u8()? as usize;
        Ok((size, count))
    } else {
        let size = cursor.read_u32()? as usize;
        let count = cursor.read_u32()? as usize;
        Ok((size, count))
    }
}

fn variable<'input>(
    cursor: &mut ReadCursor<'input>,
    code: TypeCode,
    size: usize,
) -> Result<Atom<'input>, Error> {
    let data = cursor.read_bytes(size)?;
    Ok(match code {
        TypeCode::Vbin8 | TypeCode::Vbin32 => Atom::Binary(data),
        TypeCode::Str8 | TypeCode::Str32 => Atom::String(data),
        _ => Atom::Symbol(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Kind;

    fn one(input: &[u8]) -> Vec<Atom<'_>> {
        let mut atoms = Vec::new();
        let consumed = decode_one(input, &mut atoms).unwrap();
        assert_eq!(input.len(), consumed);
        atoms
    }

    #[test]
    fn scalars() {
        assert_eq!(vec![Atom::Null], one(&[0x40]));
        assert_eq!(vec![Atom::Bool(true)], one(&[0x41]));
        assert_eq!(vec![Atom::Bool(false)], one(&[0x42]));
        assert_eq!(vec![Atom::Bool(true)], one(&[0x56, 0x01]));
        assert_eq!(vec![Atom::Uint(0)], one(&[0x43]));
        assert_eq!(vec![Atom::Uint(7)], one(&[0x52, 0x07]));
        assert_eq!(vec![Atom::Uint(0x01020304)], one(&[0x70, 1, 2, 3, 4]));
        assert_eq!(vec![Atom::Ulong(0)], one(&[0x44]));
        assert_eq!(vec![Atom::Ulong(255)], one(&[0x53, 0xff]));
        assert_eq!(vec![Atom::Byte(-1)], one(&[0x51, 0xff]));
        // small signed variants sign-extend
        assert_eq!(vec![Atom::Int(-7)], one(&[0x54, 0xf9]));
        assert_eq!(vec![Atom::Long(-7)], one(&[0x55, 0xf9]));
        assert_eq!(vec![Atom::Short(-2)], one(&[0x61, 0xff, 0xfe]));
        assert_eq!(vec![Atom::Char('A')], one(&[0x73, 0, 0, 0, 0x41]));
        assert_eq!(
            vec![Atom::Timestamp(1234)],
            one(&[0x83, 0, 0, 0, 0, 0, 0, 0x04, 0xd2])
        );
    }

    #[test]
    fn floats_are_bit_exact() {
        let pi = std::f32::consts::PI;
        let mut input = vec![0x72];
        input.extend_from_slice(&pi.to_bits().to_be_bytes());
        assert_eq!(vec![Atom::Float(pi)], one(&input));

        let mut input = vec![0x82];
        input.extend_from_slice(&f64::NEG_INFINITY.to_bits().to_be_bytes());
        assert_eq!(vec![Atom::Double(f64::NEG_INFINITY)], one(&input));
    }

    #[test]
    fn variable_width() {
        assert_eq!(vec![Atom::Binary(b"ab")], one(&[0xa0, 2, b'a', b'b']));
        assert_eq!(vec![Atom::String(b"hi")], one(&[0xa1, 2, b'h', b'i']));
        assert_eq!(
            vec![Atom::Symbol(b"s")],
            one(&[0xb3, 0, 0, 0, 1, b's'])
        );
    }

    #[test]
    fn compounds() {
        // list8 of (true, uint0)
        assert_eq!(
            vec![Atom::List(2), Atom::Bool(true), Atom::Uint(0)],
            one(&[0xc0, 2, 2, 0x41, 0x43])
        );
        assert_eq!(vec![Atom::List(0)], one(&[0x45]));
        // map8 of {sym -> smallint}
        assert_eq!(
            vec![Atom::Map(2), Atom::Symbol(b"k"), Atom::Int(3)],
            one(&[0xc1, 6, 2, 0xa3, 1, b'k', 0x54, 3])
        );
    }

    #[test]
    fn arrays_share_one_element_code() {
        assert_eq!(
            vec![
                Atom::Array(2),
                Atom::ElementKind(Kind::Uint),
                Atom::Uint(1),
                Atom::Uint(2),
            ],
            one(&[0xe0, 9, 2, 0x70, 0, 0, 0, 1, 0, 0, 0, 2])
        );
    }

    #[test]
    fn described_values_inline_their_descriptor() {
        // 0x00 smallulong 0x10, then str8 "x"
        assert_eq!(
            vec![
                Atom::Descriptor,
                Atom::Ulong(0x10),
                Atom::String(b"x"),
            ],
            one(&[0x00, 0x53, 0x10, 0xa1, 1, b'x'])
        );
    }

    #[test]
    fn described_array() {
        // array8, count 1, descriptor sym8 "d", element code smallulong
        assert_eq!(
            vec![
                Atom::Array(1),
                Atom::Descriptor,
                Atom::Symbol(b"d"),
                Atom::ElementKind(Kind::Ulong),
                Atom::Ulong(9),
            ],
            one(&[0xe0, 8, 1, 0x00, 0xa3, 1, b'd', 0x53, 9])
        );
    }

    #[test]
    fn trailing_input_is_left_alone() {
        let mut atoms = Vec::new();
        let consumed = decode_one(&[0x41, 0x42, 0x43], &mut atoms).unwrap();
        assert_eq!(1, consumed);
        assert_eq!(vec![Atom::Bool(true)], atoms);
    }

    #[test]
    fn errors() {
        let mut atoms = Vec::new();
        assert_eq!(Err(Error::Underflow), decode_one(&[], &mut atoms));
        assert_eq!(Err(Error::Underflow), decode_one(&[0x70, 1, 2], &mut atoms));
        assert_eq!(
            Err(Error::UnknownTypeCode(0x01)),
            decode_one(&[0x01], &mut atoms)
        );
        // truncated variable payload
        assert_eq!(
            Err(Error::Underflow),
            decode_one(&[0xa0, 5, b'a'], &mut atoms)
        );
        // invalid unicode scalar
        assert_eq!(
            Err(Error::InvalidChar(0x00d8_0000)),
            decode_one(&[0x73, 0x00, 0xd8, 0x00, 0x00], &mut atoms)
        );
    }
}
