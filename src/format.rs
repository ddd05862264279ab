//! The fill/scan format-string interpreter.
//!
//! A one-character-per-element descriptor language drives the tree in both
//! directions: `fill` writes values at the cursor, `scan` extracts them.
//! Rust has no varargs, so arguments travel as ordered slices: [`Fill`]
//! values in, [`Scan`] out-references back.
//!
//! | Code | Element |
//! |------|---------|
//! | `n` | null |
//! | `o` | bool |
//! | `B`/`b` | ubyte / byte |
//! | `H`/`h` | ushort / short |
//! | `I`/`i` | uint / int |
//! | `L`/`l` | ulong / long |
//! | `t` | timestamp |
//! | `f`/`d` | float / double |
//! | `c` | char |
//! | `z` | binary |
//! | `S`/`s` | string / symbol |
//! | `D` | descriptor: the next two elements are the descriptor value and the described value |
//! | `@` | array (`@D` described); `T` stamps the element kind, then `[`…`]` holds the elements |
//! | `[`…`]` / `{`…`}` | list / map |
//! | `?` | fill: write the next element only if the predicate holds; scan: report whether the next code matched |
//! | `*` | repetition; `*s` writes each symbol of the argument slice |
//! | `C` | fill: splice one element from another tree; scan: copy the next element into another tree |
//! | `.` | scan only: skip one element |

use log::warn;

use crate::atom::Kind;
use crate::data::Data;
use crate::error::Error;

/// One fill argument, consumed in format order.
#[derive(Debug, Clone, Copy)]
pub enum Fill<'a> {
    Bool(bool),
    Ubyte(u8),
    Byte(i8),
    Ushort(u16),
    Short(i16),
    Uint(u32),
    Int(i32),
    Char(char),
    Ulong(u64),
    Long(i64),
    Timestamp(i64),
    Float(f32),
    Double(f64),
    /// Payload for `z`, `S` and `s`
    Bytes(&'a [u8]),
    /// Absent payload for `z`, `S` and `s`: a null is written instead
    Null,
    /// Element kind for `T`
    Kind(Kind),
    /// Guard for `?`
    Predicate(bool),
    /// Symbol list for `*s`
    Symbols(&'a [&'a [u8]]),
    /// Source tree for `C`
    Tree(&'a Data),
}

/// One scan output slot, written in format order. Byte payloads are copied
/// out, so they stay valid independently of the scanned tree.
#[derive(Debug)]
pub enum Scan<'a> {
    Bool(&'a mut bool),
    Ubyte(&'a mut u8),
    Byte(&'a mut i8),
    Ushort(&'a mut u16),
    Short(&'a mut i16),
    Uint(&'a mut u32),
    Int(&'a mut i32),
    Char(&'a mut char),
    Ulong(&'a mut u64),
    Long(&'a mut i64),
    Timestamp(&'a mut i64),
    Float(&'a mut f32),
    Double(&'a mut f64),
    /// Receives `z`, `S` and `s` payloads
    Bytes(&'a mut Vec<u8>),
    /// Receives the `?` match flag
    Found(&'a mut bool),
    /// Receives the `C` element
    Tree(&'a mut Data),
}

fn next_fill<'args, 'a>(
    args: &mut std::slice::Iter<'args, Fill<'a>>,
    code: char,
) -> Result<Fill<'a>, Error> {
    args.next().copied().ok_or(Error::MissingArgument(code))
}

fn next_scan<'args, 'a>(
    args: &mut std::slice::IterMut<'args, Scan<'a>>,
    code: char,
) -> Result<&'args mut Scan<'a>, Error> {
    args.next().ok_or(Error::MissingArgument(code))
}

/// After each element lands, walk back out of any structure that is now
/// complete: a descriptor holds exactly two elements, and the null sentinel
/// a failed `?` wrote absorbs one element and discards it.
fn autoexit(data: &mut Data) {
    loop {
        match (data.parent_kind(), data.parent_children()) {
            (Some(Kind::Described), 2) => {
                data.exit();
            }
            (Some(Kind::Null), 1) => {
                data.exit();
                data.truncate_current();
            }
            _ => break,
        }
    }
}

pub(crate) fn vfill(data: &mut Data, fmt: &str, args: &[Fill<'_>]) -> Result<(), Error> {
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();
    let mut last = None;
    while let Some(code) = chars.next() {
        match code {
            'n' => data.put_null(),
            'o' => match next_fill(&mut args, code)? {
                Fill::Bool(value) => data.put_bool(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'B' => match next_fill(&mut args, code)? {
                Fill::Ubyte(value) => data.put_ubyte(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'b' => match next_fill(&mut args, code)? {
                Fill::Byte(value) => data.put_byte(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'H' => match next_fill(&mut args, code)? {
                Fill::Ushort(value) => data.put_ushort(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'h' => match next_fill(&mut args, code)? {
                Fill::Short(value) => data.put_short(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'I' => match next_fill(&mut args, code)? {
                Fill::Uint(value) => data.put_uint(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'i' => match next_fill(&mut args, code)? {
                Fill::Int(value) => data.put_int(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'L' => match next_fill(&mut args, code)? {
                Fill::Ulong(value) => data.put_ulong(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'l' => match next_fill(&mut args, code)? {
                Fill::Long(value) => data.put_long(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            't' => match next_fill(&mut args, code)? {
                Fill::Timestamp(value) => data.put_timestamp(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'f' => match next_fill(&mut args, code)? {
                Fill::Float(value) => data.put_float(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'd' => match next_fill(&mut args, code)? {
                Fill::Double(value) => data.put_double(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'c' => match next_fill(&mut args, code)? {
                Fill::Char(value) => data.put_char(value),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'z' | 'S' | 's' => match next_fill(&mut args, code)? {
                Fill::Bytes(bytes) => match code {
                    'z' => data.put_binary(bytes),
                    'S' => data.put_string(bytes),
                    _ => data.put_symbol(bytes),
                },
                Fill::Null => data.put_null(),
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'D' => {
                data.put_described();
                data.enter();
            }
            'T' => match next_fill(&mut args, code)? {
                Fill::Kind(kind) => {
                    if !data.set_parent_array_kind(kind) {
                        return Err(Error::NakedType);
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            '@' => {
                let described = chars.peek() == Some(&'D');
                if described {
                    chars.next();
                }
                data.put_array(described, Kind::Null);
                data.enter();
            }
            '[' => {
                // a 'T' just before means this bracket is the array body
                if last != Some('T') {
                    data.put_list();
                    data.enter();
                }
            }
            '{' => {
                data.put_map();
                data.enter();
            }
            ']' | '}' => {
                if !data.exit() {
                    return Err(Error::ExitFailed);
                }
            }
            '?' => match next_fill(&mut args, code)? {
                Fill::Predicate(value) => {
                    if !value {
                        data.put_null();
                        data.enter();
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            '*' => {
                let symbols = match next_fill(&mut args, code)? {
                    Fill::Symbols(symbols) => symbols,
                    _ => return Err(Error::ArgumentMismatch(code)),
                };
                match chars.next() {
                    Some('s') => {
                        for symbol in symbols {
                            data.put_symbol(symbol);
                            autoexit(data);
                        }
                    }
                    Some(sub) => {
                        warn!("unrecognized * code: {sub:?}");
                        return Err(Error::UnrecognizedFill(sub));
                    }
                    None => return Err(Error::UnrecognizedFill('*')),
                }
            }
            'C' => match next_fill(&mut args, code)? {
                Fill::Tree(src) => {
                    if src.size() > 0 {
                        data.appendn(src, 1);
                    } else {
                        data.put_null();
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            other => {
                warn!("unrecognized fill code: {other:?}");
                return Err(Error::UnrecognizedFill(other));
            }
        }
        autoexit(data);
        last = Some(code);
    }
    Ok(())
}

/// Advance to the next element; at the end of a descriptor's children, step
/// out and keep going. `None` both when siblings are exhausted and when the
/// cursor cannot move, callers sort the two out by what they expected.
fn scan_next(data: &mut Data, suspend: bool) -> Option<Kind> {
    if suspend {
        return None;
    }
    if data.next() {
        return data.kind();
    }
    if data.parent_kind() == Some(Kind::Described) {
        data.exit();
        return scan_next(data, false);
    }
    None
}

pub(crate) fn vscan(data: &mut Data, fmt: &str, args: &mut [Scan<'_>]) -> Result<(), Error> {
    data.rewind();
    let mut args = args.iter_mut();
    let mut pending: Option<&mut bool> = None;
    let mut at = false;
    let mut level = 0i32;
    let mut count_level = -1i32;
    let mut resume = 0i32;
    let mut chars = fmt.chars().peekable();
    while let Some(code) = chars.next() {
        let suspend = resume > 0;
        let mut scanned = false;
        let mut decrement = true;
        match code {
            'n' => {
                scanned = matches!(scan_next(data, suspend), Some(Kind::Null));
            }
            'o' => match next_scan(&mut args, code)? {
                Scan::Bool(value) => {
                    **value = false;
                    if matches!(scan_next(data, suspend), Some(Kind::Bool)) {
                        **value = data.get_bool();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'B' => match next_scan(&mut args, code)? {
                Scan::Ubyte(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Ubyte)) {
                        **value = data.get_ubyte();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'b' => match next_scan(&mut args, code)? {
                Scan::Byte(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Byte)) {
                        **value = data.get_byte();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'H' => match next_scan(&mut args, code)? {
                Scan::Ushort(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Ushort)) {
                        **value = data.get_ushort();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'h' => match next_scan(&mut args, code)? {
                Scan::Short(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Short)) {
                        **value = data.get_short();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'I' => match next_scan(&mut args, code)? {
                Scan::Uint(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Uint)) {
                        **value = data.get_uint();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'i' => match next_scan(&mut args, code)? {
                Scan::Int(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Int)) {
                        **value = data.get_int();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'c' => match next_scan(&mut args, code)? {
                Scan::Char(value) => {
                    **value = '\0';
                    if matches!(scan_next(data, suspend), Some(Kind::Char)) {
                        **value = data.get_char();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'L' => match next_scan(&mut args, code)? {
                Scan::Ulong(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Ulong)) {
                        **value = data.get_ulong();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'l' => match next_scan(&mut args, code)? {
                Scan::Long(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Long)) {
                        **value = data.get_long();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            't' => match next_scan(&mut args, code)? {
                Scan::Timestamp(value) => {
                    **value = 0;
                    if matches!(scan_next(data, suspend), Some(Kind::Timestamp)) {
                        **value = data.get_timestamp();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'f' => match next_scan(&mut args, code)? {
                Scan::Float(value) => {
                    **value = 0.0;
                    if matches!(scan_next(data, suspend), Some(Kind::Float)) {
                        **value = data.get_float();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'd' => match next_scan(&mut args, code)? {
                Scan::Double(value) => {
                    **value = 0.0;
                    if matches!(scan_next(data, suspend), Some(Kind::Double)) {
                        **value = data.get_double();
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'z' | 'S' | 's' => match next_scan(&mut args, code)? {
                Scan::Bytes(out) => {
                    out.clear();
                    let want = match code {
                        'z' => Kind::Binary,
                        'S' => Kind::String,
                        _ => Kind::Symbol,
                    };
                    if scan_next(data, suspend) == Some(want) {
                        out.extend_from_slice(data.get_bytes());
                        scanned = true;
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            'D' => {
                if !suspend {
                    let point = data.point_raw();
                    match scan_next(data, false) {
                        Some(Kind::Described) => {
                            data.enter();
                            scanned = true;
                        }
                        found => {
                            // the mismatched value stays unconsumed; void
                            // the descriptor-body code that follows
                            if found.is_some() {
                                data.set_point_raw(point);
                            }
                            resume = 2;
                            count_level = level;
                        }
                    }
                }
            }
            '@' => {
                if !suspend {
                    let point = data.point_raw();
                    match scan_next(data, false) {
                        Some(Kind::Array) => {
                            data.enter();
                            scanned = true;
                            at = true;
                        }
                        found => {
                            if found.is_some() {
                                data.set_point_raw(point);
                            }
                            resume = 2;
                            count_level = level;
                        }
                    }
                }
            }
            '[' => {
                decrement = false;
                if at {
                    scanned = true;
                    at = false;
                } else if !suspend {
                    let point = data.point_raw();
                    match scan_next(data, false) {
                        Some(Kind::List) => {
                            data.enter();
                            scanned = true;
                        }
                        found => {
                            if found.is_some() {
                                data.set_point_raw(point);
                            }
                            resume = 1;
                            count_level = level;
                        }
                    }
                }
                level += 1;
            }
            '{' => {
                decrement = false;
                if !suspend {
                    let point = data.point_raw();
                    match scan_next(data, false) {
                        Some(Kind::Map) => {
                            data.enter();
                            scanned = true;
                        }
                        found => {
                            if found.is_some() {
                                data.set_point_raw(point);
                            }
                            resume = 1;
                            count_level = level;
                        }
                    }
                }
                level += 1;
            }
            ']' | '}' => {
                level -= 1;
                if !suspend && !data.exit() {
                    return Err(Error::ExitFailed);
                }
            }
            '.' => {
                scanned = scan_next(data, suspend).is_some();
            }
            '?' => {
                decrement = false;
                if chars.peek().is_none() || chars.peek() == Some(&'?') {
                    return Err(Error::OrphanOption);
                }
                match next_scan(&mut args, code)? {
                    Scan::Found(flag) => pending = Some(&mut **flag),
                    _ => return Err(Error::ArgumentMismatch(code)),
                }
            }
            'C' => match next_scan(&mut args, code)? {
                Scan::Tree(dst) => {
                    if !suspend {
                        if data.peek().is_some_and(|kind| kind != Kind::Null) {
                            let before = dst.size();
                            dst.append_peeked(data);
                            scanned = dst.size() > before;
                        }
                        data.next();
                    }
                }
                _ => return Err(Error::ArgumentMismatch(code)),
            },
            other => {
                warn!("unrecognized scan code: {other:?}");
                return Err(Error::UnrecognizedScan(other));
            }
        }
        if code != '?' {
            if let Some(flag) = pending.take() {
                *flag = scanned;
            }
        }
        if decrement && resume > 0 && level == count_level {
            resume -= 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_scalars_and_structure() {
        let mut data = Data::new(0);
        data.fill(
            "o[IS]{sl}",
            &[
                Fill::Bool(true),
                Fill::Uint(42),
                Fill::Bytes(b"hi"),
                Fill::Bytes(b"key"),
                Fill::Long(-9),
            ],
        )
        .unwrap();
        assert_eq!("true [42, \"hi\"] {:key=-9}", data.to_string());
    }

    #[test]
    fn fill_descriptor_takes_two_elements() {
        let mut data = Data::new(0);
        data.fill("DLlI", &[
            Fill::Ulong(0x12),
            Fill::Long(-7),
            Fill::Uint(5),
        ])
        .unwrap();
        // the uint lands after the described value, not inside it
        assert_eq!("@18 -7 5", data.to_string());
    }

    #[test]
    fn fill_missing_payload_writes_null() {
        let mut data = Data::new(0);
        data.fill("SzS", &[Fill::Bytes(b"a"), Fill::Null, Fill::Bytes(b"b")])
            .unwrap();
        assert_eq!("\"a\" null \"b\"", data.to_string());
    }

    #[test]
    fn fill_failed_predicate_swallows_the_composite() {
        let mut data = Data::new(0);
        data.fill(
            "?[I]?[I]",
            &[
                Fill::Predicate(false),
                Fill::Uint(1),
                Fill::Predicate(true),
                Fill::Uint(2),
            ],
        )
        .unwrap();
        assert_eq!("null [2]", data.to_string());
    }

    #[test]
    fn fill_symbol_repetition() {
        let mut data = Data::new(0);
        let symbols: &[&[u8]] = &[b"a", b"b", b"c"];
        data.fill("[*s]", &[Fill::Symbols(symbols)]).unwrap();
        assert_eq!("[:a, :b, :c]", data.to_string());
    }

    #[test]
    fn fill_splices_one_element_from_another_tree() {
        let mut src = Data::new(0);
        src.put_uint(7);
        src.put_uint(8);
        let empty = Data::new(0);
        let mut data = Data::new(0);
        data.fill("[CC]", &[Fill::Tree(&src), Fill::Tree(&empty)])
            .unwrap();
        assert_eq!("[7, null]", data.to_string());
    }

    #[test]
    fn fill_rejects_naked_type() {
        let mut data = Data::new(0);
        assert_eq!(
            Err(Error::NakedType),
            data.fill("[T]", &[Fill::Kind(Kind::Uint)])
        );
    }

    #[test]
    fn fill_rejects_mismatched_arguments() {
        let mut data = Data::new(0);
        assert_eq!(
            Err(Error::ArgumentMismatch('I')),
            data.fill("I", &[Fill::Bool(true)])
        );
        assert_eq!(Err(Error::MissingArgument('I')), data.fill("I", &[]));
        assert_eq!(
            Err(Error::UnrecognizedFill('x')),
            data.fill("x", &[])
        );
    }

    #[test]
    fn scan_reads_back_what_fill_wrote() {
        let mut data = Data::new(0);
        data.fill(
            "[IoS]",
            &[Fill::Uint(9), Fill::Bool(true), Fill::Bytes(b"hey")],
        )
        .unwrap();
        let mut n = 0u32;
        let mut flag = false;
        let mut text = Vec::new();
        data.scan(
            "[IoS]",
            &mut [
                Scan::Uint(&mut n),
                Scan::Bool(&mut flag),
                Scan::Bytes(&mut text),
            ],
        )
        .unwrap();
        assert_eq!(9, n);
        assert!(flag);
        assert_eq!(b"hey".to_vec(), text);
    }

    #[test]
    fn scan_skip_and_found_flag() {
        let mut data = Data::new(0);
        data.fill("Il", &[Fill::Uint(1), Fill::Long(-2)]).unwrap();
        let mut value = 0i64;
        let mut found = false;
        data.scan(".?l", &mut [Scan::Found(&mut found), Scan::Long(&mut value)])
            .unwrap();
        assert!(found);
        assert_eq!(-2, value);

        let mut missing = true;
        let mut text = Vec::new();
        data.scan(
            ".?S",
            &mut [Scan::Found(&mut missing), Scan::Bytes(&mut text)],
        )
        .unwrap();
        assert!(!missing);
        assert!(text.is_empty());
    }

    #[test]
    fn scan_missing_descriptor_suspends_and_resumes() {
        let mut data = Data::new(0);
        data.put_string(b"hello");
        let mut found = true;
        let mut text = Vec::new();
        data.scan(
            "?D.S",
            &mut [Scan::Found(&mut found), Scan::Bytes(&mut text)],
        )
        .unwrap();
        assert!(!found);
        assert_eq!(b"hello".to_vec(), text);
    }

    #[test]
    fn scan_present_descriptor_reads_the_described_value() {
        let mut data = Data::new(0);
        data.put_described();
        data.enter();
        data.put_ulong(0x10);
        data.put_string(b"hello");
        data.exit();
        let mut found = false;
        let mut text = Vec::new();
        data.scan(
            "?D.S",
            &mut [Scan::Found(&mut found), Scan::Bytes(&mut text)],
        )
        .unwrap();
        assert!(found);
        assert_eq!(b"hello".to_vec(), text);
    }

    #[test]
    fn scan_missing_list_voids_its_body() {
        let mut data = Data::new(0);
        data.put_uint(5);
        data.put_bool(true);
        let mut inner = 9u32;
        let mut flag = false;
        data.scan("[I]o", &mut [Scan::Uint(&mut inner), Scan::Bool(&mut flag)])
            .unwrap();
        // the bracket body is voided, then the live codes continue; the
        // unmatched uint is left where it was
        assert_eq!(0, inner);
        assert!(!flag);
    }

    #[test]
    fn scan_copies_an_element_into_another_tree() {
        let mut data = Data::new(0);
        data.fill("[ISl]", &[Fill::Uint(1), Fill::Bytes(b"x"), Fill::Long(-1)])
            .unwrap();
        let mut picked = Data::new(0);
        let mut tail = 0i64;
        data.scan(
            "[.Cl]",
            &mut [Scan::Tree(&mut picked), Scan::Long(&mut tail)],
        )
        .unwrap();
        assert_eq!("\"x\"", picked.to_string());
        assert_eq!(-1, tail);
    }

    #[test]
    fn scan_rejects_trailing_option() {
        let mut data = Data::new(0);
        data.put_uint(1);
        let mut flag = false;
        assert_eq!(
            Err(Error::OrphanOption),
            data.scan("?", &mut [Scan::Found(&mut flag)])
        );
        assert_eq!(
            Err(Error::UnrecognizedScan('x')),
            data.scan("x", &mut [])
        );
    }
}
