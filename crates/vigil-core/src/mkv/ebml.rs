//! EBML primitives
//!
//! Variable-length integers and element IDs. Every reader is bounds-checked:
//! reading past the buffer yields `None` instead of panicking.

use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::be_u8;
use nom::{IResult, Parser};

/// Size value reserved for "unknown length" at each vint width
fn unknown_size(len: usize) -> u64 {
    (1u64 << (7 * len)) - 1
}

/// Width in bytes of a vint, from the position of the leading byte's top set bit
pub fn vint_length(first: u8) -> Option<usize> {
    if first == 0 {
        None
    } else {
        Some(first.leading_zeros() as usize + 1)
    }
}

/// Data size: length marker stripped, value big-endian
pub fn vint(input: &[u8]) -> IResult<&[u8], VInt> {
    let leading: IResult<&[u8], u8> = be_u8(input);
    let (rest, first) = leading?;
    let len = vint_length(first).ok_or_else(|| nom::Err::Error(NomError::new(input, ErrorKind::Verify)))?;
    let body: IResult<&[u8], &[u8]> = take(len - 1).parse(rest);
    let (rest, tail) = body?;

    let marker_mask = ((1u16 << (8 - len)) - 1) as u8;
    let value = tail
        .iter()
        .fold(u64::from(first & marker_mask), |acc, &b| (acc << 8) | u64::from(b));

    Ok((
        rest,
        VInt {
            value,
            len,
            unknown: value == unknown_size(len),
        },
    ))
}

/// Element ID: marker kept, 1..=4 bytes
pub fn element_id(input: &[u8]) -> IResult<&[u8], u32> {
    let leading: IResult<&[u8], u8> = be_u8(input);
    let (_, first) = leading?;
    let len = vint_length(first)
        .filter(|&l| l <= 4)
        .ok_or_else(|| nom::Err::Error(NomError::new(input, ErrorKind::Verify)))?;
    let body: IResult<&[u8], &[u8]> = take(len).parse(input);
    let (rest, bytes) = body?;
    let id = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    Ok((rest, id))
}

/// Decoded variable-length integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VInt {
    pub value: u64,
    /// Bytes consumed, marker byte included
    pub len: usize,
    /// All value bits set: size is unknown
    pub unknown: bool,
}

/// Read a vint at `pos`
pub fn read_vint(buf: &[u8], pos: usize) -> Option<VInt> {
    let input = buf.get(pos..)?;
    vint(input).ok().map(|(_, v)| v)
}

/// Read an element ID at `pos`, returning the ID and its width
pub fn read_element_id(buf: &[u8], pos: usize) -> Option<(u32, usize)> {
    let input = buf.get(pos..)?;
    element_id(input)
        .ok()
        .map(|(rest, id)| (id, input.len() - rest.len()))
}

/// Element header at `pos`: id, data start, declared size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    pub data_start: usize,
    pub size: VInt,
}

pub fn read_header(buf: &[u8], pos: usize) -> Option<ElementHeader> {
    let (id, id_len) = read_element_id(buf, pos)?;
    let size = read_vint(buf, pos + id_len)?;
    Some(ElementHeader {
        id,
        data_start: pos + id_len + size.len,
        size,
    })
}

/// Big-endian unsigned integer; zero when out of bounds or wider than 8 bytes
pub fn read_uint(buf: &[u8], start: usize, end: usize) -> u64 {
    match buf.get(start..end) {
        Some(bytes) if bytes.len() <= 8 => bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        _ => 0,
    }
}

/// UTF-8 string with trailing NULs stripped; empty when out of bounds
pub fn read_string(buf: &[u8], start: usize, end: usize) -> String {
    match buf.get(start..end) {
        Some(bytes) => {
            let trimmed = match bytes.iter().rposition(|&b| b != 0) {
                Some(last) => &bytes[..=last],
                None => &[][..],
            };
            String::from_utf8_lossy(trimmed).into_owned()
        }
        None => String::new(),
    }
}

/// Position of `pattern` at or after `from`
pub fn find_pattern(buf: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|offset| from + offset)
}
