//! Ziggurat variable length integers store a signed 64-bit integer in 1 to 9 bytes.
//!
//! Negative numbers are stored as their one's complement with a sign flag, so
//! small magnitudes of either sign stay short. The first byte carries the
//! continuation flag (0x80), the sign flag (0x40) and the 6 most significant
//! payload bits. Bytes 2 to 8 carry 7 payload bits each plus a continuation
//! flag. A 9th byte, if present, carries 8 payload bits and ends the number.
//!
//! ```text
//! 1 byte   0SXXXXXX                                  6 bits
//! 2 bytes  1SXXXXXX 0XXXXXXX                        13 bits
//! ...
//! 8 bytes  1SXXXXXX 1XXXXXXX ... 0XXXXXXX           55 bits
//! 9 bytes  1SXXXXXX 1XXXXXXX ... 1XXXXXXX XXXXXXXX  63 bits
//! ```
//!
//! Encodings are canonical: a value is always written with the fewest bytes
//! able to hold it, and the decoder rejects longer encodings.

use bytes::BufMut;

use crate::error::{Error, Result};

/// MAX_VARINT_LEN is the longest possible encoding in bytes.
pub const MAX_VARINT_LEN: usize = 9;

const CONTINUATION_BIT: u8 = 0x80;
const SIGN_BIT: u8 = 0x40;
const FIRST_PAYLOAD_MASK: u8 = 0x3f;
const PAYLOAD_MASK: u8 = 0x7f;

/// VarInt encodes and decodes integers in the Ziggurat varint format.
pub trait VarInt: Sized + Copy {
    /// required_space returns the number of bytes needed to encode self.
    fn required_space(self) -> usize;

    /// encode_var writes self to the front of dst and returns the number of bytes written.
    /// dst must hold at least `required_space()` bytes.
    fn encode_var(self, dst: &mut [u8]) -> usize;

    /// decode_var reads one value from the front of src and returns it
    /// together with the number of bytes consumed.
    fn decode_var(src: &[u8]) -> Result<(Self, usize)>;
}

impl VarInt for i64 {
    fn required_space(self) -> usize {
        let magnitude = if self < 0 { !self } else { self } as u64;
        let bits = (u64::BITS - magnitude.leading_zeros()) as usize;
        match bits {
            0..=6 => 1,
            7..=55 => 1 + (bits - 6).div_ceil(7),
            _ => MAX_VARINT_LEN,
        }
    }

    fn encode_var(self, dst: &mut [u8]) -> usize {
        let negative = self < 0;
        let mut magnitude = if negative { !self } else { self } as u64;

        let n = self.required_space();
        let mut k = n - 1;

        if n == MAX_VARINT_LEN {
            dst[k] = (magnitude & 0xff) as u8;
            magnitude >>= 8;
            k -= 1;
        }

        while k > 0 {
            let mut byte = (magnitude & PAYLOAD_MASK as u64) as u8;
            magnitude >>= 7;
            if k < n - 1 {
                byte |= CONTINUATION_BIT;
            }
            dst[k] = byte;
            k -= 1;
        }

        let mut byte = (magnitude & FIRST_PAYLOAD_MASK as u64) as u8;
        if n > 1 {
            byte |= CONTINUATION_BIT;
        }
        if negative {
            byte |= SIGN_BIT;
        }
        dst[0] = byte;

        n
    }

    fn decode_var(src: &[u8]) -> Result<(Self, usize)> {
        let first = *src.first().ok_or(Error::TruncatedVarInt(0))?;

        let negative = first & SIGN_BIT != 0;
        let mut more = first & CONTINUATION_BIT != 0;
        let mut magnitude = (first & FIRST_PAYLOAD_MASK) as u64;
        let mut len = 1;

        while more {
            let byte = *src.get(len).ok_or(Error::TruncatedVarInt(len))?;
            len += 1;

            if len == MAX_VARINT_LEN {
                magnitude = (magnitude << 8) | byte as u64;
                break;
            }

            magnitude = (magnitude << 7) | (byte & PAYLOAD_MASK) as u64;
            more = byte & CONTINUATION_BIT != 0;
        }

        let magnitude = magnitude as i64;
        let value = if negative { !magnitude } else { magnitude };
        if len > 1 && value.required_space() != len {
            return Err(Error::MalformedVarInt(len));
        }

        Ok((value, len))
    }
}

/// encoded_len returns the length of the varint at the front of src without decoding it.
pub fn encoded_len(src: &[u8]) -> Result<usize> {
    let mut len = 0;
    loop {
        let byte = *src.get(len).ok_or(Error::TruncatedVarInt(len))?;
        len += 1;
        if byte & CONTINUATION_BIT == 0 {
            return Ok(len);
        }
        if len == MAX_VARINT_LEN - 1 {
            // the 9th byte has no continuation flag of its own
            src.get(len).ok_or(Error::TruncatedVarInt(len))?;
            return Ok(MAX_VARINT_LEN);
        }
    }
}

/// skip returns the number of bytes taken by the next `count` varints in src.
pub fn skip(src: &[u8], count: usize) -> Result<usize> {
    let mut offset = 0;
    for _ in 0..count {
        offset += encoded_len(&src[offset..])?;
    }
    Ok(offset)
}

/// put_varint appends the encoding of v to buf and returns its length.
pub fn put_varint<B: BufMut>(buf: &mut B, v: i64) -> usize {
    let mut tmp = [0u8; MAX_VARINT_LEN];
    let n = v.encode_var(&mut tmp);
    buf.put_slice(&tmp[..n]);
    n
}

/// encode_block appends every value of block as a plain varint.
pub fn encode_block<B: BufMut>(buf: &mut B, block: &[i64]) -> usize {
    block.iter().map(|v| put_varint(buf, *v)).sum()
}

/// encode_delta_block appends the first value of block followed by the
/// differences between consecutive values.
pub fn encode_delta_block<B: BufMut>(buf: &mut B, block: &[i64]) -> usize {
    let mut n = 0;
    let mut prev = 0_i64;
    for (i, v) in block.iter().enumerate() {
        let delta = if i == 0 { *v } else { v.wrapping_sub(prev) };
        n += put_varint(buf, delta);
        prev = *v;
    }
    n
}

/// decode_block fills out with consecutive plain varints from src.
pub fn decode_block(src: &[u8], out: &mut [i64]) -> Result<usize> {
    let mut offset = 0;
    for v in out.iter_mut() {
        let (value, n) = i64::decode_var(&src[offset..])?;
        *v = value;
        offset += n;
    }
    Ok(offset)
}

/// decode_delta_block is the inverse of [`encode_delta_block`].
pub fn decode_delta_block(src: &[u8], out: &mut [i64]) -> Result<usize> {
    let mut offset = 0;
    let mut prev = 0_i64;
    for (i, v) in out.iter_mut().enumerate() {
        let (value, n) = i64::decode_var(&src[offset..])?;
        prev = if i == 0 { value } else { prev.wrapping_add(value) };
        *v = prev;
        offset += n;
    }
    Ok(offset)
}
