//! Fixed-alphabet nucleotide packing
//!
//! Strategy: 2-bit encoding + sparse exception list
//! - A/C/G/T packed 4 bases/byte
//! - Any other byte (N, lowercase, newline) is packed as A and listed as an
//!   exception: (gap since previous exception, original byte)
//! - Lossless for every input; non-DNA blocks simply stop shrinking and the
//!   dispatcher stores them verbatim
//!
//! Payload: [n_exceptions varint][(gap varint, byte) * n][packed bases]

use super::backend::BackendError;
use super::{read_varint, write_varint};

#[inline(always)]
fn base_code(base: u8) -> Option<u8> {
    match base {
        b'A' => Some(0b00),
        b'C' => Some(0b01),
        b'G' => Some(0b10),
        b'T' => Some(0b11),
        _ => None,
    }
}

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

pub(crate) fn encode(src: &[u8], out: &mut Vec<u8>) -> Result<(), BackendError> {
    let mut packed = vec![0u8; (src.len() + 3) / 4];
    let mut exceptions: Vec<(usize, u8)> = Vec::new();
    let mut last = 0usize;

    for (i, &base) in src.iter().enumerate() {
        let code = match base_code(base) {
            Some(code) => code,
            None => {
                exceptions.push((i - last, base));
                last = i;
                0b00
            }
        };
        packed[i / 4] |= code << ((i % 4) * 2);
    }

    write_varint(out, exceptions.len());
    for (gap, byte) in exceptions {
        write_varint(out, gap);
        out.push(byte);
    }
    out.extend_from_slice(&packed);
    Ok(())
}

pub(crate) fn decode(src: &[u8], out: &mut Vec<u8>, original_len: usize) -> Result<(), BackendError> {
    let mut offset = 0;
    let n_exceptions = read_varint(src, &mut offset).ok_or(BackendError::TruncatedInput)?;
    if n_exceptions > original_len {
        return Err(BackendError::Data);
    }

    let mut exceptions = Vec::with_capacity(n_exceptions);
    let mut pos = 0usize;
    for _ in 0..n_exceptions {
        let gap = read_varint(src, &mut offset).ok_or(BackendError::TruncatedInput)?;
        let byte = *src.get(offset).ok_or(BackendError::TruncatedInput)?;
        offset += 1;
        pos = pos.checked_add(gap).ok_or(BackendError::Data)?;
        if pos >= original_len {
            return Err(BackendError::Data);
        }
        exceptions.push((pos, byte));
    }

    let packed_len = (original_len + 3) / 4;
    let packed = src.get(offset..offset + packed_len).ok_or(BackendError::TruncatedInput)?;
    if offset + packed_len != src.len() {
        return Err(BackendError::Data);
    }

    let start = out.len();
    out.reserve(original_len);
    for i in 0..original_len {
        let bits = (packed[i / 4] >> ((i % 4) * 2)) & 0b11;
        out.push(BASES[bits as usize]);
    }
    for (pos, byte) in exceptions {
        out[start + pos] = byte;
    }
    Ok(())
}
