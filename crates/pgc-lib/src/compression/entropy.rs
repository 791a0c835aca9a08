/// Static order-0 entropy coding with ANS (constriction).
///
/// Symbol counts are measured once per block and shipped with the payload, so
/// the decoder rebuilds the identical categorical model.
///
/// Payload: [alphabet][count varint per symbol][n_words varint][words: u32 LE]

use super::backend::BackendError;
use super::range_coder::Alphabet;
use super::{read_varint, write_varint};
use constriction::stream::model::DefaultContiguousCategoricalEntropyModel;
use constriction::stream::stack::DefaultAnsCoder;
use constriction::stream::{Decode, Encode};
use constriction::UnwrapInfallible;

fn build_model(counts: &[usize]) -> Result<DefaultContiguousCategoricalEntropyModel, BackendError> {
    let total: usize = counts.iter().sum();
    let probabilities: Vec<f64> = counts.iter().map(|&c| c as f64 / total as f64).collect();
    DefaultContiguousCategoricalEntropyModel::from_floating_point_probabilities_fast(&probabilities, None)
        .map_err(|_| BackendError::Param)
}

pub(crate) fn encode(src: &[u8], out: &mut Vec<u8>) -> Result<(), BackendError> {
    if src.is_empty() {
        return Err(BackendError::Param);
    }
    let alphabet = Alphabet::scan(src);
    alphabet.write(out);
    if alphabet.len() == 1 {
        return Ok(());
    }

    let mut counts = vec![0usize; alphabet.len()];
    for &b in src {
        counts[alphabet.index_of(b)] += 1;
    }
    for &c in &counts {
        write_varint(out, c);
    }

    let model = build_model(&counts)?;
    let mut coder = DefaultAnsCoder::new();
    // ANS is a stack: encode in reverse so decoding yields forward order
    for &b in src.iter().rev() {
        coder.encode_symbol(alphabet.index_of(b), &model)
            .map_err(|_| BackendError::Param)?;
    }
    let words = coder.into_compressed().unwrap_infallible();

    write_varint(out, words.len());
    out.reserve(words.len() * 4);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
    Ok(())
}

pub(crate) fn decode(src: &[u8], out: &mut Vec<u8>, original_len: usize) -> Result<(), BackendError> {
    let (alphabet, mut offset) = Alphabet::read(src)?;
    if alphabet.len() == 1 {
        out.resize(out.len() + original_len, alphabet.symbols[0]);
        return Ok(());
    }

    let mut counts = Vec::with_capacity(alphabet.len());
    for _ in 0..alphabet.len() {
        let c = read_varint(src, &mut offset).ok_or(BackendError::TruncatedInput)?;
        if c == 0 {
            return Err(BackendError::Data);
        }
        counts.push(c);
    }
    if counts.iter().sum::<usize>() != original_len {
        return Err(BackendError::Data);
    }

    let n_words = read_varint(src, &mut offset).ok_or(BackendError::TruncatedInput)?;
    let word_bytes = src.get(offset..).ok_or(BackendError::TruncatedInput)?;
    if word_bytes.len() < n_words.saturating_mul(4) {
        return Err(BackendError::TruncatedInput);
    }
    let words: Vec<u32> = word_bytes[..n_words * 4]
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();

    let model = build_model(&counts)?;
    let mut coder = DefaultAnsCoder::from_compressed(words).map_err(|_| BackendError::Data)?;
    out.reserve(original_len);
    for _ in 0..original_len {
        let sym = coder.decode_symbol(&model).map_err(|_| BackendError::Data)?;
        let byte = *alphabet.symbols.get(sym).ok_or(BackendError::Data)?;
        out.push(byte);
    }
    Ok(())
}
