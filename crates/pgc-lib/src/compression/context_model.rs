//! Order-k context modelling on top of the adaptive range coder.
//!
//! Context: the previous `order` bytes (1..=4), packed exactly into a u32.
//! Each context owns an adaptive frequency model over the block alphabet.
//! Once `MAX_CONTEXTS` models exist, unseen contexts share one escape model so
//! memory stays bounded on high-entropy input.

use super::backend::{BackendError, MAX_CONTEXT_ORDER};
use super::range_coder::{AdaptiveModel, Alphabet, RangeDecoder, RangeEncoder};
use rustc_hash::FxHashMap;

const MAX_CONTEXTS: usize = 1 << 14;

struct ContextTable {
    mask: u32,
    history: u32,
    n_symbols: usize,
    models: FxHashMap<u32, AdaptiveModel>,
    escape: AdaptiveModel,
}

impl ContextTable {
    fn new(order: u8, n_symbols: usize) -> Self {
        let mask = if order >= 4 { u32::MAX } else { (1u32 << (8 * order as u32)) - 1 };
        Self {
            mask,
            history: 0,
            n_symbols,
            models: FxHashMap::default(),
            escape: AdaptiveModel::new(n_symbols),
        }
    }

    #[inline(always)]
    fn current(&mut self) -> &mut AdaptiveModel {
        let key = self.history & self.mask;
        if self.models.len() >= MAX_CONTEXTS && !self.models.contains_key(&key) {
            return &mut self.escape;
        }
        let n_symbols = self.n_symbols;
        self.models.entry(key).or_insert_with(|| AdaptiveModel::new(n_symbols))
    }

    #[inline(always)]
    fn push(&mut self, byte: u8) {
        self.history = (self.history << 8) | byte as u32;
    }
}

fn check_order(order: u8) -> Result<(), BackendError> {
    if order == 0 || order > MAX_CONTEXT_ORDER {
        return Err(BackendError::Param);
    }
    Ok(())
}

pub(crate) fn encode(src: &[u8], order: u8, out: &mut Vec<u8>) -> Result<(), BackendError> {
    check_order(order)?;
    if src.is_empty() {
        return Err(BackendError::Param);
    }
    let alphabet = Alphabet::scan(src);
    alphabet.write(out);
    if alphabet.len() == 1 {
        return Ok(());
    }

    let mut contexts = ContextTable::new(order, alphabet.len());
    let mut encoder = RangeEncoder::new(out);
    for &b in src {
        let sym = alphabet.index_of(b);
        let model = contexts.current();
        encoder.encode(model, sym);
        model.update(sym);
        contexts.push(b);
    }
    encoder.finish();
    Ok(())
}

pub(crate) fn decode(src: &[u8], order: u8, out: &mut Vec<u8>, original_len: usize) -> Result<(), BackendError> {
    check_order(order)?;
    let (alphabet, used) = Alphabet::read(src)?;
    if alphabet.len() == 1 {
        out.resize(out.len() + original_len, alphabet.symbols[0]);
        return Ok(());
    }

    out.reserve(original_len);
    let mut contexts = ContextTable::new(order, alphabet.len());
    let mut decoder = RangeDecoder::new(&src[used..]);
    for _ in 0..original_len {
        let model = contexts.current();
        let sym = decoder.decode(model);
        model.update(sym);
        let byte = alphabet.symbols[sym];
        out.push(byte);
        contexts.push(byte);
    }
    decoder.check_complete()
}
