//! Adaptive range coding over a block-local byte alphabet.
//!
//! A byte-oriented forward range coder: 32-bit range, 33-bit `low` so a carry
//! can be pushed into bytes already queued for output. Models are integer
//! cumulative-frequency tables. The order-0 coder here is the range backend;
//! `context_model` keeps one model per context on top of the same coder.
//!
//! Payload: `[alphabet][range-coded symbols]`

use super::backend::BackendError;

/// Renormalise once the range drops below this.
const RANGE_FLOOR: u32 = 1 << 24;
const FREQ_INCREMENT: u32 = 24;
/// Totals stay below 2^16 so `range / total` keeps at least 8 bits of precision.
const RESCALE_THRESHOLD: u32 = 1 << 16;

pub(crate) struct RangeEncoder<'a> {
    low: u64,
    range: u32,
    /// Top byte held back until we know whether a carry reaches it.
    held: u8,
    /// Run of 0xFF bytes queued behind `held`.
    pending_ff: u32,
    out: &'a mut Vec<u8>,
}

impl<'a> RangeEncoder<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>) -> Self {
        Self { low: 0, range: u32::MAX, held: 0, pending_ff: 0, out }
    }

    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > u32::MAX as u64 {
            let carry = (self.low >> 32) as u8;
            self.out.push(self.held.wrapping_add(carry));
            for _ in 0..self.pending_ff {
                self.out.push(0xFFu8.wrapping_add(carry));
            }
            self.pending_ff = 0;
            self.held = (self.low >> 24) as u8;
        } else {
            self.pending_ff += 1;
        }
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    #[inline]
    pub(crate) fn encode(&mut self, model: &AdaptiveModel, sym: usize) {
        let (cum, freq) = model.interval(sym);
        let step = self.range / model.total;
        self.low += cum as u64 * step as u64;
        // the last symbol takes the rounding slack at the top of the range
        self.range = if cum + freq < model.total { step * freq } else { self.range - step * cum };
        while self.range < RANGE_FLOOR {
            self.range <<= 8;
            self.shift_low();
        }
    }

    pub(crate) fn finish(mut self) {
        for _ in 0..5 {
            self.shift_low();
        }
    }
}

pub(crate) struct RangeDecoder<'a> {
    range: u32,
    code: u32,
    input: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> RangeDecoder<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        let mut dec = Self { range: u32::MAX, code: 0, input, pos: 0, overrun: false };
        // leading byte is the encoder's initial held byte, always zero
        dec.next_byte();
        for _ in 0..4 {
            dec.code = (dec.code << 8) | dec.next_byte() as u32;
        }
        dec
    }

    fn next_byte(&mut self) -> u8 {
        match self.input.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                b
            }
            None => {
                self.overrun = true;
                0
            }
        }
    }

    #[inline]
    pub(crate) fn decode(&mut self, model: &AdaptiveModel) -> usize {
        let step = self.range / model.total;
        let target = (self.code / step).min(model.total - 1);
        let sym = model.symbol_at(target);
        let (cum, freq) = model.interval(sym);

        self.code = self.code.wrapping_sub(cum * step);
        self.range = if cum + freq < model.total { step * freq } else { self.range - step * cum };
        while self.range < RANGE_FLOOR {
            self.code = (self.code << 8) | self.next_byte() as u32;
            self.range <<= 8;
        }
        sym
    }

    /// Reading past the end of the payload means it was cut short.
    pub(crate) fn check_complete(&self) -> Result<(), BackendError> {
        if self.overrun {
            Err(BackendError::TruncatedInput)
        } else {
            Ok(())
        }
    }
}

/// Adaptive frequency table, one slot per alphabet symbol.
#[derive(Clone)]
pub(crate) struct AdaptiveModel {
    /// `cum[i]` = total frequency of symbols below `i`; `cum[n] == total`.
    cum: Vec<u32>,
    total: u32,
}

impl AdaptiveModel {
    /// Every symbol starts with frequency 1.
    pub(crate) fn new(n_symbols: usize) -> Self {
        Self { cum: (0..=n_symbols as u32).collect(), total: n_symbols as u32 }
    }

    fn n_symbols(&self) -> usize {
        self.cum.len() - 1
    }

    fn interval(&self, sym: usize) -> (u32, u32) {
        (self.cum[sym], self.cum[sym + 1] - self.cum[sym])
    }

    /// Symbol whose interval contains `target` (frequencies are never zero).
    fn symbol_at(&self, target: u32) -> usize {
        self.cum[1..self.n_symbols()].partition_point(|&c| c <= target)
    }

    pub(crate) fn update(&mut self, sym: usize) {
        for c in &mut self.cum[sym + 1..] {
            *c += FREQ_INCREMENT;
        }
        self.total += FREQ_INCREMENT;
        if self.total >= RESCALE_THRESHOLD {
            self.halve();
        }
    }

    fn halve(&mut self) {
        let mut acc = 0u32;
        let mut prev = 0u32;
        for c in &mut self.cum[1..] {
            let freq = *c - prev;
            prev = *c;
            acc += (freq >> 1).max(1);
            *c = acc;
        }
        self.total = acc;
    }
}

/// Distinct byte values of a block, in ascending order.
///
/// Format: [n_symbols - 1: 1B][symbols: nB]
pub(crate) struct Alphabet {
    pub(crate) symbols: Vec<u8>,
    index: [u8; 256],
}

impl Alphabet {
    pub(crate) fn scan(data: &[u8]) -> Self {
        let mut seen = [false; 256];
        for &b in data {
            seen[b as usize] = true;
        }
        let symbols: Vec<u8> = (0u8..=255).filter(|&b| seen[b as usize]).collect();
        Self::from_symbols(symbols)
    }

    fn from_symbols(symbols: Vec<u8>) -> Self {
        let mut index = [0u8; 256];
        for (i, &s) in symbols.iter().enumerate() {
            index[s as usize] = i as u8;
        }
        Self { symbols, index }
    }

    pub(crate) fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline(always)]
    pub(crate) fn index_of(&self, byte: u8) -> usize {
        self.index[byte as usize] as usize
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.push((self.symbols.len() - 1) as u8);
        out.extend_from_slice(&self.symbols);
    }

    /// Parse an alphabet; returns it with the number of bytes consumed.
    pub(crate) fn read(data: &[u8]) -> Result<(Self, usize), BackendError> {
        let n = *data.first().ok_or(BackendError::TruncatedInput)? as usize + 1;
        let symbols = data.get(1..1 + n).ok_or(BackendError::TruncatedInput)?.to_vec();
        if symbols.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BackendError::Data);
        }
        Ok((Self::from_symbols(symbols), 1 + n))
    }
}

pub(crate) fn encode_order0(src: &[u8], out: &mut Vec<u8>) -> Result<(), BackendError> {
    if src.is_empty() {
        return Err(BackendError::Param);
    }
    let alphabet = Alphabet::scan(src);
    alphabet.write(out);
    if alphabet.len() == 1 {
        // A single-symbol block is fully described by its alphabet
        return Ok(());
    }

    let mut model = AdaptiveModel::new(alphabet.len());
    let mut encoder = RangeEncoder::new(out);
    for &b in src {
        let sym = alphabet.index_of(b);
        encoder.encode(&model, sym);
        model.update(sym);
    }
    encoder.finish();
    Ok(())
}

pub(crate) fn decode_order0(src: &[u8], out: &mut Vec<u8>, original_len: usize) -> Result<(), BackendError> {
    let (alphabet, used) = Alphabet::read(src)?;
    if alphabet.len() == 1 {
        out.resize(out.len() + original_len, alphabet.symbols[0]);
        return Ok(());
    }

    out.reserve(original_len);
    let mut model = AdaptiveModel::new(alphabet.len());
    let mut decoder = RangeDecoder::new(&src[used..]);
    for _ in 0..original_len {
        let sym = decoder.decode(&model);
        out.push(alphabet.symbols[sym]);
        model.update(sym);
    }
    decoder.check_complete()
}
