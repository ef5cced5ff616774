//! BitSet - dense flags keyed by slot index
//!
//! Used for per-step visitation marks and for per-worker change sets that the
//! driving thread merges after a parallel phase.

/// Growable bitset
#[derive(Clone, Default)]
pub struct BitSet {
    bits: Vec<u64>,
    len: usize,
}

impl BitSet {
    const BITS_PER_WORD: usize = 64;

    /// Create a new bitset with room for n bits, all clear
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; Self::words_for(capacity)],
            len: capacity,
        }
    }

    #[inline]
    fn words_for(bits: usize) -> usize {
        (bits + Self::BITS_PER_WORD - 1) / Self::BITS_PER_WORD
    }

    /// Resize to `len` bits and clear everything
    pub fn reset(&mut self, len: usize) {
        let words = Self::words_for(len);
        self.bits.clear();
        self.bits.resize(words, 0);
        self.len = len;
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let word = index / Self::BITS_PER_WORD;
        let bit = index % Self::BITS_PER_WORD;
        self.bits[word] |= 1u64 << bit;
    }

    /// Set a bit, growing the set when the index is past the end
    pub fn set_grow(&mut self, index: usize) {
        if index >= self.len {
            self.len = index + 1;
            let words = Self::words_for(self.len);
            if words > self.bits.len() {
                self.bits.resize(words, 0);
            }
        }
        self.set(index);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let word = index / Self::BITS_PER_WORD;
        let bit = index % Self::BITS_PER_WORD;
        self.bits[word] &= !(1u64 << bit);
    }

    /// Get a bit; indices past the end read as clear
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let word = index / Self::BITS_PER_WORD;
        let bit = index % Self::BITS_PER_WORD;
        (self.bits[word] & (1u64 << bit)) != 0
    }

    pub fn clear_all(&mut self) {
        for word in &mut self.bits {
            *word = 0;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.bits.iter().any(|&w| w != 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `self |= other`, growing as needed
    pub fn union_with(&mut self, other: &BitSet) {
        if other.len > self.len {
            self.len = other.len;
        }
        if other.bits.len() > self.bits.len() {
            self.bits.resize(other.bits.len(), 0);
        }
        for (dst, src) in self.bits.iter_mut().zip(other.bits.iter()) {
            *dst |= *src;
        }
    }

    /// Iterate over set bit indices in ascending order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        let len = self.len;
        self.bits.iter().enumerate().flat_map(move |(word_idx, &word)| {
            let mut remaining = word;
            core::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * Self::BITS_PER_WORD + bit)
            })
        })
        .take_while(move |&index| index < len)
    }
}

impl core::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BitSet(len={}, ones={})", self.len, self.count_ones())
    }
}
