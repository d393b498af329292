//! Rolling Rabin fingerprint splitter.
//!
//! The fingerprint is a polynomial over GF(2) of the last [`WINDOW_SIZE`]
//! bytes, reduced modulo the irreducible [`POLYNOMIAL`]. Sliding one byte
//! out of the window and one byte in costs two table lookups.
//!
//! Boundaries depend only on the bytes since the previous boundary and on
//! the parameters, so independent writers of the same content agree on
//! every chunk.

use std::sync::OnceLock;

use sheaf_format::{FormatError, FormatResult};

use crate::splitter::ChunkSplitter;

/// Irreducible polynomial of degree 53.
pub const POLYNOMIAL: u64 = 0x3DA3_358B_4DC1_73;

/// Bytes covered by the rolling fingerprint.
pub const WINDOW_SIZE: usize = 48;

const fn degree(p: u64) -> i32 {
    63 - p.leading_zeros() as i32
}

const POLY_DEGREE: i32 = degree(POLYNOMIAL);
const POLY_SHIFT: i32 = POLY_DEGREE - 8;

/// Remainder of `x` divided by `p` over GF(2).
fn modulo(mut x: u64, p: u64) -> u64 {
    let dp = degree(p);
    while x != 0 && degree(x) >= dp {
        x ^= p << (degree(x) - dp);
    }
    x
}

fn append_byte(hash: u64, byte: u8, p: u64) -> u64 {
    modulo((hash << 8) | u64::from(byte), p)
}

struct Tables {
    /// Contribution of a byte leaving the window.
    out: [u64; 256],
    /// Reduction of the top byte shifted out of the digest.
    reduce: [u64; 256],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut out = [0u64; 256];
        let mut reduce = [0u64; 256];
        for b in 0..256u64 {
            let mut h = append_byte(0, b as u8, POLYNOMIAL);
            for _ in 0..WINDOW_SIZE - 1 {
                h = append_byte(h, 0, POLYNOMIAL);
            }
            out[b as usize] = h;
            reduce[b as usize] = modulo(b << POLY_DEGREE, POLYNOMIAL) | (b << POLY_DEGREE);
        }
        Tables { out, reduce }
    })
}

/// Content-defined splitter with `min`/`target`/`max` chunk lengths.
#[derive(Clone, Debug)]
pub struct RabinSplitter {
    min: u64,
    target: u64,
    max: u64,
    mask: u64,
    window: [u8; WINDOW_SIZE],
    pos: usize,
    digest: u64,
    count: u64,
    triggered: bool,
}

/// Mask `2^k - 1` with `2^k` the power of two nearest to `span`; ties go low.
fn mask_for(span: u64) -> u64 {
    let span = span.max(1);
    let k = 63 - span.leading_zeros();
    let low = 1u64 << k;
    let k = match low.checked_mul(2) {
        Some(high) if high - span < span - low => k + 1,
        _ => k,
    };
    (1u64 << k) - 1
}

impl RabinSplitter {
    pub fn new(target: u64, min: u64, max: u64) -> FormatResult<Self> {
        if min == 0 || min >= target || target > max {
            return Err(FormatError::InvalidChunking(format!(
                "rabin requires 0 < min < target <= max, got {min}/{target}/{max}"
            )));
        }
        Ok(Self {
            min,
            target,
            max,
            mask: mask_for(target - min),
            window: [0; WINDOW_SIZE],
            pos: 0,
            digest: 0,
            count: 0,
            triggered: false,
        })
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Current fingerprint of the window.
    pub fn fingerprint(&self) -> u64 {
        self.digest
    }

    fn slide(&mut self, byte: u8) {
        let t = tables();
        let leaving = self.window[self.pos];
        self.window[self.pos] = byte;
        self.pos = (self.pos + 1) % WINDOW_SIZE;
        self.digest ^= t.out[leaving as usize];

        let index = (self.digest >> POLY_SHIFT) as usize & 0xFF;
        self.digest = ((self.digest << 8) | u64::from(byte)) ^ t.reduce[index];
    }
}

impl ChunkSplitter for RabinSplitter {
    fn reset(&mut self) {
        self.window = [0; WINDOW_SIZE];
        self.pos = 0;
        self.digest = 0;
        self.count = 0;
        self.triggered = false;
    }

    fn update(&mut self, byte: u8) {
        self.slide(byte);
        self.count = self.count.saturating_add(1);
        if self.triggered {
            return;
        }
        if self.count >= self.max || (self.count >= self.min && self.digest & self.mask == 0) {
            self.triggered = true;
        }
    }

    fn is_triggered(&self) -> bool {
        self.triggered
    }

    fn clone_fresh(&self) -> Box<dyn ChunkSplitter> {
        let mut fresh = self.clone();
        fresh.reset();
        Box::new(fresh)
    }
}
