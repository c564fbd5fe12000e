//! Bit predictor for the context-mixing coder.
//!
//! Predicts the probability that the next bit is 1, as a 12-bit value, from
//! the bits already seen in the current byte and the last four whole bytes.
//!
//! # Model
//!
//! Each partial-byte context `c0` (the bits of the current byte behind a
//! leading 1) owns a nonstationary bit-history state. A [`StateMap`] turns the
//! state into a probability, which is then refined by four chained adaptive
//! probability maps (APMs), each keyed by a different context:
//!
//! ```text
//! state -> StateMap -> apm2(c0, last-byte bit) -> apm3(run length class)
//!       -> avg(apm5(c0 ^ hash(c4)), .) -> avg(apm4(c0), .) -> p
//! ```
//!
//! APMs interpolate between 33 buckets in the stretched (logistic) domain, so
//! [`squash`] and [`stretch`] move probabilities in and out of it.
//!
//! # Historical Context
//!
//! The state machine and the APM chain come from Matt Mahoney's PAQ family
//! (2002 onward), by way of the lpaq and dcs-bwt coders, where a single
//! order-0 bit history plus a few APM stages proved a strong fit for the
//! output of a Burrows-Wheeler transform.

use std::sync::OnceLock;

/// Bit-history state transitions.
///
/// `STATE_TABLE[s] = [next if 0, next if 1, zeros seen, ones seen]`. State 0
/// is the empty history; states 1-30 enumerate all histories of up to 4 bits;
/// the rest approximate `(n0, n1)` counts, discarding part of the opposite
/// count when a bit is observed.
#[rustfmt::skip]
const STATE_TABLE: [[u8; 4]; 256] = [
    [  1,   2,  0,  0], [  3,   5,  1,  0], [  4,   6,  0,  1], [  7,  10,  2,  0],
    [  8,  12,  1,  1], [  9,  13,  1,  1], [ 11,  14,  0,  2], [ 15,  19,  3,  0],
    [ 16,  23,  2,  1], [ 17,  24,  2,  1], [ 18,  25,  2,  1], [ 20,  27,  1,  2],
    [ 21,  28,  1,  2], [ 22,  29,  1,  2], [ 26,  30,  0,  3], [ 31,  33,  4,  0],
    [ 32,  35,  3,  1], [ 32,  35,  3,  1], [ 32,  35,  3,  1], [ 32,  35,  3,  1],
    [ 34,  37,  2,  2], [ 34,  37,  2,  2], [ 34,  37,  2,  2], [ 34,  37,  2,  2],
    [ 34,  37,  2,  2], [ 34,  37,  2,  2], [ 36,  39,  1,  3], [ 36,  39,  1,  3],
    [ 36,  39,  1,  3], [ 36,  39,  1,  3], [ 38,  40,  0,  4], [ 41,  43,  5,  0],
    [ 42,  45,  4,  1], [ 42,  45,  4,  1], [ 44,  47,  3,  2], [ 44,  47,  3,  2],
    [ 46,  49,  2,  3], [ 46,  49,  2,  3], [ 48,  51,  1,  4], [ 48,  51,  1,  4],
    [ 50,  52,  0,  5], [ 53,  43,  6,  0], [ 54,  57,  5,  1], [ 54,  57,  5,  1],
    [ 56,  59,  4,  2], [ 56,  59,  4,  2], [ 58,  61,  3,  3], [ 58,  61,  3,  3],
    [ 60,  63,  2,  4], [ 60,  63,  2,  4], [ 62,  65,  1,  5], [ 62,  65,  1,  5],
    [ 50,  66,  0,  6], [ 67,  55,  7,  0], [ 68,  57,  6,  1], [ 68,  57,  6,  1],
    [ 70,  73,  5,  2], [ 70,  73,  5,  2], [ 72,  75,  4,  3], [ 72,  75,  4,  3],
    [ 74,  77,  3,  4], [ 74,  77,  3,  4], [ 76,  79,  2,  5], [ 76,  79,  2,  5],
    [ 62,  81,  1,  6], [ 62,  81,  1,  6], [ 64,  82,  0,  7], [ 83,  69,  8,  0],
    [ 84,  71,  7,  1], [ 84,  71,  7,  1], [ 86,  73,  6,  2], [ 86,  73,  6,  2],
    [ 44,  59,  5,  3], [ 44,  59,  5,  3], [ 58,  61,  4,  4], [ 58,  61,  4,  4],
    [ 60,  49,  3,  5], [ 60,  49,  3,  5], [ 76,  89,  2,  6], [ 76,  89,  2,  6],
    [ 78,  91,  1,  7], [ 78,  91,  1,  7], [ 80,  92,  0,  8], [ 93,  69,  9,  0],
    [ 94,  87,  8,  1], [ 94,  87,  8,  1], [ 96,  45,  7,  2], [ 96,  45,  7,  2],
    [ 48,  99,  2,  7], [ 48,  99,  2,  7], [ 88, 101,  1,  8], [ 88, 101,  1,  8],
    [ 80, 102,  0,  9], [103,  69, 10,  0], [104,  87,  9,  1], [104,  87,  9,  1],
    [106,  57,  8,  2], [106,  57,  8,  2], [ 62, 109,  2,  8], [ 62, 109,  2,  8],
    [ 88, 111,  1,  9], [ 88, 111,  1,  9], [ 80, 112,  0, 10], [113,  85, 11,  0],
    [114,  87, 10,  1], [114,  87, 10,  1], [116,  57,  9,  2], [116,  57,  9,  2],
    [ 62, 119,  2,  9], [ 62, 119,  2,  9], [ 88, 121,  1, 10], [ 88, 121,  1, 10],
    [ 90, 122,  0, 11], [123,  85, 12,  0], [124,  97, 11,  1], [124,  97, 11,  1],
    [126,  57, 10,  2], [126,  57, 10,  2], [ 62, 129,  2, 10], [ 62, 129,  2, 10],
    [ 98, 131,  1, 11], [ 98, 131,  1, 11], [ 90, 132,  0, 12], [133,  85, 13,  0],
    [134,  97, 12,  1], [134,  97, 12,  1], [136,  57, 11,  2], [136,  57, 11,  2],
    [ 62, 139,  2, 11], [ 62, 139,  2, 11], [ 98, 141,  1, 12], [ 98, 141,  1, 12],
    [ 90, 142,  0, 13], [143,  95, 14,  0], [144,  97, 13,  1], [144,  97, 13,  1],
    [ 68,  57, 12,  2], [ 68,  57, 12,  2], [ 62,  81,  2, 12], [ 62,  81,  2, 12],
    [ 98, 147,  1, 13], [ 98, 147,  1, 13], [100, 148,  0, 14], [149,  95, 15,  0],
    [150, 107, 14,  1], [150, 107, 14,  1], [108, 151,  1, 14], [108, 151,  1, 14],
    [100, 152,  0, 15], [153,  95, 16,  0], [154, 107, 15,  1], [108, 155,  1, 15],
    [100, 156,  0, 16], [157,  95, 17,  0], [158, 107, 16,  1], [108, 159,  1, 16],
    [100, 160,  0, 17], [161, 105, 18,  0], [162, 107, 17,  1], [108, 163,  1, 17],
    [110, 164,  0, 18], [165, 105, 19,  0], [166, 117, 18,  1], [118, 167,  1, 18],
    [110, 168,  0, 19], [169, 105, 20,  0], [170, 117, 19,  1], [118, 171,  1, 19],
    [110, 172,  0, 20], [173, 105, 21,  0], [174, 117, 20,  1], [118, 175,  1, 20],
    [110, 176,  0, 21], [177, 105, 22,  0], [178, 117, 21,  1], [118, 179,  1, 21],
    [110, 180,  0, 22], [181, 115, 23,  0], [182, 117, 22,  1], [118, 183,  1, 22],
    [120, 184,  0, 23], [185, 115, 24,  0], [186, 127, 23,  1], [128, 187,  1, 23],
    [120, 188,  0, 24], [189, 115, 25,  0], [190, 127, 24,  1], [128, 191,  1, 24],
    [120, 192,  0, 25], [193, 115, 26,  0], [194, 127, 25,  1], [128, 195,  1, 25],
    [120, 196,  0, 26], [197, 115, 27,  0], [198, 127, 26,  1], [128, 199,  1, 26],
    [120, 200,  0, 27], [201, 115, 28,  0], [202, 127, 27,  1], [128, 203,  1, 27],
    [120, 204,  0, 28], [205, 115, 29,  0], [206, 127, 28,  1], [128, 207,  1, 28],
    [120, 208,  0, 29], [209, 125, 30,  0], [210, 127, 29,  1], [128, 211,  1, 29],
    [130, 212,  0, 30], [213, 125, 31,  0], [214, 137, 30,  1], [138, 215,  1, 30],
    [130, 216,  0, 31], [217, 125, 32,  0], [218, 137, 31,  1], [138, 219,  1, 31],
    [130, 220,  0, 32], [221, 125, 33,  0], [222, 137, 32,  1], [138, 223,  1, 32],
    [130, 224,  0, 33], [225, 125, 34,  0], [226, 137, 33,  1], [138, 227,  1, 33],
    [130, 228,  0, 34], [229, 125, 35,  0], [230, 137, 34,  1], [138, 231,  1, 34],
    [130, 232,  0, 35], [233, 125, 36,  0], [234, 137, 35,  1], [138, 235,  1, 35],
    [130, 236,  0, 36], [237, 125, 37,  0], [238, 137, 36,  1], [138, 239,  1, 36],
    [130, 240,  0, 37], [241, 125, 38,  0], [242, 137, 37,  1], [138, 243,  1, 37],
    [130, 244,  0, 38], [245, 135, 39,  0], [246, 137, 38,  1], [138, 247,  1, 38],
    [140, 248,  0, 39], [249, 135, 40,  0], [250,  69, 39,  1], [ 80, 251,  1, 39],
    [140, 252,  0, 40], [249, 135, 41,  0], [250,  69, 40,  1], [ 80, 251,  1, 40],
    [140, 252,  0, 41], [  0,   0,  0,  0], [  0,   0,  0,  0], [  0,   0,  0,  0],
];

/// `squash` at the 33 knots -2048, -1920, ..., 2048.
const INV_EXP: [i32; 33] = [
    1, 2, 3, 6, 10, 16, 27, 45, 73, 120, 194, 310, 488, 747, 1101, 1546, 2047, 2549, 2994, 3348,
    3607, 3785, 3901, 3975, 4022, 4050, 4068, 4079, 4085, 4089, 4092, 4093, 4094,
];

const APM_KNOTS: usize = 33;

/// Logistic function `4096 / (1 + e^(-d / 256))`.
///
/// `d` is a stretched probability in `-2047..=2047` (clamped outside it);
/// the result is a 12-bit probability in `0..=4095`.
pub fn squash(d: i32) -> i32 {
    if d > 2047 {
        return 4095;
    }
    if d < -2047 {
        return 0;
    }
    let w = d & 127;
    let i = ((d >> 7) + 16) as usize;
    (INV_EXP[i] * (128 - w) + INV_EXP[i + 1] * w + 64) >> 7
}

fn stretch_table() -> &'static [i16] {
    static STRETCH: OnceLock<Vec<i16>> = OnceLock::new();
    STRETCH.get_or_init(|| {
        let mut table = vec![0i16; 4096];
        let mut pi = 0usize;
        for x in -2047..=2047 {
            let i = squash(x) as usize;
            for slot in table.iter_mut().take(i + 1).skip(pi) {
                *slot = x as i16;
            }
            pi = i + 1;
        }
        table[4095] = 2047;
        table
    })
}

/// Inverse of [`squash`]: `ln(p / (1 - p))` scaled to `-2047..=2047`.
///
/// `p` is clamped to `0..=4095`.
pub fn stretch(p: i32) -> i32 {
    i32::from(stretch_table()[p.clamp(0, 4095) as usize])
}

/// Maps a bit-history state to a probability, trained on each observed bit.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StateMap {
    ctx: usize,
    data: Vec<i32>,
}

impl StateMap {
    fn new() -> Self {
        let data = STATE_TABLE
            .iter()
            .map(|row| {
                let (mut n0, mut n1) = (i32::from(row[2]), i32::from(row[3]));
                if n0 == 0 {
                    n1 <<= 7;
                }
                if n1 == 0 {
                    n0 <<= 7;
                }
                ((n1 + 1) << 16) / (n0 + n1 + 2)
            })
            .collect();
        Self { ctx: 0, data }
    }

    /// Train the previous state on `y`, then predict for state `cx`.
    fn get(&mut self, y: i32, cx: usize) -> i32 {
        let d = &mut self.data[self.ctx];
        *d += ((y << 16) - *d + 128) >> 8;
        self.ctx = cx;
        self.data[cx] >> 4
    }
}

/// Adaptive probability map: refines a probability within a context.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AdaptiveProbMap {
    index: usize,
    data: Vec<i32>,
}

impl AdaptiveProbMap {
    /// Map with `contexts` rows, each starting as the identity mapping.
    fn new(contexts: usize) -> Self {
        let row: Vec<i32> = (0..APM_KNOTS as i32)
            .map(|j| squash((j - 16) << 7) << 4)
            .collect();
        let data = row.iter().copied().cycle().take(contexts * APM_KNOTS).collect();
        Self { index: 0, data }
    }

    /// Train the two knots used last time on `y`, then refine `pr` in `ctx`.
    /// Smaller `rate` adapts faster.
    fn get(&mut self, y: i32, pr: i32, ctx: usize, rate: u32) -> i32 {
        let g = (y << 16) + (y << rate) - (y << 1);
        self.data[self.index] += (g - self.data[self.index]) >> rate;
        self.data[self.index + 1] += (g - self.data[self.index + 1]) >> rate;

        let s = stretch(pr);
        let w = s & 127;
        self.index = ((s + 2048) >> 7) as usize + ctx * APM_KNOTS;
        (self.data[self.index] * (128 - w) + self.data[self.index + 1] * w) >> 11
    }
}

/// PAQ-style bit predictor.
///
/// Encoder and decoder each own one and must feed it the same bits in the
/// same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predictor {
    /// Next prediction, 12 bits.
    pr: i32,
    /// Bits of the current byte behind a leading 1 (1..=255).
    c0: i32,
    /// Last four whole bytes, most recent in the low byte.
    c4: u32,
    /// Bits seen in the current byte (0..=7).
    bpos: u32,
    states: [u8; 256],
    ctx_ptr: usize,
    /// Consecutive repeats of the last byte, saturating at 0xFFFF.
    run: u32,
    /// Run length class: 0, 1, 2-3, 4+.
    run_ctx: usize,
    sm: StateMap,
    apm2: AdaptiveProbMap,
    apm3: AdaptiveProbMap,
    apm4: AdaptiveProbMap,
    apm5: AdaptiveProbMap,
}

impl Predictor {
    /// Fresh predictor: no history, `get()` is 2048.
    pub fn new() -> Self {
        Self {
            pr: 2048,
            c0: 1,
            c4: 0,
            bpos: 0,
            states: [0; 256],
            ctx_ptr: 0,
            run: 0,
            run_ctx: 0,
            sm: StateMap::new(),
            apm2: AdaptiveProbMap::new(1024),
            apm3: AdaptiveProbMap::new(4),
            apm4: AdaptiveProbMap::new(256),
            apm5: AdaptiveProbMap::new(2048),
        }
    }

    /// Probability that the next bit is 1, in `1..=4095`.
    #[inline]
    pub fn get(&self) -> u32 {
        let pr = self.pr.clamp(0, 4095) as u32;
        if pr >= 2048 {
            pr
        } else {
            pr + 1
        }
    }

    /// Learn from the bit `bit` (0 or 1) and prepare the next prediction.
    pub fn update(&mut self, bit: u32) {
        let y = (bit & 1) as i32;

        let state = &mut self.states[self.ctx_ptr];
        *state = STATE_TABLE[*state as usize][y as usize];

        self.c0 += self.c0 + y;
        self.bpos += 1;
        if self.bpos == 8 {
            self.bpos = 0;
            self.c4 = (self.c4 << 8) | (self.c0 - 256) as u32;
            self.c0 = 1;

            if (self.c4 ^ (self.c4 >> 8)) & 255 == 0 {
                if self.run < 0xFFFF {
                    self.run += 1;
                }
                if matches!(self.run, 1 | 2 | 4) {
                    self.run_ctx += 1;
                }
            } else {
                self.run = 0;
                self.run_ctx = 0;
            }
        }

        // Does the current partial byte repeat the high bits of the last one?
        let c1c = (((self.c4 & 255) + 256) >> (8 - self.bpos)) as i32;
        let mut c1d = ((self.c4 >> (7 - self.bpos)) & 1) as i32;
        if c1c == self.c0 {
            c1d += 2;
        }

        self.ctx_ptr = self.c0 as usize;
        let mut pred = self.sm.get(y, self.states[self.ctx_ptr] as usize);
        pred = self.apm2.get(y, pred, (self.c0 | (c1d << 8)) as usize, 7);
        pred = self.apm3.get(y, pred, self.run_ctx, 8);
        let hashed = self.c0 as u32 ^ (self.c4.wrapping_mul(123_456_791) >> 21);
        pred = (self.apm5.get(y, pred, hashed as usize, 7) + pred + 1) >> 1;
        self.pr = (self.apm4.get(y, pred, self.c0 as usize, 7) + pred + 1) >> 1;
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}
