//! The compressed array: encoder, O(1) random-access decoder, statistics
//! and a stable binary serialization.
//!
//! # Layout
//!
//! The input is cut into segments of 1024 elements. Each segment is
//! described by two words:
//! - `spans_bitmap`: bit j set iff a span starts at element 16·j (bit 0 is
//!   always set),
//! - `rank`: the number of spans in all preceding segments, i.e. the index
//!   of this segment's first span in the packed per-span arrays.
//!
//! Per span, three `f64` coefficients live in `polynomials`, and one config
//! word in `configs` packs the residual width (low 8 bits) with a signed
//! bit offset (high 56 bits, arithmetic shift). Residuals for element with
//! segment-local index ℓ sit at bit `offset + ℓ·width` of the shared
//! `residuals` buffer; the offset is normalized at encode time so the
//! formula needs no per-span base subtraction, which is why it may be
//! negative.
//!
//! A `get` touches one bitmap word, one rank word, one config word, three
//! coefficients and at most two residual words: constant time, zero
//! allocation.

use std::collections::BTreeMap;
use std::fmt;

use crate::bits::{read_bits, BitWriter};
use crate::error::{Error, Result};
use crate::planner::{
    eval_round, plan_segment, width_for, PlannedSpan, BLOCK_LEN, SEG_LEN, WIDTHS,
};

/// Bits of the config word holding the residual width code.
const CONFIG_WIDTH_BITS: u32 = 8;

#[inline]
fn pack_config(offset: i64, width: u32) -> i64 {
    (offset << CONFIG_WIDTH_BITS) | i64::from(width)
}

#[inline]
fn unpack_config(config: i64) -> (i64, u32) {
    (config >> CONFIG_WIDTH_BITS, (config & 0xFF) as u32)
}

/// A compressed, immutable array of `u32` values with O(1) random access.
///
/// Values are modeled per span as a degree-≤2 polynomial plus a small
/// non-negative residual per element; for sorted or trend-following input
/// this lands around 5–16 bits per element. Construction is the only
/// mutation; a built instance is freely shareable across threads.
#[derive(Clone)]
pub struct PolyArray {
    n: usize,
    /// Per segment: spans in all preceding segments.
    rank: Vec<u64>,
    /// Per segment: span-start bits, one per 16-element block.
    bitmap: Vec<u64>,
    /// Per span: `[a, b, c]` of `y = a + b·x + c·x²`, span-local x.
    polynomials: Vec<f64>,
    /// Per span: packed `(offset, width)`.
    configs: Vec<i64>,
    /// Bit-packed residuals for every element.
    residuals: Vec<u64>,
}

impl fmt::Debug for PolyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyArray")
            .field("n", &self.n)
            .field("segments", &self.bitmap.len())
            .field("spans", &self.configs.len())
            .finish()
    }
}

impl PolyArray {
    /// Build a compressed array from a slice of values.
    ///
    /// Compression quality depends on the input following a rough trend;
    /// recovery is exact for any input, including adversarial ones (which
    /// degrade to 32 bits per element plus overhead).
    pub fn new(values: &[u32]) -> Self {
        let nseg = values.len().div_ceil(SEG_LEN);
        let mut rank = Vec::with_capacity(nseg);
        let mut bitmap = Vec::with_capacity(nseg);
        let mut polynomials = Vec::new();
        let mut configs = Vec::new();
        let mut writer = BitWriter::new();

        let mut spans_total = 0u64;
        for seg in values.chunks(SEG_LEN) {
            rank.push(spans_total);
            let plans = plan_segment(seg);
            let mut bm = 0u64;
            for plan in &plans {
                bm |= 1u64 << plan.first_block;
                encode_span(seg, plan, &mut polynomials, &mut configs, &mut writer);
            }
            bitmap.push(bm);
            spans_total += plans.len() as u64;
        }

        Self {
            n: values.len(),
            rank,
            bitmap,
            polynomials,
            configs,
            residuals: writer.finish(),
        }
    }

    /// Return the number of elements.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Return true if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of 1024-element segments.
    pub fn num_segments(&self) -> usize {
        self.bitmap.len()
    }

    /// Total number of spans across all segments.
    pub fn num_spans(&self) -> usize {
        self.configs.len()
    }

    /// Return the value at index `i`.
    ///
    /// Constant time and allocation-free: one rank lookup, one popcount,
    /// one polynomial evaluation and one bit extraction.
    pub fn get(&self, i: usize) -> Result<u32> {
        if i >= self.n {
            return Err(Error::IndexOutOfBounds(i));
        }
        let seg = i / SEG_LEN;
        let local = i % SEG_LEN;
        let block = local / BLOCK_LEN;

        // Bits 0..=block; bit 0 is always set, so `before` is non-zero.
        let before = self.bitmap[seg] & (!0u64 >> (63 - block));
        let span = self.rank[seg] as usize + before.count_ones() as usize - 1;

        let (offset, width) = unpack_config(self.configs[span]);
        let poly = [
            self.polynomials[span * 3],
            self.polynomials[span * 3 + 1],
            self.polynomials[span * 3 + 2],
        ];

        let first_block = 63 - before.leading_zeros() as usize;
        let x = (local - first_block * BLOCK_LEN) as f64;
        let y = eval_round(&poly, x);

        let r = if width == 0 {
            0
        } else {
            let pos = offset + local as i64 * i64::from(width);
            read_bits(&self.residuals, pos as u64, width) as i64
        };
        Ok((y + r) as u32)
    }

    /// Per-field memory footprint and density metrics.
    ///
    /// Keys: `mem_total`, `mem_bitmap` (segment descriptors: bitmap + rank),
    /// `mem_polynomials`, `mem_configs`, `mem_residuals` (bytes), `n`,
    /// `elt_width` (largest residual width in use) and `bits/elt`
    /// (`8·mem_total/n`, 0 for an empty array).
    pub fn stat(&self) -> BTreeMap<&'static str, u64> {
        let mem_bitmap = 8 * (self.bitmap.len() + self.rank.len()) as u64;
        let mem_polynomials = 8 * self.polynomials.len() as u64;
        let mem_configs = 8 * self.configs.len() as u64;
        let mem_residuals = 8 * self.residuals.len() as u64;
        let mem_total = mem_bitmap + mem_polynomials + mem_configs + mem_residuals;

        let elt_width = self
            .configs
            .iter()
            .map(|&c| unpack_config(c).1)
            .max()
            .unwrap_or(0);

        let mut stat = BTreeMap::new();
        stat.insert("mem_total", mem_total);
        stat.insert("mem_bitmap", mem_bitmap);
        stat.insert("mem_polynomials", mem_polynomials);
        stat.insert("mem_configs", mem_configs);
        stat.insert("mem_residuals", mem_residuals);
        stat.insert("n", self.n as u64);
        stat.insert("elt_width", u64::from(elt_width));
        stat.insert(
            "bits/elt",
            if self.n == 0 {
                0
            } else {
                mem_total * 8 / self.n as u64
            },
        );
        stat
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.rank.capacity() * 8
            + self.bitmap.capacity() * 8
            + self.polynomials.capacity() * 8
            + self.configs.capacity() * 8
            + self.residuals.capacity() * 8
    }

    /// Serialize to a stable binary encoding (little-endian).
    ///
    /// Format (versioned):
    /// - magic: 8 bytes (`PLYARR01`)
    /// - n: u64
    /// - num_segments: u64
    /// - num_spans: u64
    /// - num_residual_words: u64
    /// - rank: `num_segments` u64
    /// - bitmap: `num_segments` u64
    /// - polynomials: `3 · num_spans` f64 (bit patterns)
    /// - configs: `num_spans` i64
    /// - residuals: `num_residual_words` u64
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PLYARR01");
        out.extend_from_slice(&(self.n as u64).to_le_bytes());
        out.extend_from_slice(&(self.bitmap.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.configs.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.residuals.len() as u64).to_le_bytes());

        for &r in &self.rank {
            out.extend_from_slice(&r.to_le_bytes());
        }
        for &b in &self.bitmap {
            out.extend_from_slice(&b.to_le_bytes());
        }
        for &p in &self.polynomials {
            out.extend_from_slice(&p.to_bits().to_le_bytes());
        }
        for &c in &self.configs {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for &w in &self.residuals {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Deserialize from `to_bytes()` output.
    ///
    /// The structure is fully validated: segment count against `n`, rank
    /// prefix sums against bitmap popcounts, residual width legality and
    /// every span's residual bit range against the buffer. A successfully
    /// decoded instance can never make `get` panic, however corrupted the
    /// source bytes were.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        const MAGIC: &[u8; 8] = b"PLYARR01";
        let mut off = 0usize;

        let mut take = |n: usize| -> Result<&[u8]> {
            if off + n > bytes.len() {
                return Err(Error::InvalidEncoding(
                    "unexpected end of input".to_string(),
                ));
            }
            let slice = &bytes[off..off + n];
            off += n;
            Ok(slice)
        };

        let magic = take(8)?;
        if magic != MAGIC {
            return Err(Error::InvalidEncoding("bad magic for PolyArray".to_string()));
        }

        let n = u64::from_le_bytes(take(8)?.try_into().unwrap()) as usize;
        let nseg = u64::from_le_bytes(take(8)?.try_into().unwrap()) as usize;
        let nspan = u64::from_le_bytes(take(8)?.try_into().unwrap()) as usize;
        let nwords = u64::from_le_bytes(take(8)?.try_into().unwrap()) as usize;

        if nseg != n.div_ceil(SEG_LEN) {
            return Err(Error::InvalidEncoding(format!(
                "segment count {nseg} does not match n ({n})"
            )));
        }
        // Bound allocations against total input to prevent allocation bombs.
        let declared = nseg
            .saturating_mul(16)
            .saturating_add(nspan.saturating_mul(32))
            .saturating_add(nwords.saturating_mul(8));
        if declared > bytes.len() {
            return Err(Error::InvalidEncoding(format!(
                "declared sizes too large for input ({} bytes)",
                bytes.len()
            )));
        }

        let mut rank = Vec::with_capacity(nseg);
        for _ in 0..nseg {
            rank.push(u64::from_le_bytes(take(8)?.try_into().unwrap()));
        }
        let mut bitmap = Vec::with_capacity(nseg);
        for _ in 0..nseg {
            bitmap.push(u64::from_le_bytes(take(8)?.try_into().unwrap()));
        }
        let mut polynomials = Vec::with_capacity(nspan * 3);
        for _ in 0..nspan * 3 {
            polynomials.push(f64::from_bits(u64::from_le_bytes(
                take(8)?.try_into().unwrap(),
            )));
        }
        let mut configs = Vec::with_capacity(nspan);
        for _ in 0..nspan {
            configs.push(i64::from_le_bytes(take(8)?.try_into().unwrap()));
        }
        let mut residuals = Vec::with_capacity(nwords);
        for _ in 0..nwords {
            residuals.push(u64::from_le_bytes(take(8)?.try_into().unwrap()));
        }

        if off != bytes.len() {
            return Err(Error::InvalidEncoding(
                "trailing bytes after PolyArray".to_string(),
            ));
        }

        let arr = Self {
            n,
            rank,
            bitmap,
            polynomials,
            configs,
            residuals,
        };
        arr.validate()?;
        Ok(arr)
    }

    /// Structural validation of untrusted contents; see `from_bytes`.
    fn validate(&self) -> Result<()> {
        let total_bits = self.residuals.len() as i64 * 64;
        let mut span = 0usize;

        for (k, &bm) in self.bitmap.iter().enumerate() {
            let seg_len = (self.n - k * SEG_LEN).min(SEG_LEN);
            let nblocks = seg_len.div_ceil(BLOCK_LEN);

            if self.rank[k] != span as u64 {
                return Err(Error::InvalidEncoding(format!(
                    "rank mismatch at segment {k}"
                )));
            }
            if bm & 1 == 0 {
                return Err(Error::InvalidEncoding(format!(
                    "segment {k} bitmap misses its first span"
                )));
            }
            let legal = if nblocks == 64 { !0u64 } else { (1u64 << nblocks) - 1 };
            if bm & !legal != 0 {
                return Err(Error::InvalidEncoding(format!(
                    "segment {k} bitmap has span bits past its end"
                )));
            }

            // Walk this segment's spans in order.
            let mut starts = bm;
            while starts != 0 {
                let first_block = starts.trailing_zeros() as u64;
                starts &= starts - 1;
                let next_block = if starts == 0 {
                    nblocks as u64
                } else {
                    starts.trailing_zeros() as u64
                };

                if span >= self.configs.len() {
                    return Err(Error::InvalidEncoding("span count underrun".to_string()));
                }
                let (offset, width) = unpack_config(self.configs[span]);
                if !WIDTHS.contains(&width) {
                    return Err(Error::InvalidEncoding(format!(
                        "illegal residual width {width} in span {span}"
                    )));
                }
                if width > 0 {
                    let first_local = first_block as i64 * BLOCK_LEN as i64;
                    let last_local = (next_block as i64 * BLOCK_LEN as i64).min(seg_len as i64) - 1;
                    let lo = offset + first_local * i64::from(width);
                    let hi = offset + last_local * i64::from(width) + i64::from(width);
                    if lo < 0 || hi > total_bits {
                        return Err(Error::InvalidEncoding(format!(
                            "span {span} residual bits [{lo}, {hi}) outside buffer"
                        )));
                    }
                }
                span += 1;
            }
        }

        if span != self.configs.len() {
            return Err(Error::InvalidEncoding(format!(
                "span count {} does not match bitmap population {span}",
                self.configs.len()
            )));
        }
        if self.polynomials.len() != self.configs.len() * 3 {
            return Err(Error::InvalidEncoding(
                "polynomial count does not match span count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Finalize and emit one planned span: translate the fit to span-local
/// coordinates, shift residuals non-negative, pick a width and pack.
fn encode_span(
    seg: &[u32],
    plan: &PlannedSpan,
    polynomials: &mut Vec<f64>,
    configs: &mut Vec<i64>,
    writer: &mut BitWriter,
) {
    let start = plan.first_block * BLOCK_LEN;
    let len = (plan.block_count * BLOCK_LEN).min(seg.len() - start);

    // Translate y = a + bx + cx² from segment-local to span-local x.
    let s = start as f64;
    let [a, b, c] = plan.poly;
    let mut poly = [a + b * s + c * s * s, b + 2.0 * c * s, c];

    if !poly.iter().all(|v| v.is_finite()) {
        // Degenerate fit (near-singular system): fall back to the mean and
        // let the residual width absorb the loss.
        let sum: f64 = seg[start..start + len].iter().map(|&v| f64::from(v)).sum();
        poly = [sum / len as f64, 0.0, 0.0];
    }

    // Shift the constant term until the smallest residual is exactly zero.
    // Residuals are re-derived from the shifted polynomial each round since
    // float rounding can move a value across a floor boundary.
    let (mut min, mut max) = span_residual_range(seg, start, len, &poly);
    for _ in 0..8 {
        if min == 0 {
            break;
        }
        let prev = poly[0];
        poly[0] += min as f64;
        if poly[0] == prev {
            break;
        }
        let (lo, hi) = span_residual_range(seg, start, len, &poly);
        min = lo;
        max = hi;
    }

    let width = if min >= 0 {
        width_for(i128::from(max))
    } else {
        None
    };
    let width = match width {
        Some(w) => w,
        None => {
            // Residuals exceed 32 bits: store raw values against a zero
            // polynomial.
            poly = [0.0, 0.0, 0.0];
            32
        }
    };

    let offset = writer.bit_len() as i64 - start as i64 * i64::from(width);
    configs.push(pack_config(offset, width));
    polynomials.extend_from_slice(&poly);

    if width > 0 {
        for (i, &v) in seg[start..start + len].iter().enumerate() {
            let r = i64::from(v) - eval_round(&poly, i as f64);
            debug_assert!(r >= 0, "negative residual after shift");
            writer.write(r as u64, width);
        }
    }
}

/// Min and max residual over one span, span-local x.
fn span_residual_range(seg: &[u32], start: usize, len: usize, poly: &[f64; 3]) -> (i64, i64) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for (i, &v) in seg[start..start + len].iter().enumerate() {
        let r = i64::from(v) - eval_round(poly, i as f64);
        min = min.min(r);
        max = max.max(r);
    }
    (min, max)
}
