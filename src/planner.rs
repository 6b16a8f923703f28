//! Greedy span partitioning of a segment.
//!
//! A segment (up to [`SEG_LEN`] values) is cut into spans of whole
//! 16-element blocks. Each span pays a fixed overhead (three f64
//! coefficients plus one config word = 256 bits) and a per-element residual
//! width, so the planner trades span length against residual growth:
//! long spans amortize the overhead but inherit the width of their
//! worst-fitting block.
//!
//! The policy is grow-until-hurt: keep extending the current span one block
//! at a time while the *per-element* bit cost does not increase, close it
//! otherwise. Ties go to the longer span. This is a close approximation of
//! the dynamic-programming optimum at a fraction of the work: per-block
//! fitters are precomputed once, so each candidate extension costs one
//! matrix merge plus one residual scan.

use crate::fitter::PolyFitter;

/// Number of elements per segment.
pub(crate) const SEG_LEN: usize = 1024;

/// Number of elements per block; spans are whole multiples of this.
pub(crate) const BLOCK_LEN: usize = 16;

/// Fixed per-span cost in bits: 3 × 64-bit coefficients + one config word.
pub(crate) const SPAN_OVERHEAD_BITS: u64 = 4 * 64;

/// Legal residual widths, smallest first.
pub(crate) const WIDTHS: [u32; 7] = [0, 1, 2, 4, 8, 16, 32];

/// One planned span: a block range within the segment plus the fitted
/// polynomial in segment-local coordinates (not yet shifted or translated;
/// the encoder finalizes both).
#[derive(Debug, Clone)]
pub(crate) struct PlannedSpan {
    pub first_block: usize,
    pub block_count: usize,
    pub poly: [f64; 3],
}

/// Evaluate a polynomial at `x` and round to the nearest integer.
///
/// This is the single evaluation routine shared by the planner, the encoder
/// and the decoder: Horner order `((c·x + b)·x + a)` and `floor(v + 0.5)`
/// rounding. Encode-time residual widths are only valid if decode evaluates
/// the polynomial identically, so every call site must go through here.
/// Non-finite values saturate through the `as` cast (NaN becomes 0).
#[inline]
pub(crate) fn eval_round(poly: &[f64; 3], x: f64) -> i64 {
    let v = (poly[2] * x + poly[1]) * x + poly[0];
    (v + 0.5).floor() as i64
}

/// Smallest legal residual width that can hold `range` distinct offsets,
/// or `None` when even 32 bits cannot.
pub(crate) fn width_for(range: i128) -> Option<u32> {
    WIDTHS
        .iter()
        .copied()
        .find(|&w| range <= ((1i128 << w) - 1))
}

/// Polynomial degree for a span of `span_len` elements in a segment of
/// `seg_len`. A single block cannot support a quadratic term; a segment
/// shorter than one block clips the degree to its point count.
pub(crate) fn span_degree(span_len: usize, seg_len: usize) -> usize {
    if seg_len < BLOCK_LEN {
        seg_len.saturating_sub(1).min(2)
    } else if span_len <= BLOCK_LEN {
        1
    } else {
        2
    }
}

/// Min and max residual of `seg[start..start+len]` against `poly`, with
/// segment-local x.
pub(crate) fn residual_range(seg: &[u32], start: usize, len: usize, poly: &[f64; 3]) -> (i64, i64) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for (i, &v) in seg[start..start + len].iter().enumerate() {
        let x = (start + i) as f64;
        let r = i64::from(v) - eval_round(poly, x);
        min = min.min(r);
        max = max.max(r);
    }
    (min, max)
}

/// Partition one segment into spans minimizing total bit cost (greedily).
pub(crate) fn plan_segment(seg: &[u32]) -> Vec<PlannedSpan> {
    debug_assert!(!seg.is_empty() && seg.len() <= SEG_LEN);
    let nblocks = seg.len().div_ceil(BLOCK_LEN);

    let mut block_fitters = Vec::with_capacity(nblocks);
    for b in 0..nblocks {
        let lo = b * BLOCK_LEN;
        let hi = (lo + BLOCK_LEN).min(seg.len());
        let mut fit = PolyFitter::new(2);
        for x in lo..hi {
            fit.add(x as f64, f64::from(seg[x]));
        }
        block_fitters.push(fit);
    }

    let mut spans = Vec::new();
    let mut first = 0usize;
    let mut count = 1usize;
    let mut cur = block_fitters[0].clone();
    let (mut cur_poly, mut cur_per_elt) = appraise(seg, first, count, &cur);

    for b in 1..nblocks {
        let mut trial = cur.clone();
        trial.merge(&block_fitters[b]);
        let (poly, per_elt) = appraise(seg, first, count + 1, &trial);

        if per_elt <= cur_per_elt {
            cur = trial;
            cur_poly = poly;
            cur_per_elt = per_elt;
            count += 1;
        } else {
            spans.push(PlannedSpan {
                first_block: first,
                block_count: count,
                poly: cur_poly,
            });
            first = b;
            count = 1;
            cur = block_fitters[b].clone();
            let (poly, per_elt) = appraise(seg, first, count, &cur);
            cur_poly = poly;
            cur_per_elt = per_elt;
        }
    }
    spans.push(PlannedSpan {
        first_block: first,
        block_count: count,
        poly: cur_poly,
    });
    spans
}

/// Fit and cost one candidate span; returns its polynomial and per-element
/// bit cost.
fn appraise(seg: &[u32], first_block: usize, block_count: usize, fit: &PolyFitter) -> ([f64; 3], f64) {
    let start = first_block * BLOCK_LEN;
    let len = (block_count * BLOCK_LEN).min(seg.len() - start);
    let degree = span_degree(len, seg.len());
    let poly = fit.solve_degree(degree);

    let (min, max) = residual_range(seg, start, len, &poly);
    let range = i128::from(max) - i128::from(min);
    // A span the encoder will have to store raw still costs 32 bits/elt.
    let width = width_for(range).unwrap_or(32);

    let cost = SPAN_OVERHEAD_BITS + len as u64 * u64::from(width);
    (poly, cost as f64 / len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(spans: &[PlannedSpan], seg_len: usize) {
        let nblocks = seg_len.div_ceil(BLOCK_LEN);
        assert_eq!(spans[0].first_block, 0);
        let mut next = 0;
        for s in spans {
            assert_eq!(s.first_block, next, "spans must be contiguous");
            assert!(s.block_count >= 1);
            next += s.block_count;
        }
        assert_eq!(next, nblocks, "spans must cover the segment");
    }

    #[test]
    fn test_constant_segment_is_one_span() {
        let seg = vec![7u32; SEG_LEN];
        let spans = plan_segment(&seg);
        assert_eq!(spans.len(), 1);
        covered(&spans, seg.len());
    }

    #[test]
    fn test_linear_segment_is_one_span() {
        let seg: Vec<u32> = (0..SEG_LEN as u32).map(|i| i * 3 + 11).collect();
        let spans = plan_segment(&seg);
        assert_eq!(spans.len(), 1);
        covered(&spans, seg.len());
    }

    #[test]
    fn test_regime_change_splits() {
        // Smooth ramp followed by wild high-amplitude noise: keeping both in
        // one span would force the ramp to pay the noise's residual width.
        let mut seg: Vec<u32> = (0..512u32).collect();
        for i in 0..512u32 {
            seg.push(2_000_000_000 + (i.wrapping_mul(2_654_435_761) >> 8));
        }
        let spans = plan_segment(&seg);
        assert!(spans.len() >= 2, "expected a split, got {spans:?}");
        covered(&spans, seg.len());
    }

    #[test]
    fn test_short_segment_single_span() {
        let seg = vec![3u32, 9, 27];
        let spans = plan_segment(&seg);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].first_block, 0);
        assert_eq!(spans[0].block_count, 1);
    }

    #[test]
    fn test_partial_tail_block_covered() {
        let seg: Vec<u32> = (0..100u32).map(|i| i * 2).collect();
        let spans = plan_segment(&seg);
        covered(&spans, seg.len());
    }

    #[test]
    fn test_width_for_picks_smallest() {
        assert_eq!(width_for(0), Some(0));
        assert_eq!(width_for(1), Some(1));
        assert_eq!(width_for(2), Some(2));
        assert_eq!(width_for(3), Some(2));
        assert_eq!(width_for(4), Some(4));
        assert_eq!(width_for(255), Some(8));
        assert_eq!(width_for(256), Some(16));
        assert_eq!(width_for(i128::from(u32::MAX)), Some(32));
        assert_eq!(width_for(i128::from(u32::MAX) + 1), None);
    }

    #[test]
    fn test_span_degree_rules() {
        assert_eq!(span_degree(1, 1), 0);
        assert_eq!(span_degree(3, 3), 2);
        assert_eq!(span_degree(15, 15), 2);
        assert_eq!(span_degree(16, 1024), 1);
        assert_eq!(span_degree(8, 1000), 1);
        assert_eq!(span_degree(32, 1024), 2);
    }

    #[test]
    fn test_eval_round_matches_manual() {
        let poly = [1.5, 2.0, 0.5];
        // 1.5 + 2x + 0.5x² at x=3: 1.5 + 6 + 4.5 = 12.0
        assert_eq!(eval_round(&poly, 3.0), 12);
        assert_eq!(eval_round(&[0.49, 0.0, 0.0], 0.0), 0);
        assert_eq!(eval_round(&[0.5, 0.0, 0.0], 0.0), 1);
        assert_eq!(eval_round(&[-0.6, 0.0, 0.0], 0.0), -1);
    }
}
