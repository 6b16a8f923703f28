//! # Piecewise-Polynomial Compressed Arrays
//!
//! *Constant-time random access at a few bits per element.*
//!
//! ## Intuition First
//!
//! Picture a long staircase photographed from far away: it looks like a
//! straight ramp. Storing the ramp (two numbers) plus each step's tiny
//! deviation from it is far cheaper than storing every step's absolute
//! height.
//!
//! This crate does exactly that for `u32` sequences that follow a rough
//! trend (sorted offsets, timestamps, document ids): it fits short
//! polynomial pieces over runs of the input and stores only a small
//! non-negative correction per element, bit-packed. Any element is
//! recovered by evaluating one polynomial and adding one extracted
//! residual—no decompression of neighbors.
//!
//! ## The Problem
//!
//! Plain arrays pay 32 bits per element regardless of content. General
//! compressors reach the entropy limit but lose random access: reading one
//! element means decoding a whole block. Trend-following data deserves
//! both: near-entropy space *and* O(1) `get`.
//!
//! ## Historical Context
//!
//! ```text
//! 1805  Legendre    Least squares published (Gauss claimed 1795)
//! 1974  Elias       Static storage of monotone sequences
//! 1989  Jacobson    Succinct paradigm: rank/select over packed bits
//! 2018  Kraska      "Learned" indexes: models replace structure
//! 2020  Ferragina   PGM-index: piecewise linear ε-approximations
//! 2021  Boffa       LA-vector: piecewise approximations + corrections
//! ```
//!
//! The insight this crate builds on is the last one: a model only has to be
//! *approximately* right if exact corrections are cheap to store and
//! address.
//!
//! ## Mathematical Formulation
//!
//! The input is cut into segments of 1024 elements, each partitioned into
//! spans of 16·k elements. A span stores coefficients of
//! $y(x) = a + bx + cx^2$ (least squares, degree ≤ 2) shifted so that every
//! residual $r_i = v_i - \lfloor y(x_i) + 0.5 \rfloor$ is non-negative, and
//! packs each $r_i$ in $w \in \{0,1,2,4,8,16,32\}$ bits. Span boundaries
//! are chosen to minimize total bits: the fixed 256-bit span overhead
//! pushes spans to grow, the worst-fitting block's residual width pushes
//! them to split.
//!
//! ## Complexity Analysis
//!
//! - **Build**: $O(n)$ matrix work plus a residual scan per candidate
//!   extension; single-threaded, allocation only at build time.
//! - **Access**: $O(1)$: one popcount over a 64-bit span bitmap, one rank
//!   word, one Horner evaluation, one shift-and-mask bit extraction.
//! - **Space**: typically 5–16 bits per element for sorted or near-sorted
//!   input over bounded ranges; worst case 32 bits plus overhead.
//!
//! ## What Could Go Wrong
//!
//! 1. **Adversarial input**: white noise has no trend; spans degrade to 32
//!    bits per element and compression evaporates (recovery stays exact).
//! 2. **Float determinism**: residual widths chosen at encode time are only
//!    valid if decode evaluates polynomials identically. Evaluation is
//!    pinned to one Horner routine shared by both sides.
//! 3. **Static only**: there is no update path; rebuild to change content.
//!
//! ## Implementation Notes
//!
//! This crate provides:
//! - **`PolyArray`**: the compressed array with O(1) `get`, statistics and
//!   a validated binary serialization.
//! - **`PolyFitter`**: the incremental, mergeable least-squares fitter the
//!   encoder plans spans with.
//!
//! ## References
//!
//! - Kraska, T., et al. (2018). "The Case for Learned Index Structures."
//! - Ferragina, P., & Vinciguerra, G. (2020). "The PGM-index: a fully-
//!   dynamic compressed learned index."
//! - Boffa, A., Ferragina, P., & Vinciguerra, G. (2021). "A learned
//!   approach to design compressed rank/select data structures."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
mod bits;
pub mod error;
pub mod fitter;
mod planner;

pub use array::PolyArray;
pub use error::Error;
pub use fitter::PolyFitter;
