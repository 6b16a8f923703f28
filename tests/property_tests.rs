use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use polyarray::{Error, PolyArray, PolyFitter};

const LEGAL_WIDTHS: [u64; 7] = [0, 1, 2, 4, 8, 16, 32];

fn check_all(values: &[u32]) -> PolyArray {
    let arr = PolyArray::new(values);
    assert_eq!(arr.len(), values.len());
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(arr.get(i).unwrap(), v, "index {i}");
    }
    arr
}

proptest! {
    #[test]
    fn test_exact_recovery_arbitrary(values in prop::collection::vec(any::<u32>(), 0..3000)) {
        let arr = PolyArray::new(&values);
        prop_assert_eq!(arr.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(arr.get(i).unwrap(), v);
        }
        prop_assert!(arr.get(values.len()).is_err());
    }

    #[test]
    fn test_exact_recovery_sorted(
        mut values in prop::collection::vec(0..50_000_000u32, 1..4000),
    ) {
        values.sort_unstable();
        let arr = PolyArray::new(&values);
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(arr.get(i).unwrap(), v);
        }
    }

    #[test]
    fn test_serialize_roundtrip(
        mut values in prop::collection::vec(any::<u32>(), 0..2500),
        sort in any::<bool>(),
    ) {
        if sort {
            values.sort_unstable();
        }
        let arr = PolyArray::new(&values);
        let back = PolyArray::from_bytes(&arr.to_bytes()).unwrap();
        prop_assert_eq!(back.len(), arr.len());
        for i in 0..values.len() {
            prop_assert_eq!(back.get(i).unwrap(), arr.get(i).unwrap());
        }
    }

    #[test]
    fn test_stat_accounting(values in prop::collection::vec(any::<u32>(), 0..2500)) {
        let arr = PolyArray::new(&values);
        let stat = arr.stat();

        prop_assert_eq!(stat["n"], values.len() as u64);
        prop_assert_eq!(
            stat["mem_total"],
            stat["mem_bitmap"] + stat["mem_polynomials"] + stat["mem_configs"]
                + stat["mem_residuals"]
        );
        prop_assert!(LEGAL_WIDTHS.contains(&stat["elt_width"]));
        if !values.is_empty() {
            prop_assert_eq!(stat["bits/elt"], stat["mem_total"] * 8 / values.len() as u64);
        }
    }

    /// The serialized form is the contract with external serializers: check
    /// the documented segment descriptors directly from the bytes.
    #[test]
    fn test_serialized_bitmap_rank_consistency(
        values in prop::collection::vec(any::<u32>(), 1..4000),
    ) {
        let arr = PolyArray::new(&values);
        let bytes = arr.to_bytes();

        let word = |i: usize| u64::from_le_bytes(bytes[i..i + 8].try_into().unwrap());
        let n = word(8) as usize;
        let nseg = word(16) as usize;
        let nspan = word(24) as usize;
        prop_assert_eq!(n, values.len());
        prop_assert_eq!(nseg, values.len().div_ceil(1024));
        prop_assert_eq!(nspan, arr.num_spans());

        let rank_base = 40;
        let bitmap_base = rank_base + nseg * 8;
        let configs_base = bitmap_base + nseg * 8 + nspan * 24;

        let mut running = 0u64;
        for k in 0..nseg {
            let rank = word(rank_base + k * 8);
            let bm = word(bitmap_base + k * 8);
            prop_assert_eq!(rank, running, "rank must prefix-sum span counts");
            prop_assert_eq!(bm & 1, 1, "every segment starts a span at block 0");
            running += u64::from(bm.count_ones());
        }
        prop_assert_eq!(running, nspan as u64, "bitmap population must equal span count");

        for s in 0..nspan {
            let config = word(configs_base + s * 8);
            prop_assert!(LEGAL_WIDTHS.contains(&(config & 0xFF)));
        }
    }

    #[test]
    fn test_fitter_merge_matches_pooled(
        ys in prop::collection::vec(-1000..1000i32, 2..64),
        split in 1..63usize,
    ) {
        let split = split.min(ys.len() - 1);
        let mut pooled = PolyFitter::new(2);
        let mut left = PolyFitter::new(2);
        let mut right = PolyFitter::new(2);
        for (x, &y) in ys.iter().enumerate() {
            pooled.add(x as f64, f64::from(y));
            if x < split {
                left.add(x as f64, f64::from(y));
            } else {
                right.add(x as f64, f64::from(y));
            }
        }
        left.merge(&right);

        let a = pooled.solve();
        let b = left.solve();
        for i in 0..3 {
            prop_assert!(
                (a[i] - b[i]).abs() < 1e-6 || !a[i].is_finite(),
                "coefficient {i}: {} vs {}", a[i], b[i]
            );
        }
    }

    #[test]
    fn test_fitter_clone_independence(ys in prop::collection::vec(0..10_000u32, 2..32)) {
        let mut orig = PolyFitter::new(2);
        for (x, &y) in ys.iter().enumerate() {
            orig.add(x as f64, f64::from(y));
        }
        let solved = orig.solve();
        let mut copy = orig.clone();
        copy.add(1e6, 1e9);
        prop_assert_eq!(orig.solve(), solved);
    }
}

// Literal end-to-end scenarios.

#[test]
fn test_short_sorted() {
    let input = [
        0u32, 16, 32, 48, 64, 79, 95, 111, 126, 142, 158, 174, 190, 206, 222, 236,
    ];
    let arr = check_all(&input);
    assert!(arr.stat()["elt_width"] <= 2);
}

#[test]
fn test_tiny_arithmetic() {
    let arr = check_all(&[0, 15, 33, 50]);
    assert_eq!(arr.stat()["elt_width"], 2);
}

#[test]
fn test_empty_input() {
    let arr = PolyArray::new(&[]);
    assert_eq!(arr.len(), 0);
    assert!(matches!(arr.get(0), Err(Error::IndexOutOfBounds(0))));
}

#[test]
fn test_duplicates() {
    let arr = check_all(&[7u32; 16]);
    let stat = arr.stat();
    assert_eq!(stat["elt_width"], 0);
    assert_eq!(stat["mem_residuals"], 0);
}

#[test]
fn test_million_sorted_uniform() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut values: Vec<u32> = (0..1_000_000).map(|_| rng.gen_range(0..=1_000_000)).collect();
    values.sort_unstable();

    let arr = PolyArray::new(&values);
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(arr.get(i).unwrap(), v, "index {i}");
    }
    let stat = arr.stat();
    assert!(stat["bits/elt"] <= 8, "got {} bits/elt", stat["bits/elt"]);
}

#[test]
fn test_noisy_trend() {
    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<u32> = (0..5000u32)
        .map(|i| 1000 * i + rng.gen_range(0..200))
        .collect();

    let arr = check_all(&values);
    let stat = arr.stat();
    assert!(stat["bits/elt"] <= 12, "got {} bits/elt", stat["bits/elt"]);
}
