#![no_main]
use libfuzzer_sys::fuzz_target;
use polyarray::PolyArray;

fuzz_target!(|data: (Vec<u32>, bool)| {
    let (mut values, sort) = data;
    if sort {
        values.sort_unstable();
    }

    let arr = PolyArray::new(&values);
    assert_eq!(arr.len(), values.len());

    // Recovery must be exact for every element.
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(arr.get(i).unwrap(), v, "mismatch at {i}");
    }
    assert!(arr.get(values.len()).is_err());

    // Serialization must round-trip bit-identically.
    let bytes = arr.to_bytes();
    let back = PolyArray::from_bytes(&bytes).expect("own bytes must decode");
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(back.get(i).unwrap(), v, "roundtrip mismatch at {i}");
    }
});
