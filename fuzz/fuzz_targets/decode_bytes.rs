#![no_main]
use libfuzzer_sys::fuzz_target;
use polyarray::PolyArray;

// Arbitrary bytes must either decode into a structure that is safe to read
// exhaustively, or be rejected with an error. Never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(arr) = PolyArray::from_bytes(data) {
        let n = arr.len();
        for i in (0..n).step_by(1 + n / 256) {
            let _ = arr.get(i);
        }
        let _ = arr.get(n);
        let _ = arr.stat();
    }
});
