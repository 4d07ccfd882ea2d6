#![no_main]
use libfuzzer_sys::fuzz_target;
use patchcov::range::is_sorted_disjoint;

fuzz_target!(|data: &[u8]| {
    // Diff parser must not panic, and its ranges must be valid input for
    // the intersection sweep.
    if let Ok(s) = std::str::from_utf8(data) {
        for ranges in patchcov::diff::parse_diff(s).values() {
            assert!(is_sorted_disjoint(ranges));
        }
    }
});
