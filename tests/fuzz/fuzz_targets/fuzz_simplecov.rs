#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parser and range extraction must not panic on any input.
    if let Ok(report) = patchcov::parsers::simplecov::parse(data) {
        let _ = patchcov::coverage::uncovered_ranges(&report);
    }
});
