#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // First line acts as the header, the rest as data rows
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let parser = chargelog::parser::RecordParser::for_header(header);
    for (i, line) in lines.enumerate() {
        if let Ok(sample) = parser.parse_line(line, i as u64 + 1, "fuzz") {
            assert!(sample.measurements().iter().all(|v| v.is_finite()));
        }
    }

    let _ = chargelog::parser::parse_timestamp(text);
    let _ = chargelog::parser::parse_number(text);
});
