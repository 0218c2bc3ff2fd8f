#![no_main]
use hexrec::codec::{coalesce, read_str};
use hexrec::image::Image;
use hexrec::record::Format;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text must only ever produce errors, never panics.
    let text = String::from_utf8_lossy(data);
    for format in Format::ALL {
        if let Ok(records) = read_str(format, &text) {
            let merged = coalesce(&records);
            let _ = Image::from_records(&merged, 0xFF);
        }
    }
});
