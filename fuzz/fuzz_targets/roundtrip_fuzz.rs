#![no_main]
use hexrec::codec::{coalesce, encode_all, read_str};
use hexrec::{AddressWidth, WriterOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte selects format and address width, second the record width.
    let opts = match data[0] % 4 {
        0 => WriterOptions::intel_hex(),
        1 => WriterOptions::srecord(AddressWidth::Bits16),
        2 => WriterOptions::srecord(AddressWidth::Bits24),
        _ => WriterOptions::srecord(AddressWidth::Bits32),
    };
    let opts = opts.with_width(usize::from(data[1] % 64) + 1);
    let format = opts.format;
    let payload = &data[2..];

    let text = encode_all(Vec::new(), payload, opts).unwrap();
    let text = String::from_utf8(text).unwrap();
    let records = read_str(format, &text).unwrap();

    let decoded: Vec<u8> = coalesce(&records)
        .iter()
        .filter(|r| r.is_data())
        .flat_map(|r| r.payload.iter().copied())
        .collect();
    assert_eq!(decoded, payload);
});
