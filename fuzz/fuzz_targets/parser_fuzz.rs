#![no_main]
use libfuzzer_sys::fuzz_target;

const COMMANDS: [&str; 4] = ["encode", "decode", "dump", "config"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let args: Vec<String> = std::iter::once(COMMANDS[usize::from(selector) % COMMANDS.len()])
        .chain(text.split_whitespace().take(32))
        .map(str::to_owned)
        .collect();
    hexrec::cli::fuzz_try_parse_args(&args);
});
