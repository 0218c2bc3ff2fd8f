fn main() {
    #[cfg(feature = "cli")]
    hexrec::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("hexrec: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
