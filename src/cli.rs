// Command-line front end for hexrec.
//
// Subcommands wrap the library's file helpers:
//   encode  binary -> Intel HEX / S-record text
//   decode  record text -> flat binary image
//   dump    one line per decoded record

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::codec::coalesce::coalesce;
use crate::codec::decoder::read_str;
use crate::codec::encoder::WriterOptions;
use crate::io::{decode_stream, encode_stream};
use crate::record::{AddressWidth, Format};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err("empty hex value".into());
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let v = parse_hex_u32(s)?;
    u8::try_from(v).map_err(|_| format!("fill byte out of range: '{s}'"))
}

fn parse_address_width(s: &str) -> Result<AddressWidth, String> {
    s.trim()
        .parse::<u32>()
        .ok()
        .and_then(AddressWidth::from_bits)
        .ok_or_else(|| format!("address width must be 16, 24 or 32, got '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Intel HEX and Motorola S-record encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "hexrec",
    version,
    about = "Intel HEX / Motorola S-record encoder and decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode a binary file as records.
    Encode(EncodeArgs),
    /// Decode records into a flat binary image.
    Decode(DecodeArgs),
    /// Print one line per record.
    Dump(DumpArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Intel HEX.
    Ihex,
    /// Motorola S-record.
    Srec,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Ihex => Format::IntelHex,
            FormatArg::Srec => Format::SRecord,
        }
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Output record format.
    #[arg(long, value_enum, default_value_t = FormatArg::Ihex)]
    format: FormatArg,

    /// Payload bytes per data record.
    #[arg(long, short = 'w')]
    width: Option<usize>,

    /// Address field width in bits (16, 24 or 32).
    #[arg(long = "address-width", value_parser = parse_address_width)]
    address_width: Option<AddressWidth>,

    /// Address of the first input byte (hex).
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    address: u32,

    /// Emit a start-address record (hex).
    #[arg(long, value_parser = parse_hex_u32)]
    start: Option<u32>,

    /// Emit an S0 header record with this text.
    #[arg(long)]
    header: Option<String>,

    /// Emit an S5/S6 data record count.
    #[arg(long)]
    count: bool,

    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Input record format.
    #[arg(long, value_enum)]
    format: FormatArg,

    /// Byte used for gaps between data blocks (hex).
    #[arg(long, value_parser = parse_hex_u8, default_value = "FF")]
    fill: u8,

    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DumpArgs {
    /// Input record format.
    #[arg(long, value_enum)]
    format: FormatArg,

    /// Merge contiguous data records before printing.
    #[arg(long)]
    coalesce: bool,

    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
    Dump,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    format: Option<Format>,
    width: Option<usize>,
    address_width: Option<AddressWidth>,
    base_address: u32,
    start_address: Option<u32>,
    header: Option<String>,
    count: bool,
    fill: u8,
    coalesce: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
            format: None,
            width: None,
            address_width: None,
            base_address: 0,
            start_address: None,
            header: None,
            count: false,
            fill: 0xFF,
            coalesce: false,
            input_file: None,
            output_file: None,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Encode(args) => Options {
            format: Some(args.format.into()),
            width: args.width,
            address_width: args.address_width,
            base_address: args.address,
            start_address: args.start,
            header: args.header.clone(),
            count: args.count,
            input_file: args.input.clone(),
            output_file: args.output.clone(),
            ..Options::new(Command::Encode, &cli)
        },
        Cmd::Decode(args) => Options {
            format: Some(args.format.into()),
            fill: args.fill,
            input_file: args.input.clone(),
            output_file: args.output.clone(),
            ..Options::new(Command::Decode, &cli)
        },
        Cmd::Dump(args) => Options {
            format: Some(args.format.into()),
            coalesce: args.coalesce,
            input_file: args.input.clone(),
            ..Options::new(Command::Dump, &cli)
        },
        Cmd::Config => Options::new(Command::Config, &cli),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("hexrec".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn open_input(path: Option<&Path>) -> io::Result<Box<dyn Read>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::with_capacity(BUF_SIZE, File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn open_output(path: Option<&Path>, force: bool) -> Result<Box<dyn Write>, String> {
    match path {
        None => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
        Some(path) => {
            if path.exists() && !force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("output file: {}: {e}", path.display()))
        }
    }
}

/// Write a fully produced result. The output file is only created once
/// there is something to put in it.
fn write_output(opts: &Options, bytes: &[u8]) -> Result<(), String> {
    let mut output = open_output(opts.output_file.as_deref(), opts.force)?;
    output
        .write_all(bytes)
        .and_then(|()| output.flush())
        .map_err(|e| format!("write error: {e}"))
}

/// Read the whole record input into memory.
fn read_records_text(opts: &Options) -> Result<String, String> {
    let mut text = String::new();
    open_input(opts.input_file.as_deref())
        .and_then(|mut r| r.read_to_string(&mut text))
        .map_err(|e| match &opts.input_file {
            Some(path) => format!("input file: {}: {e}", path.display()),
            None => format!("read error: {e}"),
        })?;
    Ok(text)
}

fn build_writer_options(opts: &Options) -> WriterOptions {
    let format = opts.format.unwrap_or(Format::IntelHex);
    let mut wo = match format {
        Format::IntelHex => WriterOptions::intel_hex(),
        Format::SRecord => {
            WriterOptions::srecord(opts.address_width.unwrap_or(AddressWidth::Bits16))
        }
    };
    if let Some(width) = opts.address_width {
        wo.address_width = width;
    }
    if let Some(width) = opts.width {
        wo = wo.with_width(width);
    }
    if let Some(header) = &opts.header {
        wo = wo.with_header(header.as_bytes());
    }
    if let Some(start) = opts.start_address {
        wo = wo.with_start_address(start);
    }
    if opts.count {
        wo = wo.with_count();
    }
    wo.with_base_address(opts.base_address)
}

fn hex_digest(digest: Option<[u8; 32]>) -> Option<String> {
    digest.map(hex::encode)
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("hexrec version {version} (Rust)");
    eprintln!("Licensed under the MIT License");

    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={file_io}");
    for format in Format::ALL {
        eprintln!(
            "{}: marker '{}', default width {}",
            format,
            format.params().marker,
            format.params().default_width
        );
    }
    eprintln!("MAX_IMAGE_SIZE={}", crate::image::MAX_IMAGE_SIZE);
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn cmd_encode(opts: &Options) -> i32 {
    let writer_opts = build_writer_options(opts);
    let format = writer_opts.format;

    let input = match open_input(opts.input_file.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            let name = opts.input_file.as_deref().unwrap_or(Path::new("-"));
            eprintln!("hexrec: input file: {}: {e}", name.display());
            return 1;
        }
    };

    let mut encoded = Vec::new();
    let stats = match encode_stream(input, &mut encoded, writer_opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("hexrec: {e}");
            return 1;
        }
    };
    if let Err(msg) = write_output(opts, &encoded) {
        eprintln!("hexrec: {msg}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "hexrec: encoder: {format}, input size: {}, data records: {}, output size: {}",
            stats.input_size, stats.data_records, stats.output_size
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "encode",
            "format": format.name(),
            "input_size": stats.input_size,
            "data_records": stats.data_records,
            "output_size": stats.output_size,
            "input_sha256": hex_digest(stats.input_sha256),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    let format = opts.format.unwrap_or(Format::IntelHex);
    let text = match read_records_text(opts) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("hexrec: {msg}");
            return 1;
        }
    };

    let mut image = Vec::new();
    let stats = match decode_stream(format, text.as_bytes(), &mut image, opts.fill) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("hexrec: {e}");
            return 1;
        }
    };
    if let Err(msg) = write_output(opts, &image) {
        eprintln!("hexrec: {msg}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "hexrec: decoder: {format}, records: {} ({} coalesced), base: {:#010x}, output size: {}",
            stats.records, stats.coalesced_records, stats.base_address, stats.output_size
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "decode",
            "format": format.name(),
            "records": stats.records,
            "coalesced_records": stats.coalesced_records,
            "base_address": stats.base_address,
            "start_address": stats.start_address,
            "output_size": stats.output_size,
            "output_sha256": hex_digest(stats.output_sha256),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Dump command
// ---------------------------------------------------------------------------

fn cmd_dump(opts: &Options) -> i32 {
    let format = opts.format.unwrap_or(Format::IntelHex);
    let text = match read_records_text(opts) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("hexrec: {msg}");
            return 1;
        }
    };

    let records = match read_str(format, &text) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("hexrec: decode error: {e}");
            return 1;
        }
    };
    let total = records.len();
    let records = if opts.coalesce {
        coalesce(&records)
    } else {
        records
    };

    let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
    let result = records.iter().try_for_each(|record| {
        writeln!(out, "{record}")?;
        if opts.verbose > 0 && !record.payload.is_empty() {
            writeln!(out, "    {}", hex::encode_upper(&record.payload))?;
        }
        Ok::<(), io::Error>(())
    });
    if let Err(e) = result.and_then(|()| out.flush()) {
        eprintln!("hexrec: write error: {e}");
        return 1;
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "dump",
            "format": format.name(),
            "records": total,
            "printed": records.len(),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = resolve_options(cli);

    let exit_code = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Decode => cmd_decode(&opts),
        Command::Dump => cmd_dump(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
