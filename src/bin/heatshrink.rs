use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use heatshrink::io::{HeatshrinkReader, HeatshrinkWriter};
use heatshrink::{DynamicDecoder, DynamicEncoder};
use log::{debug, info, LevelFilter};
use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter};
use std::io::{Read, Write};

/// Compressed bytes the decoder may hold between polls
const HEATSHRINK_DECODER_INPUT_SIZE: usize = 256;

#[derive(Parser)] // requires `derive` feature
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("command").required(true).args(&["encode", "decode"])))]
struct Cli {
    #[clap(short = 'e', long = "encode", help = "Compress data")]
    encode: bool,

    #[clap(short = 'd', long = "decode", help = "Decompress data")]
    decode: bool,

    #[clap(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Print input & output sizes, compression ratio, etc (repeat for debug logs)"
    )]
    verbose: u8,

    #[clap(
        short = 'w',
        long = "window",
        help = "Base-2 log of LZSS sliding window size",
        default_value_t = heatshrink::DEFAULT_WINDOW_BITS,
        value_parser = clap::value_parser!(u8).range(4..=15)
    )]
    window_bits: u8,

    #[clap(
        short = 'l',
        long = "length",
        help = "Number of bits used for back-reference lengths",
        default_value_t = heatshrink::DEFAULT_LOOKAHEAD_BITS,
        value_parser = clap::value_parser!(u8).range(3..=14)
    )]
    lookahead_bits: u8,

    /// Input file, stdin when absent
    #[clap(group = "input")]
    input_file: Option<String>,

    /// Output file, stdout when absent
    #[clap(group = "output")]
    output_file: Option<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    // RUST_LOG, when set, overrides the -v level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn report(
    use_stdout: bool,
    file_name: &str,
    input_len: u64,
    output_len: u64,
    window_bits: u8,
    lookahead_bits: u8,
) {
    let ratio = if input_len == 0 {
        0.0
    } else {
        100.0 - (100.0 * output_len as f32) / input_len as f32
    };
    let line = format!(
        "{0:} {1:.2}% \t{2:} -> {3:} (-w {4:} -l {5:})",
        file_name, ratio, input_len, output_len, window_bits, lookahead_bits
    );
    if use_stdout {
        println!("{}", line);
    } else {
        eprintln!("{}", line);
    }
}

fn encode(
    input: &mut dyn Read,
    output: &mut dyn Write,
    window_bits: u8,
    lookahead_bits: u8,
) -> Result<(u64, u64)> {
    let enc = DynamicEncoder::alloc(window_bits, lookahead_bits)
        .context("cannot allocate encoder")?;
    let mut writer = HeatshrinkWriter::new(output, enc);

    let total_in = io::copy(input, &mut writer).context("compression failed")?;
    writer.try_finish().context("cannot finish stream")?;
    debug!("encoder sank {} bytes", total_in);

    Ok((total_in, writer.total_out()))
}

fn decode(
    input: &mut dyn Read,
    output: &mut dyn Write,
    window_bits: u8,
    lookahead_bits: u8,
) -> Result<(u64, u64)> {
    let dec = DynamicDecoder::alloc(HEATSHRINK_DECODER_INPUT_SIZE, window_bits, lookahead_bits)
        .context("cannot allocate decoder")?;
    let mut reader = HeatshrinkReader::new(input, dec);

    let total_out = io::copy(&mut reader, output).context("decompression failed")?;
    output.flush().context("cannot flush output")?;

    Ok((reader.total_in(), total_out))
}

fn main() -> Result<()> {
    // parse the command line parameters
    let args = Cli::parse();
    init_logging(args.verbose);

    if args.lookahead_bits >= args.window_bits {
        anyhow::bail!(
            "back-reference length bits ({}) must be smaller than window bits ({})",
            args.lookahead_bits,
            args.window_bits
        );
    }
    debug!(
        "window {} bits, lookahead {} bits",
        args.window_bits, args.lookahead_bits
    );

    // Open input file for read
    let mut input_file: Box<dyn Read> = match args.input_file {
        // if no file name was provided use stdin instead
        None => Box::new(BufReader::new(io::stdin())),
        Some(ref filename) => Box::new(BufReader::new(
            File::open(filename).with_context(|| format!("cannot open {}", filename))?,
        )),
    };
    // Open output file for write
    let mut output_file: Box<dyn Write> = match args.output_file {
        // if no file name was provided use stdout instead
        None => Box::new(BufWriter::new(io::stdout())),
        Some(ref filename) => Box::new(BufWriter::new(
            File::create(filename).with_context(|| format!("cannot create {}", filename))?,
        )),
    };

    // Process the file
    let (input_size, output_size) = if args.encode {
        encode(
            &mut input_file,
            &mut output_file,
            args.window_bits,
            args.lookahead_bits,
        )?
    } else {
        decode(
            &mut input_file,
            &mut output_file,
            args.window_bits,
            args.lookahead_bits,
        )?
    };
    info!("{} bytes in, {} bytes out", input_size, output_size);

    // Output log if requested
    if args.verbose > 0 {
        let file_name = args.input_file.as_deref().unwrap_or("(stdin)");
        report(
            args.output_file.is_some(),
            file_name,
            input_size,
            output_size,
            args.window_bits,
            args.lookahead_bits,
        );
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{decode, encode, Cli};
    use clap::Parser;
    use std::io::Cursor;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["heatshrink", "-e"]).unwrap();
        assert!(cli.encode);
        assert_eq!(cli.window_bits, 8);
        assert_eq!(cli.lookahead_bits, 4);
        assert!(cli.input_file.is_none());

        let args = ["heatshrink", "-d", "-vv", "-w", "12", "-l", "5", "in"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.decode);
        assert_eq!(cli.verbose, 2);
        assert_eq!((cli.window_bits, cli.lookahead_bits), (12, 5));
        assert_eq!(cli.input_file.as_deref(), Some("in"));
    }

    #[test]
    fn cli_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["heatshrink"]).is_err());
        assert!(Cli::try_parse_from(["heatshrink", "-e", "-d"]).is_err());
        assert!(Cli::try_parse_from(["heatshrink", "-e", "-w", "16"]).is_err());
        assert!(Cli::try_parse_from(["heatshrink", "-d", "-l", "2"]).is_err());
    }

    #[test]
    fn encode_then_decode() {
        let text = b"The quick brown fox jumps over the lazy dog. The quick brown fox.".repeat(20);
        let mut compressed = Vec::new();
        let (n_in, n_out) = encode(&mut Cursor::new(&text), &mut compressed, 11, 4).unwrap();
        assert_eq!(n_in, text.len() as u64);
        assert_eq!(n_out, compressed.len() as u64);
        assert!(compressed.len() < text.len() / 4);

        let mut plain = Vec::new();
        let (n_in, n_out) = decode(&mut Cursor::new(&compressed), &mut plain, 11, 4).unwrap();
        assert_eq!(n_in, compressed.len() as u64);
        assert_eq!(n_out, text.len() as u64);
        assert_eq!(plain, text);
    }

    #[test]
    fn invalid_parameters_are_errors() {
        let mut sink = Vec::new();
        assert!(encode(&mut Cursor::new(b"x"), &mut sink, 6, 6).is_err());
        assert!(decode(&mut Cursor::new(b"x"), &mut sink, 6, 6).is_err());
    }
}
