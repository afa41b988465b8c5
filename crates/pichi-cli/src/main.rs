use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use pichi_core::{
    ExtractOptions, IndexFormat, IndexMode, IndexOptions, IndexParser, IndexVersion,
    ParserOptions, PichiError,
};
use tracing::Level;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("PICHI_BUILD_COMMIT_FULL"),
    "\nbuilt: ",
    env!("PICHI_BUILD_DATE"),
);

const FILTER_HINT: &str =
    "filters are space-separated atoms such as 'host==10.0.0.1 dst_port>=1024'";

#[derive(Parser, Debug)]
#[command(name = "pichi")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PICHI_BUILD_COMMIT"), ")"))]
#[command(long_version = LONG_VERSION)]
#[command(
    about = "Index pcap captures and extract packets by host, port and protocol.",
    long_about = None,
    after_help = "Examples:\n  pichi index capture.pcap -o capture.pidx --bloom\n  pichi extract capture.pidx -o web.pcap -f 'port==80'\n  pichi inspect capture.pidx --pretty"
)]
struct Cli {
    /// Log per-file progress
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an index from one or more captures.
    #[command(
        after_help = "Examples:\n  pichi index a.pcap b.pcap -o both.pidx\n  pichi index 'captures/*.pcap' -o indexes --individual --compress"
    )]
    Index {
        /// Capture files or glob patterns (.pcap, optionally gzip-compressed)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Index file, or a directory with --individual
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Write one index per capture into the output directory
        #[arg(long)]
        individual: bool,

        /// Index layout
        #[arg(long, value_enum, default_value_t = FormatArg::Binary)]
        format: FormatArg,

        /// Binary index version (2: 32-bit offsets, 3: 64-bit offsets)
        #[arg(long = "index-version", value_enum, default_value_t = VersionArg::V3)]
        index_version: VersionArg,

        /// Name stored in the binary index header
        #[arg(long)]
        name: Option<String>,

        /// Gzip the index (appends .gz)
        #[arg(long)]
        compress: bool,

        /// Write a bloom filter of indexed hosts next to the index
        #[arg(long)]
        bloom: bool,

        /// Target false positive rate of the bloom filter
        #[arg(long, default_value_t = pichi_core::DEFAULT_BLOOM_FP_RATE)]
        bloom_fp_rate: f64,
    },
    /// Copy the packets matching a filter into a new capture.
    #[command(
        after_help = "Examples:\n  pichi extract capture.pidx -o dns.pcap -f 'port==53'\n  pichi extract capture.pidx -o out.pcap -f 'host==10.0.0.0/8' --bloom capture.pidx.bloom"
    )]
    Extract {
        /// Index file (.pidx or .ptxt, optionally gzip-compressed)
        index: PathBuf,

        /// Output capture
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Filter atoms, all of which must hold
        #[arg(short = 'f', long, num_args = 1..)]
        filter: Vec<String>,

        /// Directory prepended to the capture names stored in the index
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Gzip the output capture (appends .gz)
        #[arg(long)]
        compress: bool,

        /// Bloom sidecar used to skip indexes that cannot match
        #[arg(long)]
        bloom: Option<PathBuf>,
    },
    /// Summarize an index as JSON.
    Inspect {
        /// Index file
        index: PathBuf,

        /// Write the summary to a file instead of stdout
        #[arg(short = 'o', long)]
        report: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Print index rows in the text layout.
    Dump {
        /// Index file
        index: PathBuf,

        /// Filter atoms, all of which must hold
        #[arg(short = 'f', long, num_args = 1..)]
        filter: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Binary,
    Text,
}

impl From<FormatArg> for IndexFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Binary => IndexFormat::Binary,
            FormatArg::Text => IndexFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VersionArg {
    #[value(name = "2")]
    V2,
    #[value(name = "3")]
    V3,
}

impl From<VersionArg> for IndexVersion {
    fn from(value: VersionArg) -> Self {
        match value {
            VersionArg::V2 => IndexVersion::V2,
            VersionArg::V3 => IndexVersion::V3,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Index {
            inputs,
            output,
            individual,
            format,
            index_version,
            name,
            compress,
            bloom,
            bloom_fp_rate,
        } => {
            let options = IndexOptions {
                mode: if individual {
                    IndexMode::Individual
                } else {
                    IndexMode::Combined
                },
                format: format.into(),
                version: index_version.into(),
                name,
                compress,
                bloom,
                bloom_fp_rate,
            };
            cmd_index(&inputs, &output, &options, quiet)
        }
        Commands::Extract {
            index,
            output,
            filter,
            prefix,
            compress,
            bloom,
        } => {
            let options = ExtractOptions {
                index,
                output,
                filter: join_filter(&filter),
                prefix,
                compress,
                bloom,
            };
            cmd_extract(&options, quiet)
        }
        Commands::Inspect {
            index,
            report,
            pretty,
        } => cmd_inspect(&index, report.as_deref(), pretty, quiet),
        Commands::Dump { index, filter } => cmd_dump(&index, join_filter(&filter).as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<PichiError> for CliError {
    fn from(err: PichiError) -> Self {
        let hint = match &err {
            PichiError::Filter(_) => Some(FILTER_HINT.to_string()),
            PichiError::Pcap { .. } => Some("expected a classic .pcap capture".to_string()),
            PichiError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                Some("check the path".to_string())
            }
            PichiError::Format(_) => {
                Some("the index may be corrupt or written by another tool".to_string())
            }
            _ => None,
        };
        CliError::new(err.to_string(), hint)
    }
}

fn cmd_index(
    inputs: &[PathBuf],
    output: &Path,
    options: &IndexOptions,
    quiet: bool,
) -> Result<(), CliError> {
    let inputs = resolve_inputs(inputs)?;
    for input in &inputs {
        if input == output {
            return Err(CliError::new(
                format!("index path must differ from input: {}", output.display()),
                Some("choose a different output path".to_string()),
            ));
        }
    }
    if options.mode == IndexMode::Combined {
        create_parent(output)?;
    }

    let report = pichi_core::index_pcaps(&inputs, output, options)?;
    if !quiet {
        for artifact in &report.artifacts {
            eprintln!(
                "OK: {} packets from {} file(s) -> {}",
                artifact.packets,
                artifact.files.len(),
                artifact.path.display()
            );
            if let Some(bloom) = &artifact.bloom {
                eprintln!("OK: bloom filter -> {}", bloom.display());
            }
        }
    }
    Ok(())
}

fn cmd_extract(options: &ExtractOptions, quiet: bool) -> Result<(), CliError> {
    if options.index == options.output {
        return Err(CliError::new(
            format!("output must differ from index: {}", options.output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    create_parent(&options.output)?;

    let report = pichi_core::extract(options)?;
    if quiet {
        return Ok(());
    }
    match &report.output {
        Some(path) => eprintln!(
            "OK: {} packets ({} bytes) -> {}",
            report.packets,
            report.bytes,
            path.display()
        ),
        None if report.bloom_rejected => {
            eprintln!("OK: bloom filter rules out a required host, nothing extracted")
        }
        None => eprintln!("OK: no packet matched, no output written"),
    }
    if report.files_skipped > 0 {
        eprintln!(
            "warning: {} of {} capture(s) could not be read",
            report.files_skipped, report.files_visited
        );
    }
    Ok(())
}

fn cmd_inspect(
    index: &Path,
    report: Option<&Path>,
    pretty: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let mut parser = IndexParser::open(index, ParserOptions::default())?;
    let summary = parser.parse_whole().map_err(PichiError::from)?;
    let json = if pretty {
        serde_json::to_string_pretty(&summary)
    } else {
        serde_json::to_string(&summary)
    }
    .context("JSON serialization failed")?;

    match report {
        None => {
            println!("{json}");
        }
        Some(path) => {
            create_parent(path)?;
            fs::write(path, json)
                .with_context(|| format!("Failed to write summary: {}", path.display()))?;
            if !quiet {
                eprintln!("OK: summary written -> {}", path.display());
            }
        }
    }
    Ok(())
}

fn cmd_dump(index: &Path, filter: Option<&str>) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    pichi_core::dump_rows(index, filter, &mut out)?;
    out.flush().context("Failed to write rows to stdout")?;
    Ok(())
}

fn join_filter(atoms: &[String]) -> Option<String> {
    if atoms.is_empty() {
        None
    } else {
        Some(atoms.join(" "))
    }
}

fn create_parent(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, CliError> {
    let mut resolved = Vec::new();
    for input in inputs {
        let pattern = input.to_string_lossy();
        if !is_glob_pattern(&pattern) {
            if !input.is_file() {
                return Err(CliError::new(
                    format!("input file not found: {}", input.display()),
                    Some("pass a .pcap or .pcap.gz capture".to_string()),
                ));
            }
            resolved.push(input.clone());
            continue;
        }

        let paths = glob(&pattern).map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err.msg)),
            )
        })?;
        let before = resolved.len();
        for entry in paths {
            let path = entry.map_err(|err| {
                CliError::new(
                    format!("invalid input pattern '{}'", pattern),
                    Some(format!("pattern error: {}", err)),
                )
            })?;
            if path.is_file() {
                resolved.push(path);
            }
        }
        if resolved.len() == before {
            return Err(CliError::new(
                format!("no files match pattern '{}'", pattern),
                Some("check the path or quote the pattern".to_string()),
            ));
        }
    }
    Ok(resolved)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
