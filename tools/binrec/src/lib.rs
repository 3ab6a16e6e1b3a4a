pub mod config;
pub mod errors;
pub mod framing;
pub mod logging;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod types;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use config::{load_config, CliOverrides};
use errors::RecordStreamError;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use stream::RecordStream;
use types::Mode;

#[derive(Debug, Clone, Parser)]
#[command(name = "binrec")]
#[command(about = "Pack and inspect length-prefixed binary record files")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub event_log: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Write each input line as one record
    Pack {
        target: PathBuf,
        #[arg(long, default_value_t = false)]
        gzip: bool,
        #[arg(long, default_value_t = false)]
        append: bool,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        level: Option<u32>,
    },
    /// Print every record on its own line
    Dump {
        target: PathBuf,
        #[arg(long, default_value_t = false)]
        gzip: bool,
        #[arg(long, default_value_t = false)]
        hex: bool,
    },
    /// Print the record count and total payload size
    Count {
        target: PathBuf,
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

pub fn run() -> Result<i32, RecordStreamError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout().lock();
    run_with_io(&args, &mut input, &mut out)
}

pub fn run_with_io(
    args: &[OsString],
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<i32, RecordStreamError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                write!(out, "{error}").map_err(io_error)?;
                return Ok(0);
            }
            _ => return Err(RecordStreamError::Cli(error.to_string())),
        },
    };

    let level = match &cli.command {
        Command::Pack { level, .. } => *level,
        Command::Dump { .. } | Command::Count { .. } => None,
    };
    let cfg = load_config(&CliOverrides {
        config_path: cli.config.clone(),
        event_log: cli.event_log.clone(),
        compression_level: level,
    })?;
    let mut stream = RecordStream::from_config(&cfg);

    match cli.command {
        Command::Pack {
            target,
            gzip,
            append,
            input: input_path,
            ..
        } => {
            let mode = if append { Mode::Append } else { Mode::Write };
            let (records, bytes) = match input_path {
                Some(path) => {
                    let file = File::open(&path).map_err(|e| {
                        RecordStreamError::Io(format!("reading {}: {e}", path.display()))
                    })?;
                    let mut reader = BufReader::new(file);
                    pack_lines(&mut stream, &target, mode, gzip, &mut reader)?
                }
                None => pack_lines(&mut stream, &target, mode, gzip, input)?,
            };
            writeln!(out, "packed records={records} bytes={bytes}").map_err(io_error)?;
        }
        Command::Dump { target, gzip, hex } => {
            stream.scoped(&target, Mode::Read, gzip, |s| {
                for record in s.records() {
                    let record = record?;
                    let line = if hex {
                        to_hex(&record)
                    } else {
                        String::from_utf8_lossy(&record).into_owned()
                    };
                    writeln!(out, "{line}").map_err(io_error)?;
                }
                Ok(())
            })?;
        }
        Command::Count { target, gzip } => {
            let (records, bytes) = stream.scoped(&target, Mode::Read, gzip, |s| {
                let mut records = 0u64;
                let mut bytes = 0u64;
                for record in s.records() {
                    records += 1;
                    bytes += record?.len() as u64;
                }
                Ok((records, bytes))
            })?;
            writeln!(out, "records={records} bytes={bytes}").map_err(io_error)?;
        }
    }

    Ok(0)
}

fn pack_lines(
    stream: &mut RecordStream,
    target: &std::path::Path,
    mode: Mode,
    gzip: bool,
    input: &mut dyn BufRead,
) -> Result<(u64, u64), RecordStreamError> {
    stream.scoped(target, mode, gzip, |s| {
        let mut records = 0u64;
        let mut bytes = 0u64;
        let mut line = Vec::new();
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line).map_err(io_error)? == 0 {
                break;
            }
            strip_line_ending(&mut line);
            bytes += s.write_data(&line)? as u64;
            records += 1;
        }
        Ok((records, bytes))
    })
}

fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn io_error(error: std::io::Error) -> RecordStreamError {
    RecordStreamError::Io(error.to_string())
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    cmd.render_long_help().to_string()
}
