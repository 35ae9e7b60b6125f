// CLIs for the two binaries: `xordiff` and `sparsify`.
//
// Thin glue around the engines: argument parsing, precondition checks
// (all before any destructive action), backend opening with fatal-on-error
// reporting, block size autodetection, and digest reporting.

use std::fs::OpenOptions;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;
use std::process;

use clap::{ArgAction, Parser};

use crate::backend::{Access, Backend};
use crate::diff::{self, DiffOptions};
use crate::error::Error;
use crate::sparsify::{self, DataLossToken, SparsifyOptions};

/// Fallback block size when the destination filesystem's preferred size
/// cannot be determined (non-file backends, stat failure).
const STD_BLOCK_SIZE: usize = 4096;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// xordiff
// ---------------------------------------------------------------------------

/// XOR diff between two versions of a file, stored as a sparse file.
#[derive(Parser, Debug)]
#[command(
    name = "xordiff",
    version,
    about = "Create an XOR diff between two versions of a file, stored sparse",
    arg_required_else_help = true
)]
struct DiffCli {
    /// Print progress markers to stderr.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Block size in bytes (default: destination filesystem block size).
    #[arg(short = 's', long = "bufsize", value_name = "N")]
    bufsize: Option<usize>,

    /// Hash input1 and report its digest.
    #[arg(short = '1')]
    hash_input1: bool,

    /// Hash input2 and report its digest.
    #[arg(short = '2')]
    hash_input2: bool,

    /// Hash the forward diff and report its digest.
    #[arg(short = '3')]
    hash_diff: bool,

    /// Hash the backward diff and report its digest.
    #[arg(short = '4')]
    hash_backward: bool,

    /// First input file (`-` for standard input, `.gz`/`.bz2` decoded).
    input1: String,

    /// Second input file.
    input2: String,

    /// Forward diff output (created; must not already exist).
    diff: String,

    /// Backward diff output for mismatched-length inputs.
    backward: Option<String>,
}

fn open_or_die(tool: &str, name: &str, access: Access, mode: u32, hash: bool) -> Backend {
    match Backend::open(name, access, mode, hash) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{tool}: {e}");
            process::exit(1);
        }
    }
}

/// Closes a backend, reporting its digest (if one was attached) with the
/// given role label. Returns a nonzero exit code on close failure.
fn close_and_report(tool: &str, backend: Backend, label: &str) -> i32 {
    let name = backend.name().to_string();
    match backend.close() {
        Ok(Some(digest)) => {
            digest.report(label, &name);
            0
        }
        Ok(None) => 0,
        Err(e) => {
            eprintln!("{tool}: {name}: {e}");
            1
        }
    }
}

fn cmd_xordiff(cli: DiffCli) -> i32 {
    if cli.bufsize == Some(0) {
        eprintln!("xordiff: block size must be positive");
        return 1;
    }

    let mut f1 = open_or_die("xordiff", &cli.input1, Access::Read, 0, cli.hash_input1);
    let mut f2 = open_or_die("xordiff", &cli.input2, Access::Read, 0, cli.hash_input2);
    let mut fout = open_or_die("xordiff", &cli.diff, Access::Write, 0o666, cli.hash_diff);

    let block_size = cli.bufsize.unwrap_or_else(|| {
        fout.block_size_hint()
            .map(|b| b as usize)
            .unwrap_or(STD_BLOCK_SIZE)
    });

    let mut fbi = cli
        .backward
        .as_deref()
        .map(|name| open_or_die("xordiff", name, Access::Write, 0o666, cli.hash_backward));

    let opts = DiffOptions {
        block_size,
        verbose: cli.verbose,
    };
    if let Err(e) = diff::xor_diff(&mut f1, &mut f2, &mut fout, fbi.as_mut(), &opts) {
        eprintln!("xordiff: {e}");
        return 1;
    }

    let mut rc = 0;
    rc |= close_and_report("xordiff", f1, "IN1");
    rc |= close_and_report("xordiff", f2, "IN2");
    rc |= close_and_report("xordiff", fout, "OUT");
    if let Some(fbi) = fbi {
        rc |= close_and_report("xordiff", fbi, "ODX");
    }
    rc
}

/// Handles a clap parse failure: usage errors exit 1 (not clap's default
/// 2), help/version output exits 0.
fn exit_on_parse_error(err: clap::Error) -> ! {
    let code = if err.use_stderr() { 1 } else { 0 };
    let _ = err.print();
    process::exit(code);
}

/// Entry point for the `xordiff` binary.
pub fn run_xordiff() -> ! {
    init_logging();
    let cli = match DiffCli::try_parse() {
        Ok(cli) => cli,
        Err(e) => exit_on_parse_error(e),
    };
    process::exit(cmd_xordiff(cli));
}

// ---------------------------------------------------------------------------
// sparsify
// ---------------------------------------------------------------------------

/// Reclaim unused space by not storing all-zero blocks.
#[derive(Parser, Debug)]
#[command(
    name = "sparsify",
    version,
    about = "Deallocate all-zero blocks in a file",
    arg_required_else_help = true
)]
struct SparsifyCli {
    /// Print progress markers to stderr.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Block size in bytes (default: target filesystem block size).
    #[arg(short = 's', long = "bufsize", value_name = "N")]
    bufsize: Option<usize>,

    /// Delete the source after a successful copy (two-file form only).
    #[arg(short = 'd', long = "delete")]
    delete: bool,

    /// Sparsify a single file by copying through a temp file and renaming.
    #[arg(short = 'c', long = "copy")]
    copy: bool,

    /// Authorize the destructive in-place strategy. Must be given three
    /// times (-fff): an interrupted run corrupts the file irrecoverably.
    #[arg(short = 'f', long = "force", action = ArgAction::Count)]
    force: u8,

    /// Hash the source and report its digest.
    #[arg(short = '1')]
    hash_source: bool,

    /// Hash the destination and report its digest.
    #[arg(short = '2')]
    hash_dest: bool,

    /// File to sparsify in place, or the copy source.
    file: String,

    /// Copy destination (selects the two-file copy form).
    dest: Option<String>,
}

/// Precondition checks; all run before anything is opened or mutated.
fn validate_sparsify(cli: &SparsifyCli) -> Result<(), String> {
    if cli.bufsize == Some(0) {
        return Err("block size must be positive".into());
    }
    if cli.force > 0 && cli.dest.is_some() {
        return Err("-f option is not for copy mode".into());
    }
    if cli.delete && cli.dest.is_none() {
        return Err("-d option is for copy mode".into());
    }
    if cli.force > 0 && cli.copy {
        return Err("-f and -c options are mutually exclusive".into());
    }
    if cli.force > 0 && cli.force < 3 {
        return Err(
            "-f option is very dangerous\n\
             incomplete executions result in non recoverable corruption of data\n\
             -f must be set three times (-fff)"
                .into(),
        );
    }
    Ok(())
}

fn cmd_sparsify(cli: SparsifyCli) -> i32 {
    if let Err(msg) = validate_sparsify(&cli) {
        eprintln!("sparsify: {msg}");
        return 1;
    }

    match &cli.dest {
        Some(dest) => sparsify_copy_form(&cli, dest),
        None => sparsify_single_file(&cli),
    }
}

/// Two-file form: copy `file` to `dest` through backends, skipping zero
/// blocks; optionally delete the source afterwards.
fn sparsify_copy_form(cli: &SparsifyCli, dest: &str) -> i32 {
    // Propagate the source's permission bits to the destination when the
    // source is a plain stat-able path.
    let mode = std::fs::metadata(&cli.file)
        .map(|m| m.mode() & 0o777)
        .unwrap_or(0o666);

    let mut fout = open_or_die("sparsify", dest, Access::Write, mode, cli.hash_dest);
    let block_size = cli.bufsize.unwrap_or_else(|| {
        fout.block_size_hint()
            .map(|b| b as usize)
            .unwrap_or(STD_BLOCK_SIZE)
    });
    let mut fin = open_or_die("sparsify", &cli.file, Access::Read, 0, cli.hash_source);

    let opts = SparsifyOptions {
        block_size,
        verbose: cli.verbose,
    };
    if let Err(e) = sparsify::copy(&mut fin, &mut fout, &opts) {
        eprintln!("sparsify: {e}");
        return 1;
    }

    if cli.delete {
        if let Err(e) = std::fs::remove_file(&cli.file) {
            eprintln!("sparsify: {}: {e}", cli.file);
            return 1;
        }
    }

    let mut rc = 0;
    rc |= close_and_report("sparsify", fin, "IN ");
    rc |= close_and_report("sparsify", fout, "OUT");
    rc
}

/// Single-file form: hole-punch in place by default, or rewrite through a
/// temp file in the same directory (`-c`, and the `-fff` destructive
/// strategy) followed by a rename over the original.
fn sparsify_single_file(cli: &SparsifyCli) -> i32 {
    let file = match OpenOptions::new().read(true).write(true).open(&cli.file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("sparsify: {}: {e}", cli.file);
            return 1;
        }
    };
    let meta = match file.metadata() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("sparsify: {}: {e}", cli.file);
            return 1;
        }
    };
    if !meta.is_file() {
        eprintln!("sparsify: {}", Error::NotRegular(cli.file.clone()));
        return 1;
    }

    let opts = SparsifyOptions {
        block_size: cli.bufsize.unwrap_or(meta.blksize() as usize),
        verbose: cli.verbose,
    };

    if !cli.copy && cli.force < 3 {
        // In-place hole punching: length and content never change.
        return match sparsify::punch(&file, &opts) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("sparsify: {e}");
                1
            }
        };
    }

    // Rewrite modes need a temp file next to the original.
    let path = Path::new(&cli.file);
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => {
            eprintln!("sparsify: {}: invalid file name", cli.file);
            return 1;
        }
    };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let tmp = dir.join(format!(".{}.sp{}", file_name, process::id()));
    let tmp_name = tmp.to_string_lossy().into_owned();

    let out_file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(meta.mode() & 0o777)
        .open(&tmp)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("sparsify: {tmp_name}: {e}");
            return 1;
        }
    };

    let mut rc = 0;
    if cli.copy {
        let mut fin = Backend::from_file(file, &cli.file, cli.hash_source);
        let mut fout = Backend::from_file(out_file, &cli.file, cli.hash_dest);
        if let Err(e) = sparsify::copy(&mut fin, &mut fout, &opts) {
            eprintln!("sparsify: {e}");
            let _ = std::fs::remove_file(&tmp);
            return 1;
        }
        rc |= close_and_report("sparsify", fin, "IN ");
        rc |= close_and_report("sparsify", fout, "OUT");
    } else {
        // -fff: the triple flag is the only place a DataLossToken is minted.
        let token = DataLossToken::accept_data_loss();
        if let Err(e) = sparsify::destructive(&file, &out_file, meta.len(), &opts, token) {
            eprintln!("sparsify: {e}");
            return 1;
        }
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        eprintln!(
            "sparsify: {}",
            Error::Rename {
                path: cli.file.clone(),
                source: e,
            }
        );
        return 1;
    }
    rc
}

/// Entry point for the `sparsify` binary.
pub fn run_sparsify() -> ! {
    init_logging();
    let cli = match SparsifyCli::try_parse() {
        Ok(cli) => cli,
        Err(e) => exit_on_parse_error(e),
    };
    process::exit(cmd_sparsify(cli));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
