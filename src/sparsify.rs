// Zero-block sparsification: three mutually exclusive strategies.
//
// - `copy`: rewrite through backends, skipping all-zero blocks. Safe to
//   interrupt; the destination is simply incomplete.
// - `destructive`: in-place shrink that reuses the source's tail as
//   working space. Walks blocks top-down, salvaging nonzero blocks into a
//   separate output and truncating the source after each one. An
//   interruption after the first truncate loses data; construction of a
//   `DataLossToken` is the caller's acknowledgement.
// - `punch`: deallocate all-zero ranges with
//   fallocate(PUNCH_HOLE | KEEP_SIZE). Logical content and length never
//   change, so this one is interrupt-safe and idempotent.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use log::{debug, warn};

use crate::backend::Backend;
use crate::block::is_zero;
use crate::error::{Error, Result};
use crate::progress::Progress;

/// Sparsify parameters.
#[derive(Debug, Clone)]
pub struct SparsifyOptions {
    /// Block size in bytes; also the hole granularity.
    pub block_size: usize,
    /// Emit `.`/`X` progress markers to stderr.
    pub verbose: bool,
}

/// Proof that the caller accepts unrecoverable data loss on interruption.
///
/// The destructive strategy cannot run without one; the CLI mints it only
/// after the `-fff` triple flag.
pub struct DataLossToken(());

impl DataLossToken {
    pub fn accept_data_loss() -> Self {
        Self(())
    }
}

fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copy strategy: stream `fin` to `fout`, skipping all-zero blocks, then
/// truncate `fout` to the true logical length. Works over any backend
/// variant on either side and never touches the source.
pub fn copy(fin: &mut Backend, fout: &mut Backend, opts: &SparsifyOptions) -> Result<()> {
    let bs = opts.block_size;
    let mut buf = vec![0u8; bs];
    let mut progress = Progress::new(opts.verbose);
    let mut offset: u64 = 0;

    loop {
        let n = fin.read_full(&mut buf)?;
        if n == 0 {
            break;
        }
        buf[n..].fill(0);
        let nonzero = !is_zero(&buf);
        fout.write(&buf[..n], offset, nonzero)?;
        offset += n as u64;
        progress.tick(offset);
        if n < bs {
            break;
        }
    }
    progress.finish();
    fout.truncate(offset)?;
    Ok(())
}

/// Destructive in-place strategy.
///
/// Walks from the highest block-aligned offset down to zero: reads each
/// block from `src`, writes it to `out` at the same offset if nonzero,
/// then truncates `src` to the current offset. The descending order is the
/// safety property: everything above the cut is already in `out` or was
/// zero. `file_size` is the source's length before the first truncate.
pub fn destructive(
    src: &File,
    out: &File,
    file_size: u64,
    opts: &SparsifyOptions,
    _token: DataLossToken,
) -> Result<()> {
    let bs = opts.block_size as u64;
    let mut buf = vec![0u8; opts.block_size];
    let mut progress = Progress::new(opts.verbose);

    let top = file_size.div_ceil(bs) * bs;
    let mut offset = top;
    loop {
        let n = read_full_at(src, &mut buf, offset).map_err(Error::Read)?;
        buf[n..].fill(0);
        if n > 0 && !is_zero(&buf) {
            out.write_all_at(&buf[..n], offset).map_err(Error::Write)?;
        }
        // Clamp the first cut to the real length: truncating to the
        // aligned top would extend an unaligned file and inflate the
        // output's final block with padding.
        src.set_len(offset.min(file_size)).map_err(Error::Truncate)?;
        progress.tick(top - offset);
        if offset == 0 {
            break;
        }
        offset -= bs;
    }
    progress.finish();
    debug!("destructive sparsify done: salvaged into output, source emptied");
    Ok(())
}

/// Hole-punch strategy: walk upward and deallocate every all-zero block
/// in place. The file's length and logical content are unchanged at every
/// point. A failing deallocation aborts the walk so the caller knows the
/// filesystem did not get sparsified.
pub fn punch(file: &File, opts: &SparsifyOptions) -> Result<()> {
    let bs = opts.block_size;
    let mut buf = vec![0u8; bs];
    let mut progress = Progress::new(opts.verbose);
    let mut offset: u64 = 0;

    loop {
        let n = read_full_at(file, &mut buf, offset).map_err(Error::Read)?;
        if n == 0 {
            break;
        }
        buf[n..].fill(0);
        if is_zero(&buf) {
            punch_hole(file, offset, n as u64)?;
        }
        offset += n as u64;
        progress.tick(offset);
        if n < bs {
            break;
        }
    }
    progress.finish();
    Ok(())
}

#[cfg(target_os = "linux")]
fn punch_hole(file: &File, offset: u64, len: u64) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let rv = unsafe {
        libc::fallocate(
            file.as_raw_fd(),
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            len as libc::off_t,
        )
    };
    if rv < 0 {
        let e = io::Error::last_os_error();
        warn!("punch hole failed at offset {offset}: {e}");
        return Err(Error::Punch(e));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn punch_hole(_file: &File, offset: u64, _len: u64) -> Result<()> {
    warn!("hole punching not supported on this platform (offset {offset})");
    Err(Error::Punch(io::Error::new(
        io::ErrorKind::Unsupported,
        "fallocate(FALLOC_FL_PUNCH_HOLE) unavailable",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Access;
    use std::os::unix::fs::MetadataExt;

    const BS: usize = 512;

    fn opts() -> SparsifyOptions {
        SparsifyOptions {
            block_size: BS,
            verbose: false,
        }
    }

    fn copy_file(src: &[u8]) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let pin = dir.path().join("in");
        let pout = dir.path().join("out");
        std::fs::write(&pin, src).unwrap();

        let mut fin = Backend::open(pin.to_str().unwrap(), Access::Read, 0, false).unwrap();
        let mut fout = Backend::open(pout.to_str().unwrap(), Access::Write, 0o644, false).unwrap();
        copy(&mut fin, &mut fout, &opts()).unwrap();
        fin.close().unwrap();
        fout.close().unwrap();
        std::fs::read(&pout).unwrap()
    }

    #[test]
    fn copy_is_logically_identical() {
        let mut data = vec![0u8; 5 * BS + 99];
        data[BS..BS + 40].fill(0xCD); // one nonzero stretch amid zeros
        data[4 * BS] = 1;
        assert_eq!(copy_file(&data), data);
    }

    #[test]
    fn copy_preserves_trailing_zero_blocks_logically() {
        // File ends in zero blocks: the copy must keep the full length even
        // though the last writes were skipped.
        let mut data = vec![0u8; 4 * BS];
        data[10] = 0xEE;
        assert_eq!(copy_file(&data), data);
    }

    #[test]
    fn copy_empty_file() {
        assert_eq!(copy_file(b""), b"");
    }

    #[test]
    fn copy_all_zero_file_makes_no_data_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pin = dir.path().join("in");
        let pout = dir.path().join("out");
        let data = vec![0u8; 8 * BS];
        std::fs::write(&pin, &data).unwrap();

        let mut fin = Backend::open(pin.to_str().unwrap(), Access::Read, 0, false).unwrap();
        let mut fout = Backend::open(pout.to_str().unwrap(), Access::Write, 0o644, false).unwrap();
        copy(&mut fin, &mut fout, &opts()).unwrap();
        fin.close().unwrap();
        fout.close().unwrap();

        assert_eq!(std::fs::read(&pout).unwrap(), data);
        // Everything was skipped, so the output holds no physical blocks.
        let blocks = std::fs::metadata(&pout).unwrap().blocks();
        assert_eq!(blocks, 0, "all-zero copy should be entirely holes");
    }

    #[test]
    fn destructive_boundary_scenario() {
        // Four blocks; only block 2 (offset 2*BS) is nonzero. The source
        // must end up empty, the output must end exactly at block 2's end
        // with its bytes intact.
        let dir = tempfile::tempdir().unwrap();
        let psrc = dir.path().join("src");
        let pout = dir.path().join("out");

        let mut data = vec![0u8; 4 * BS];
        data[2 * BS..3 * BS].fill(0x77);
        std::fs::write(&psrc, &data).unwrap();

        let src = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&psrc)
            .unwrap();
        let out = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&pout)
            .unwrap();

        destructive(&src, &out, 4 * BS as u64, &opts(), DataLossToken::accept_data_loss())
            .unwrap();

        let got = std::fs::read(&pout).unwrap();
        assert_eq!(got.len(), 3 * BS, "output ends at block 2's end");
        assert!(got[..2 * BS].iter().all(|&b| b == 0));
        assert!(got[2 * BS..].iter().all(|&b| b == 0x77));
        // The source was progressively truncated away.
        assert_eq!(std::fs::metadata(&psrc).unwrap().len(), 0);
    }

    #[test]
    fn destructive_short_final_block() {
        let dir = tempfile::tempdir().unwrap();
        let psrc = dir.path().join("src");
        let pout = dir.path().join("out");

        let mut data = vec![0x42u8; BS + 33]; // short tail block, nonzero
        data[..BS].fill(0); // first block zero
        std::fs::write(&psrc, &data).unwrap();

        let src = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&psrc)
            .unwrap();
        let out = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&pout)
            .unwrap();

        destructive(
            &src,
            &out,
            data.len() as u64,
            &opts(),
            DataLossToken::accept_data_loss(),
        )
        .unwrap();

        let got = std::fs::read(&pout).unwrap();
        assert_eq!(got.len(), data.len());
        assert_eq!(got, data);
    }

    #[test]
    fn punch_preserves_content_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        let mut data = vec![0u8; 6 * BS];
        data[3 * BS + 5] = 0x99;
        std::fs::write(&path, &data).unwrap();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();

        match punch(&file, &opts()) {
            Ok(()) => {}
            Err(Error::Punch(e)) => {
                eprintln!("filesystem does not support hole punching, skipping: {e}");
                return;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), data.len() as u64);

        // Second run over the now-sparse file: same content, no errors.
        punch(&file, &opts()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }
}
