// XOR-diff engine.
//
// Walks two inputs block by block, writing the per-block XOR to a forward
// diff backend with all-zero blocks skipped (the diff comes out sparse),
// and optionally a backward stream holding the tail bytes unique to the
// longer input. The forward diff's logical length tracks the shorter
// input; the backward stream's tracks the longer one. Together with the
// shorter input the two streams reconstruct the other input exactly.

use log::debug;

use crate::backend::Backend;
use crate::block::{is_zero, xor_into};
use crate::error::Result;
use crate::progress::Progress;

/// XOR-diff parameters.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Block size in bytes. Also the hole granularity of the outputs.
    pub block_size: usize,
    /// Emit `.`/`X` progress markers to stderr.
    pub verbose: bool,
}

/// Diffs `a` against `b`, writing the forward diff to `fwd` and, when
/// given, the longer input's surplus to `bwd`.
///
/// Short reads only occur at end of stream; short final blocks are
/// zero-padded for computation, but write lengths are the actual byte
/// counts, so neither output is inflated. Both inputs are drained to EOF,
/// which keeps attached digests complete and lets the backward stream
/// capture the tail of whichever input turns out longer.
pub fn xor_diff(
    a: &mut Backend,
    b: &mut Backend,
    fwd: &mut Backend,
    mut bwd: Option<&mut Backend>,
    opts: &DiffOptions,
) -> Result<()> {
    let bs = opts.block_size;
    let mut buf_a = vec![0u8; bs];
    let mut buf_b = vec![0u8; bs];
    let mut xor = vec![0u8; bs];
    let mut tail = vec![0u8; bs];
    let zeros = vec![0u8; bs];

    let mut progress = Progress::new(opts.verbose);
    let mut off_short: u64 = 0; // forward diff offset, tracks the shorter input
    let mut off_long: u64 = 0; // backward stream offset, tracks the longer input

    loop {
        let n_a = a.read_full(&mut buf_a)?;
        let n_b = b.read_full(&mut buf_b)?;
        if n_a == 0 && n_b == 0 {
            break;
        }
        buf_a[n_a..].fill(0);
        buf_b[n_b..].fill(0);

        let common = n_a.min(n_b);
        let extent = n_a.max(n_b);

        if common > 0 {
            let nonzero = xor_into(&buf_a[..common], &buf_b[..common], &mut xor[..common]);
            fwd.write(&xor[..common], off_short, nonzero)?;
        }

        if let Some(bwd) = bwd.as_deref_mut() {
            if n_a == n_b {
                // Hole on a file backend; literal zeros keep a sequential
                // backend in step.
                bwd.write(&zeros[..extent], off_long, false)?;
            } else {
                let longer: &[u8] = if n_a > n_b { &buf_a } else { &buf_b };
                tail[..common].fill(0);
                tail[common..extent].copy_from_slice(&longer[common..extent]);
                let nonzero = !is_zero(&tail[..extent]);
                bwd.write(&tail[..extent], off_long, nonzero)?;
            }
        }

        off_short += common as u64;
        off_long += extent as u64;
        progress.tick(off_short);

        if n_a < bs && n_b < bs {
            break;
        }
    }
    progress.finish();

    debug!("xor diff complete: forward {off_short} bytes, extent {off_long} bytes");
    fwd.truncate(off_short)?;
    if let Some(bwd) = bwd.as_deref_mut() {
        bwd.truncate(off_long)?;
    }
    Ok(())
}
