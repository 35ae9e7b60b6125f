// Block kernels: zero detection and per-block XOR.
//
// Both engines spend nearly all their time in these two functions, so they
// work on machine words, not bytes. Buffers handed in are whole blocks
// (short final reads are zero-padded by the callers before comparison).

const WORD: usize = size_of::<u64>();

/// Returns true iff every byte of `buf` is zero.
///
/// Scans `u64`-sized words and short-circuits on the first nonzero one;
/// the non-word-aligned tail (odd block sizes) is checked bytewise.
#[inline]
pub fn is_zero(buf: &[u8]) -> bool {
    let mut words = buf.chunks_exact(WORD);
    for w in &mut words {
        if u64::from_ne_bytes(w.try_into().unwrap()) != 0 {
            return false;
        }
    }
    words.remainder().iter().all(|&b| b == 0)
}

/// XORs `a` and `b` word-wise into `out`, returning true iff any output
/// word is nonzero. Single pass: the nonzero test is folded into the XOR,
/// so callers get the "may this block be a hole" answer for free.
///
/// All three slices must have the same length.
#[inline]
pub fn xor_into(a: &[u8], b: &[u8], out: &mut [u8]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());

    let mut nonzero = 0u64;
    let n = a.len() / WORD * WORD;
    for i in (0..n).step_by(WORD) {
        let wa = u64::from_ne_bytes(a[i..i + WORD].try_into().unwrap());
        let wb = u64::from_ne_bytes(b[i..i + WORD].try_into().unwrap());
        let w = wa ^ wb;
        nonzero |= w;
        out[i..i + WORD].copy_from_slice(&w.to_ne_bytes());
    }
    for i in n..a.len() {
        let x = a[i] ^ b[i];
        nonzero |= u64::from(x);
        out[i] = x;
    }
    nonzero != 0
}
