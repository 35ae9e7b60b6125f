// Streaming SHA-256 digest accumulator.
//
// A backend carries at most one of these; every byte it successfully reads
// or writes is folded in, in transfer order. Finalizing is one-shot: the
// report consumes the accumulator.

use sha2::{Digest, Sha256};

/// Running digest over everything a backend transfers.
pub struct DigestAccumulator {
    hasher: Sha256,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Folds transferred bytes in, append-only.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalizes and returns the lowercase-hex fingerprint.
    pub fn finalize_hex(self) -> String {
        let out = self.hasher.finalize();
        let mut hex = String::with_capacity(out.len() * 2);
        for b in out {
            hex.push_str(&format!("{b:02x}"));
        }
        hex
    }

    /// Prints `<hex> <label> <filename>` to the diagnostic stream.
    ///
    /// Labels follow the original tools: `IN1 IN2 OUT ODX` for the diff
    /// tool, `IN ` / `OUT` for sparsify.
    pub fn report(self, label: &str, filename: &str) {
        eprintln!("{} {} {}", self.finalize_hex(), label, filename);
    }
}

impl Default for DigestAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_one_shot_hash() {
        let data = b"the quick brown fox";
        let mut acc = DigestAccumulator::new();
        // Feed in uneven pieces, as block-sized transfers would.
        acc.update(&data[..7]);
        acc.update(&data[7..]);

        let mut h = Sha256::new();
        h.update(data);
        let expect: Vec<String> = h.finalize().iter().map(|b| format!("{b:02x}")).collect();

        assert_eq!(acc.finalize_hex(), expect.concat());
    }

    #[test]
    fn empty_input_digest() {
        // SHA-256 of the empty string.
        assert_eq!(
            DigestAccumulator::new().finalize_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
