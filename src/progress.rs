// Verbose progress markers: a "." every 16 MiB processed, an "X" plus a
// newline every 1 GiB. Purely advisory output on stderr.

use std::io::Write;

const DOT_EVERY: u64 = 16 << 20;
const X_EVERY: u64 = 1 << 30;

pub struct Progress {
    enabled: bool,
    next_dot: u64,
    next_x: u64,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next_dot: DOT_EVERY,
            next_x: X_EVERY,
        }
    }

    /// Emits markers for all thresholds passed by the cumulative `offset`.
    pub fn tick(&mut self, offset: u64) {
        if !self.enabled {
            return;
        }
        let mut err = std::io::stderr();
        while offset >= self.next_dot {
            self.next_dot += DOT_EVERY;
            if offset >= self.next_x {
                self.next_x += X_EVERY;
                let _ = writeln!(err, "X");
            } else {
                let _ = write!(err, ".");
            }
        }
    }

    /// Terminates the marker line.
    pub fn finish(&self) {
        if self.enabled {
            eprintln!();
        }
    }
}
