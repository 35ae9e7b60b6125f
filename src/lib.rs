//! Xordiff: block-oriented XOR deltas between two versions of a file,
//! stored as sparse files, plus zero-block sparsification.
//!
//! The crate provides:
//! - A uniform I/O abstraction over plain files, standard streams, and
//!   gzip/bzip2 streams, with optional streaming digests (`backend`)
//! - The XOR-diff engine (`diff`)
//! - Three sparsification strategies (`sparsify`)
//! - Optional CLIs for both tools (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use xordiff::backend::{Access, Backend};
//! use xordiff::diff::{self, DiffOptions};
//!
//! let mut a = Backend::open("v1.img", Access::Read, 0, false).unwrap();
//! let mut b = Backend::open("v2.img", Access::Read, 0, false).unwrap();
//! let mut d = Backend::open("delta.img", Access::Write, 0o666, false).unwrap();
//!
//! let opts = DiffOptions { block_size: 4096, verbose: false };
//! diff::xor_diff(&mut a, &mut b, &mut d, None, &opts).unwrap();
//! d.close().unwrap();
//! ```

pub mod backend;
pub mod block;
pub mod diff;
pub mod digest;
pub mod error;
pub mod progress;
pub mod sparsify;

#[cfg(feature = "cli")]
pub mod cli;
