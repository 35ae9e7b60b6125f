// Uniform I/O over plain files, standard streams, and gzip/bzip2 streams.
//
// Every engine in this crate moves blocks exclusively through `Backend`,
// which dispatches {read, write, truncate, close} to the variant fixed at
// open time. The variant is chosen from the filename: a `.gz`/`.bz2`
// suffix selects the matching codec (with `-.gz`/`-.bz2` meaning the
// standard descriptor), a bare `-` probes whether the standard descriptor
// is a regular file, anything else is a plain path.
//
// A backend optionally carries a digest accumulator; every byte that
// passes its read or write path is folded in, including bytes a positioned
// write skips as a hole (the caller produced them, so they count).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::digest::DigestAccumulator;
use crate::error::{Error, Result};

/// Access mode requested at open time.
///
/// Writable backends are always created fresh: an existing target is an
/// open error, so nothing gets clobbered before the preconditions ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

enum Repr {
    File(File),
    StreamIn(io::Stdin),
    StreamOut(io::Stdout),
    GzIn(MultiGzDecoder<Box<dyn Read>>),
    GzOut(GzEncoder<Box<dyn Write>>),
    BzIn(MultiBzDecoder<Box<dyn Read>>),
    BzOut(BzEncoder<Box<dyn Write>>),
}

pub struct Backend {
    repr: Repr,
    digest: Option<DigestAccumulator>,
    name: String,
}

fn open_err(path: &str) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Open {
        path: path.to_string(),
        source,
    }
}

/// Duplicates the standard descriptor for `access` into an owned `File`.
fn dup_std(access: Access) -> io::Result<File> {
    let fd = match access {
        Access::Read => io::stdin().as_fd().try_clone_to_owned()?,
        Access::Write => io::stdout().as_fd().try_clone_to_owned()?,
    };
    Ok(File::from(fd))
}

fn create_new(path: &str, mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
}

impl Backend {
    /// Opens `name` and selects the variant from its suffix/shape.
    ///
    /// `mode` is the permission set for created files; `hash` attaches a
    /// digest accumulator (never attached implicitly).
    pub fn open(name: &str, access: Access, mode: u32, hash: bool) -> Result<Self> {
        let repr = if name.len() > 4 && name.ends_with(".bz2") {
            match access {
                Access::Read => {
                    let inner: Box<dyn Read> = if name == "-.bz2" {
                        Box::new(io::stdin())
                    } else {
                        Box::new(File::open(name).map_err(open_err(name))?)
                    };
                    Repr::BzIn(MultiBzDecoder::new(inner))
                }
                Access::Write => {
                    let inner: Box<dyn Write> = if name == "-.bz2" {
                        Box::new(io::stdout())
                    } else {
                        Box::new(create_new(name, mode).map_err(open_err(name))?)
                    };
                    Repr::BzOut(BzEncoder::new(inner, bzip2::Compression::default()))
                }
            }
        } else if name.len() > 3 && name.ends_with(".gz") {
            match access {
                Access::Read => {
                    let inner: Box<dyn Read> = if name == "-.gz" {
                        Box::new(io::stdin())
                    } else {
                        Box::new(File::open(name).map_err(open_err(name))?)
                    };
                    Repr::GzIn(MultiGzDecoder::new(inner))
                }
                Access::Write => {
                    let inner: Box<dyn Write> = if name == "-.gz" {
                        Box::new(io::stdout())
                    } else {
                        Box::new(create_new(name, mode).map_err(open_err(name))?)
                    };
                    Repr::GzOut(GzEncoder::new(inner, flate2::Compression::default()))
                }
            }
        } else if name == "-" {
            // The standard descriptor may be a shell redirection to a real
            // file; positioned I/O (and thus holes) works there.
            let file = dup_std(access).map_err(open_err(name))?;
            let meta = file.metadata().map_err(open_err(name))?;
            if meta.is_file() {
                Repr::File(file)
            } else {
                match access {
                    Access::Read => Repr::StreamIn(io::stdin()),
                    Access::Write => Repr::StreamOut(io::stdout()),
                }
            }
        } else {
            let file = match access {
                Access::Read => File::open(name).map_err(open_err(name))?,
                Access::Write => create_new(name, mode).map_err(open_err(name))?,
            };
            Repr::File(file)
        };

        Ok(Self {
            repr,
            digest: hash.then(DigestAccumulator::new),
            name: name.to_string(),
        })
    }

    /// Wraps an already-open plain file, as the in-place sparsify modes do.
    pub fn from_file(file: File, name: &str, hash: bool) -> Self {
        Self {
            repr: Repr::File(file),
            digest: hash.then(DigestAccumulator::new),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for the plain seekable variant.
    pub fn is_file(&self) -> bool {
        matches!(self.repr, Repr::File(_))
    }

    /// Preferred I/O block size of the underlying filesystem, when the
    /// backend is a plain file.
    pub fn block_size_hint(&self) -> Option<u64> {
        match &self.repr {
            Repr::File(f) => f.metadata().ok().map(|m| m.blksize()),
            _ => None,
        }
    }

    /// Pulls up to `buf.len()` bytes; successfully read bytes are folded
    /// into the digest.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match &mut self.repr {
            Repr::File(f) => f.read(buf),
            Repr::StreamIn(s) => s.read(buf),
            Repr::GzIn(r) => r.read(buf),
            Repr::BzIn(r) => r.read(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "backend opened write-only",
            )),
        }
        .map_err(Error::Read)?;
        if let Some(d) = &mut self.digest {
            d.update(&buf[..n]);
        }
        Ok(n)
    }

    /// Reads until `buf` is full or end of stream, so a short count means
    /// EOF even on pipes and codec streams.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Writes `buf` at `offset`.
    ///
    /// For the plain-file variant a `nonzero = false` write is skipped —
    /// the range stays a hole — but the call still reports the full count
    /// so the caller's offset bookkeeping is unaffected. Stream and codec
    /// variants are strictly sequential: `offset` and `nonzero` are
    /// ignored, zero blocks are written literally to keep the stream in
    /// sync. Either way the bytes are folded into the digest.
    pub fn write(&mut self, buf: &[u8], offset: u64, nonzero: bool) -> Result<usize> {
        match &mut self.repr {
            Repr::File(f) => {
                if nonzero {
                    f.write_all_at(buf, offset).map_err(Error::Write)?;
                }
            }
            Repr::StreamOut(s) => s.write_all(buf).map_err(Error::Write)?,
            Repr::GzOut(w) => w.write_all(buf).map_err(Error::Write)?,
            Repr::BzOut(w) => w.write_all(buf).map_err(Error::Write)?,
            _ => {
                return Err(Error::Write(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "backend opened read-only",
                )));
            }
        }
        if let Some(d) = &mut self.digest {
            d.update(buf);
        }
        Ok(buf.len())
    }

    /// Sets the logical end-of-file. Streams cannot change length, so this
    /// is a no-op for every variant but the plain file.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        match &self.repr {
            Repr::File(f) => f.set_len(len).map_err(Error::Truncate),
            _ => Ok(()),
        }
    }

    /// Releases the backend, flushing codec state, and hands back the
    /// digest accumulator for reporting.
    pub fn close(self) -> Result<Option<DigestAccumulator>> {
        match self.repr {
            Repr::GzOut(w) => {
                w.finish().map_err(Error::Write)?;
            }
            Repr::BzOut(w) => {
                w.finish().map_err(Error::Write)?;
            }
            Repr::StreamOut(mut s) => s.flush().map_err(Error::Write)?,
            _ => {}
        }
        Ok(self.digest)
    }
}
