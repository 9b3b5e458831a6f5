//! Streaming compression helpers for archive payloads and vertical files.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::Result;
use crate::models::Compression;

/// xz preset used for archives and rewritten files.
const XZ_PRESET: u32 = 6;
const ZSTD_LEVEL: i32 = 9;

/// Incremental in-memory compressor.
pub enum StreamEncoder {
    Xz(XzEncoder<Vec<u8>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

impl StreamEncoder {
    pub fn new(compression: Compression) -> Result<Self> {
        Ok(match compression {
            Compression::Xz => Self::Xz(XzEncoder::new(Vec::new(), XZ_PRESET)),
            Compression::Zstd => {
                Self::Zstd(zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)?)
            }
        })
    }

    /// Flush the stream and return the compressed bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Xz(enc) => enc.finish()?,
            Self::Zstd(enc) => enc.finish()?,
        })
    }
}

impl Write for StreamEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Xz(enc) => enc.write(buf),
            Self::Zstd(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Xz(enc) => enc.flush(),
            Self::Zstd(enc) => enc.flush(),
        }
    }
}

/// Decompress a whole payload.
pub fn decode_all(payload: &[u8], compression: Compression) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match compression {
        Compression::Xz => {
            XzDecoder::new_multi_decoder(payload).read_to_end(&mut out)?;
        }
        Compression::Zstd => {
            out = zstd::decode_all(payload)?;
        }
    }
    Ok(out)
}

/// Compression implied by a file extension.
pub fn compression_of(path: &Path) -> Option<Compression> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xz") => Some(Compression::Xz),
        Some("zst") => Some(Compression::Zstd),
        _ => None,
    }
}

/// The path without a compression extension.
pub fn strip_compression(path: &Path) -> PathBuf {
    match compression_of(path) {
        Some(_) => path.with_extension(""),
        None => path.to_path_buf(),
    }
}

/// Append the extension for `compression` to `path`.
pub fn with_compression(path: &Path, compression: Compression) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(compression.extension());
    PathBuf::from(name)
}

/// Open a plain, `.xz` or `.zst` file for line reading.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    Ok(match compression_of(path) {
        Some(Compression::Xz) => Box::new(BufReader::new(XzDecoder::new_multi_decoder(file))),
        Some(Compression::Zstd) => Box::new(BufReader::new(zstd::stream::read::Decoder::new(
            file,
        )?)),
        None => Box::new(BufReader::new(file)),
    })
}

/// Buffered file writer, optionally compressing.
pub enum FileSink {
    Plain(BufWriter<File>),
    Xz(XzEncoder<BufWriter<File>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

impl FileSink {
    pub fn new(file: File, compression: Option<Compression>) -> Result<Self> {
        let writer = BufWriter::new(file);
        Ok(match compression {
            None => Self::Plain(writer),
            Some(Compression::Xz) => Self::Xz(XzEncoder::new(writer, XZ_PRESET)),
            Some(Compression::Zstd) => {
                Self::Zstd(zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)?)
            }
        })
    }

    /// Finish any compression stream and flush to disk.
    pub fn finish(self) -> Result<()> {
        let mut writer = match self {
            Self::Plain(w) => w,
            Self::Xz(enc) => enc.finish()?,
            Self::Zstd(enc) => enc.finish()?,
        };
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Xz(enc) => enc.write(buf),
            Self::Zstd(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Xz(enc) => enc.flush(),
            Self::Zstd(enc) => enc.flush(),
        }
    }
}
