//! Compression wrappers: the uniform `{ length, seek, read }` capability the
//! [`crate::archiver::Archiver`] needs over a raw byte slice, a file handle,
//! or a compressed view of either.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
};

use flate2::GzBuilder;

/// Chunk size used when feeding a payload source into the gzip encoder.
const GZIP_CHUNK: usize = 1024 * 1024;

/// The uniform capability every field payload in an [`Archiver`](crate::archiver::Archiver)
/// must provide: a cheap length, an absolute seek, and a read that fills the
/// buffer as far as the remaining length allows.
pub trait PayloadSource: Send {
    fn length(&mut self) -> io::Result<u64>;
    fn seek(&mut self, pos: u64) -> io::Result<()>;
    /// Fills `buf` with up to `buf.len()` bytes starting at the current
    /// cursor, returning the number of bytes written. Returns fewer than
    /// `buf.len()` only when fewer bytes remain.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// An in-memory payload: `add_file`'s `content` argument when it is plain
/// bytes rather than a file handle.
pub struct BytesPayload {
    data: Vec<u8>,
    pos: u64,
}

impl BytesPayload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl PayloadSource for BytesPayload {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

/// A file-handle payload: length comes from `stat`, seek/read delegate
/// straight to the file.
pub struct FilePayload {
    file: File,
    len: u64,
}

impl FilePayload {
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Self::from_file(File::open(path)?)
    }

    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl PayloadSource for FilePayload {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Which transform, if any, a [`Payload`] applies before handing bytes to the
/// [`Archiver`](crate::archiver::Archiver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Lz4,
}

enum Inner {
    /// Pass-through: no buffering, forwards straight to the wrapped source.
    /// This is what keeps the no-compression path from staging the whole
    /// archive in memory.
    None(Box<dyn PayloadSource>),
    Transform {
        source: Box<dyn PayloadSource>,
        kind: Compression,
        retain_cache: bool,
        cache: Option<Vec<u8>>,
        pos: u64,
    },
}

/// A compression wrapper over any [`PayloadSource`]. Constructed once per
/// `add_file` call and then treated as a `PayloadSource` itself by the
/// archiver's field list.
pub struct Payload(Inner);

impl Payload {
    pub fn new(source: Box<dyn PayloadSource>, compression: Compression, retain_cache: bool) -> Self {
        match compression {
            Compression::None => Self(Inner::None(source)),
            kind => Self(Inner::Transform {
                source,
                kind,
                retain_cache,
                cache: None,
                pos: 0,
            }),
        }
    }

    fn ensure_cache(source: &mut dyn PayloadSource, kind: Compression, cache: &mut Option<Vec<u8>>) -> io::Result<()> {
        if cache.is_some() {
            return Ok(());
        }
        let compressed = match kind {
            Compression::None => unreachable!("None never builds a cache"),
            Compression::Gzip => gzip_compress(source)?,
            Compression::Lz4 => lz4_compress(source)?,
        };
        *cache = Some(compressed);
        Ok(())
    }
}

impl PayloadSource for Payload {
    fn length(&mut self) -> io::Result<u64> {
        match &mut self.0 {
            Inner::None(source) => source.length(),
            Inner::Transform {
                source,
                kind,
                retain_cache,
                cache,
                ..
            } => {
                Self::ensure_cache(source.as_mut(), *kind, cache)?;
                let len = cache.as_ref().unwrap().len() as u64;
                if !*retain_cache {
                    *cache = None;
                }
                Ok(len)
            }
        }
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        match &mut self.0 {
            Inner::None(source) => source.seek(pos),
            Inner::Transform { pos: p, .. } => {
                *p = pos;
                Ok(())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            Inner::None(source) => source.read(buf),
            Inner::Transform {
                source,
                kind,
                retain_cache,
                cache,
                pos,
            } => {
                Self::ensure_cache(source.as_mut(), *kind, cache)?;
                let compressed = cache.as_ref().unwrap();
                let start = *pos as usize;
                if start >= compressed.len() {
                    if !*retain_cache {
                        *cache = None;
                    }
                    return Ok(0);
                }
                let n = buf.len().min(compressed.len() - start);
                buf[..n].copy_from_slice(&compressed[start..start + n]);
                *pos += n as u64;
                if *pos as usize == compressed.len() && !*retain_cache {
                    *cache = None;
                }
                Ok(n)
            }
        }
    }
}

fn gzip_compress(source: &mut dyn PayloadSource) -> io::Result<Vec<u8>> {
    source.seek(0)?;
    let mut output = Vec::new();
    {
        let mut encoder = GzBuilder::new()
            .mtime(0)
            .write(&mut output, flate2::Compression::best());
        let mut buf = vec![0u8; GZIP_CHUNK];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
        }
        encoder.finish()?;
    }
    Ok(output)
}

fn lz4_compress(source: &mut dyn PayloadSource) -> io::Result<Vec<u8>> {
    source.seek(0)?;
    let mut data = Vec::new();
    let mut buf = vec![0u8; GZIP_CHUNK];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    let frame_info = lz4_flex::frame::FrameInfo {
        content_size: None,
        content_checksum: true,
        ..Default::default()
    };

    let mut output = Vec::new();
    {
        let mut encoder = lz4_flex::frame::FrameEncoder::with_frame_info(frame_info, &mut output);
        encoder.write_all(&data)?;
        encoder
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    }
    Ok(output)
}
