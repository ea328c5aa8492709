//! The archive reader (`Unarchiver`): parses the fixed header and yields
//! `(name, payload-view)` pairs with transparent per-traversal
//! decompression.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    archiver::{FLAG_GZIP, FLAG_LZ4, MAGIC},
    error::ArcError,
};

/// Lazy reader over one file record's payload. Caches the decompressed
/// buffer across `read` calls within a single traversal and releases it
/// once the cursor reaches the end, in place of the naive "decompress on
/// every `read`" behaviour.
struct PayloadView<'a, R> {
    file: &'a mut R,
    offset: u64,
    length: u64,
    flags: u32,
    pos: u64,
    decompressed: Option<Vec<u8>>,
}

impl<'a, R: Read + Seek> PayloadView<'a, R> {
    fn compressed_flag(&self) -> bool {
        self.flags & (FLAG_GZIP | FLAG_LZ4) != 0
    }

    fn ensure_decompressed(&mut self) -> Result<(), ArcError> {
        if self.decompressed.is_some() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.offset))?;
        let mut compressed = vec![0u8; self.length as usize];
        self.file.read_exact(&mut compressed)?;

        let decompressed = if self.flags & FLAG_GZIP != 0 {
            let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ArcError::DecompressionFailed(e.to_string()))?;
            out
        } else if self.flags & FLAG_LZ4 != 0 {
            let mut decoder = lz4_flex::frame::FrameDecoder::new(&compressed[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ArcError::DecompressionFailed(e.to_string()))?;
            out
        } else {
            unreachable!("ensure_decompressed is only called for compressed flags");
        };

        self.decompressed = Some(decompressed);
        Ok(())
    }

    fn release_if_exhausted(&mut self, new_pos: u64, total_len: u64) {
        if new_pos >= total_len {
            self.decompressed = None;
        }
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn read(&mut self, size: usize) -> Result<Vec<u8>, ArcError> {
        if self.compressed_flag() {
            self.ensure_decompressed()?;
            let buf = self.decompressed.as_ref().unwrap();
            let start = self.pos as usize;
            if start >= buf.len() {
                self.decompressed = None;
                return Ok(Vec::new());
            }
            let n = size.min(buf.len() - start);
            let result = buf[start..start + n].to_vec();
            self.pos += n as u64;
            self.release_if_exhausted(self.pos, buf.len() as u64);
            Ok(result)
        } else {
            if self.pos >= self.length {
                return Ok(Vec::new());
            }
            let n = (size as u64).min(self.length - self.pos) as usize;
            self.file.seek(SeekFrom::Start(self.offset + self.pos))?;
            let mut buf = vec![0u8; n];
            self.file.read_exact(&mut buf)?;
            self.pos += n as u64;
            Ok(buf)
        }
    }

    fn read_all(&mut self) -> Result<Vec<u8>, ArcError> {
        self.seek(0);
        let mut out = Vec::new();
        loop {
            let chunk = self.read(64 * 1024)?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// Parses an `arc` stream from any seekable byte source.
pub struct Unarchiver<R> {
    file: R,
}

impl<R: Read + Seek> Unarchiver<R> {
    pub fn new(file: R) -> Self {
        Self { file }
    }

    /// Parses the header and returns every `(name, payload-view)` pair in
    /// insertion order. Each view borrows the reader, so entries cannot
    /// outlive this call's borrow -- callers that need to read entries one
    /// at a time interleaved with other reads should use
    /// [`Unarchiver::for_each_entry`] instead.
    pub fn for_each_entry<F>(&mut self, mut f: F) -> Result<(), ArcError>
    where
        F: FnMut(&str, &mut dyn FnMut() -> Result<Vec<u8>, ArcError>) -> Result<(), ArcError>,
    {
        self.file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        read_exact_or_truncated(&mut self.file, &mut magic, 4)?;
        if &magic != MAGIC {
            return Err(ArcError::InvalidMagic);
        }

        let flags = self.file.read_u32::<LittleEndian>()?;

        let mut padding = [0u8; 28];
        read_exact_or_truncated(&mut self.file, &mut padding, 28)?;
        if padding != [0u8; 28] {
            return Err(ArcError::InvalidHeader);
        }

        loop {
            let mut name_len_bytes = [0u8; 4];
            let n = read_up_to(&mut self.file, &mut name_len_bytes)?;
            if n == 0 {
                break;
            }
            if n != 4 {
                return Err(ArcError::TruncatedRecord { expected: 4, got: n });
            }
            let name_len = u32::from_le_bytes(name_len_bytes) as usize;

            let mut name_bytes = vec![0u8; name_len];
            read_exact_or_truncated(&mut self.file, &mut name_bytes, name_len)?;
            let name = String::from_utf8(name_bytes).map_err(|_| ArcError::NameNotUtf8)?;

            let content_len = self.file.read_u64::<LittleEndian>()?;
            let offset = self.file.stream_position()?;

            let mut view = PayloadView {
                file: &mut self.file,
                offset,
                length: content_len,
                flags,
                pos: 0,
                decompressed: None,
            };
            let mut reader = move || view.read_all();
            f(&name, &mut reader)?;

            self.file.seek(SeekFrom::Start(offset + content_len))?;
        }

        Ok(())
    }

    /// Convenience wrapper that collects every entry's name and full content
    /// into memory. Intended for tests and small archives.
    pub fn read_all_entries(&mut self) -> Result<Vec<(String, Vec<u8>)>, ArcError> {
        let mut out = Vec::new();
        self.for_each_entry(|name, read| {
            out.push((name.to_string(), read()?));
            Ok(())
        })?;
        Ok(out)
    }
}

fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8], expected: usize) -> Result<(), ArcError> {
    let got = read_up_to(r, buf)?;
    if got != expected {
        return Err(ArcError::TruncatedRecord { expected, got });
    }
    Ok(())
}
