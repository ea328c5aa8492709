//! The streaming archive writer (`Archiver`): assembles an ordered field list
//! -- header fields plus four fields per added file -- and exposes
//! `length`/`seek`/`read` without ever materialising the whole archive.

use std::io::{self, Read};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    error::ArcError,
    wrapper::{BytesPayload, Compression, Payload, PayloadSource},
};

pub const MAGIC: &[u8; 4] = b"arcf";
pub const FLAG_GZIP: u32 = 0x01;
pub const FLAG_LZ4: u32 = 0x02;
const HEADER_PADDING_LEN: usize = 28;

/// One entry in the writer's ordered field list: a known length paired with
/// either an in-memory byte slice or a boxed payload adapter. The length is
/// resolved exactly once, when the field is added -- mirroring the Python
/// `Archive._add_field`, which stores `_get_length(content)` as a plain int
/// rather than re-querying the wrapper's `__len__` on every traversal.
enum Field {
    Bytes(Vec<u8>),
    Source { len: u64, source: Box<dyn PayloadSource> },
}

impl Field {
    fn len(&self) -> u64 {
        match self {
            Field::Bytes(b) => b.len() as u64,
            Field::Source { len, .. } => *len,
        }
    }
}

/// Streaming writer for the `arc` container format.
///
/// Construction fixes the compression mode for every file added afterwards;
/// mixing compressed and uncompressed files in one archive is not supported,
/// matching the one-flags-word-per-archive header.
pub struct Archiver {
    fields: Vec<Field>,
    flags: u32,
    compression: Compression,
    retain_cache: bool,
    field_idx: usize,
    field_pos: u64,
}

impl Archiver {
    pub fn new(compression: Compression, retain_cache: bool) -> Self {
        let flags = match compression {
            Compression::None => 0,
            Compression::Gzip => FLAG_GZIP,
            Compression::Lz4 => FLAG_LZ4,
        };

        let mut archiver = Self {
            fields: Vec::new(),
            flags,
            compression,
            retain_cache,
            field_idx: 0,
            field_pos: 0,
        };
        archiver.fields.push(Field::Bytes(MAGIC.to_vec()));
        let mut flags_bytes = Vec::with_capacity(4);
        flags_bytes.write_u32::<LittleEndian>(flags).expect("write to Vec never fails");
        archiver.fields.push(Field::Bytes(flags_bytes));
        archiver.fields.push(Field::Bytes(vec![0u8; HEADER_PADDING_LEN]));
        archiver
    }

    /// Adds a file whose content is already in memory.
    pub fn add_file_bytes(&mut self, name: &str, content: Vec<u8>) -> Result<(), ArcError> {
        self.add_file(name, Box::new(BytesPayload::new(content)))
    }

    /// Adds a file backed by any [`PayloadSource`] (typically a
    /// [`crate::wrapper::FilePayload`]). `content_len` is resolved eagerly,
    /// which for a compressed entry means the payload is fully compressed
    /// during this call (or at least `length()`-computed).
    pub fn add_file(&mut self, name: &str, content: Box<dyn PayloadSource>) -> Result<(), ArcError> {
        let mut name_len_bytes = Vec::with_capacity(4);
        name_len_bytes
            .write_u32::<LittleEndian>(name.len() as u32)
            .expect("write to Vec never fails");
        self.fields.push(Field::Bytes(name_len_bytes));
        self.fields.push(Field::Bytes(name.as_bytes().to_vec()));

        let mut payload = Payload::new(content, self.compression, self.retain_cache);
        let content_len = payload.length()?;

        let mut content_len_bytes = Vec::with_capacity(8);
        content_len_bytes
            .write_u64::<LittleEndian>(content_len)
            .expect("write to Vec never fails");
        self.fields.push(Field::Bytes(content_len_bytes));
        self.fields.push(Field::Source {
            len: content_len,
            source: Box::new(payload),
        });

        Ok(())
    }

    /// Total archive length, known without reading any payload byte (beyond
    /// whatever compression already ran during `add_file`).
    pub fn length(&self) -> u64 {
        self.fields.iter().map(Field::len).sum()
    }

    /// Absolute seek into the archive byte stream.
    pub fn seek(&mut self, pos: u64) {
        self.field_idx = 0;
        self.field_pos = pos;

        loop {
            if self.field_idx >= self.fields.len() {
                self.field_pos = 0;
                return;
            }
            let field_len = self.fields[self.field_idx].len();
            if self.field_pos < field_len {
                return;
            }
            self.field_pos -= field_len;
            self.field_idx += 1;
        }
    }

    /// Reads up to `size` bytes from the current cursor. A read never spans
    /// more than one field; an empty result means end-of-archive.
    pub fn read(&mut self, size: usize) -> io::Result<Vec<u8>> {
        if self.field_idx >= self.fields.len() {
            return Ok(Vec::new());
        }

        let field = &mut self.fields[self.field_idx];
        let field_len = field.len();
        let remaining = field_len - self.field_pos;
        let to_read = remaining.min(size as u64) as usize;

        let result = match field {
            Field::Bytes(b) => {
                let start = self.field_pos as usize;
                b[start..start + to_read].to_vec()
            }
            Field::Source { source, .. } => {
                source.seek(self.field_pos)?;
                let mut buf = vec![0u8; to_read];
                let n = source.read(&mut buf)?;
                debug_assert_eq!(n, to_read, "payload source delivered fewer bytes than its reported length");
                buf.truncate(n);
                buf
            }
        };

        self.field_pos += result.len() as u64;
        if self.field_pos == field_len {
            self.field_idx += 1;
            self.field_pos = 0;
        }

        Ok(result)
    }

    /// Reads the remainder of the archive into one buffer. Intended for
    /// tests and small archives; production upload paths should drive
    /// `read`/the `Read` impl in bounded chunks instead.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
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

impl Read for Archiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = Archiver::read(self, buf.len())?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_archive_is_the_bare_header() {
        let mut a = Archiver::new(Compression::None, false);
        assert_eq!(a.length(), 36);
        let out = a.read_all().unwrap();
        let mut expected = b"arcf".to_vec();
        expected.extend_from_slice(&[0u8; 32]);
        assert_eq!(out, expected);
    }

    #[test]
    fn one_file_no_compression() {
        let mut a = Archiver::new(Compression::None, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        let out = a.read_all().unwrap();

        let mut expected = b"arcf".to_vec();
        expected.extend_from_slice(&[0u8; 32]);
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(b"test");
        expected.extend_from_slice(&11u64.to_le_bytes());
        expected.extend_from_slice(b"testcontent");

        assert_eq!(out, expected);
        assert_eq!(out.len(), 58);
    }

    #[test]
    fn two_files_no_compression() {
        let mut a = Archiver::new(Compression::None, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        a.add_file_bytes("wow", b"suchgreatstuff".to_vec()).unwrap();
        let out = a.read_all().unwrap();

        let mut expected = b"arcf".to_vec();
        expected.extend_from_slice(&[0u8; 32]);
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(b"test");
        expected.extend_from_slice(&11u64.to_le_bytes());
        expected.extend_from_slice(b"testcontent");
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"wow");
        expected.extend_from_slice(&14u64.to_le_bytes());
        expected.extend_from_slice(b"suchgreatstuff");

        assert_eq!(out, expected);
    }

    #[test]
    fn seek_into_the_middle() {
        let mut a = Archiver::new(Compression::None, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        a.add_file_bytes("wow", b"suchgreatstuff".to_vec()).unwrap();

        // 4 (magic) + 32 (flags+padding) + 4 (name_len) + 4 ("test") + 8
        // (content_len) + 4 bytes into "testcontent" lands right after "test".
        a.seek(4 + 32 + 4 + 4 + 8 + 4);
        let out = a.read_all().unwrap();

        let mut expected = b"content".to_vec();
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"wow");
        expected.extend_from_slice(&14u64.to_le_bytes());
        expected.extend_from_slice(b"suchgreatstuff");

        assert_eq!(out, expected);
    }

    #[test]
    fn seek_past_end_yields_empty_read() {
        let mut a = Archiver::new(Compression::None, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        a.add_file_bytes("wow", b"suchgreatstuff".to_vec()).unwrap();

        a.seek(100_000);
        let out = a.read_all().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn gzip_one_file() {
        let mut a = Archiver::new(Compression::Gzip, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        let out = a.read_all().unwrap();

        assert_eq!(&out[0..4], b"arcf");
        assert_eq!(&out[4..8], &FLAG_GZIP.to_le_bytes());
        assert_eq!(&out[8..36], &[0u8; 28]);
        assert_eq!(&out[36..40], &4u32.to_le_bytes());
        assert_eq!(&out[40..44], b"test");

        let content_len = u64::from_le_bytes(out[44..52].try_into().unwrap());
        let payload = &out[52..52 + content_len as usize];
        assert_eq!(&payload[0..4], &[0x1f, 0x8b, 0x08, 0x00]);
        assert_eq!(&payload[4..8], &[0, 0, 0, 0]);

        let mut decoder = flate2::read::GzDecoder::new(payload);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, b"testcontent");
    }

    #[test]
    fn lz4_one_file() {
        let mut a = Archiver::new(Compression::Lz4, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
        let out = a.read_all().unwrap();

        assert_eq!(&out[4..8], &FLAG_LZ4.to_le_bytes());
        let content_len = u64::from_le_bytes(out[44..52].try_into().unwrap());
        let payload = &out[52..52 + content_len as usize];
        assert_eq!(&payload[0..4], &[0x04, 0x22, 0x4d, 0x18]);

        let mut decoder = lz4_flex::frame::FrameDecoder::new(payload);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, b"testcontent");
    }

    #[test]
    fn chunked_reads_match_full_read() {
        let build = || {
            let mut a = Archiver::new(Compression::None, false);
            a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();
            a.add_file_bytes("wow", b"suchgreatstuff".to_vec()).unwrap();
            a
        };

        let mut whole = build();
        let full = whole.read_all().unwrap();

        let mut chunked = build();
        let mut pieces = Vec::new();
        loop {
            let chunk = chunked.read(3).unwrap();
            if chunk.is_empty() {
                break;
            }
            pieces.extend_from_slice(&chunk);
        }

        assert_eq!(full, pieces);
    }

    #[test]
    fn reread_after_seek_zero_is_byte_identical() {
        let mut a = Archiver::new(Compression::Gzip, false);
        a.add_file_bytes("test", b"testcontent".to_vec()).unwrap();

        let first = a.read_all().unwrap();
        a.seek(0);
        let second = a.read_all().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_length_content_is_valid() {
        let mut a = Archiver::new(Compression::None, false);
        a.add_file_bytes("empty", Vec::new()).unwrap();
        let out = a.read_all().unwrap();

        let mut expected = b"arcf".to_vec();
        expected.extend_from_slice(&[0u8; 32]);
        expected.extend_from_slice(&5u32.to_le_bytes());
        expected.extend_from_slice(b"empty");
        expected.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(out, expected);
    }
}
