//! Uploader Driver: per-package archive-then-upload, meta file uploads, and
//! the checksum catalogue, run as a single sequential pass with no
//! concurrent packer/uploader pipeline.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    archiver::Archiver,
    bundle::{hex, BundleContents},
    config::UploadConfig,
    error::ArcError,
    package::package,
    store::{HeadResult, ObjectStore},
    wrapper::FilePayload,
};

const MD5_CHUNK: usize = 1024 * 1024;

/// The uniform capability an upload body needs beyond `Read`: a way back to
/// the start for the MD5 pass and the transmission pass, and a known length
/// for `Content-Length`. `File` and `Archiver` both satisfy this already;
/// this trait just names the capability the driver depends on.
pub trait UploadBody: Read {
    fn rewind(&mut self) -> io::Result<()>;
    fn content_length(&mut self) -> io::Result<u64>;
}

impl UploadBody for File {
    fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn content_length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl UploadBody for Archiver {
    fn rewind(&mut self) -> io::Result<()> {
        Archiver::seek(self, 0);
        Ok(())
    }

    fn content_length(&mut self) -> io::Result<u64> {
        Ok(Archiver::length(self))
    }
}

fn md5_digest(body: &mut dyn UploadBody) -> io::Result<md5::Digest> {
    body.rewind()?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; MD5_CHUNK];
    loop {
        let n = body.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(ctx.compute())
}

/// Strips the leading and trailing character of a quoted entity tag for
/// comparison against a bare MD5 hex digest.
fn unquote_etag(etag: &str) -> &str {
    let len = etag.len();
    if len >= 2 {
        &etag[1..len - 1]
    } else {
        etag
    }
}

fn open_catalogue(cfg: &UploadConfig) -> Result<File, ArcError> {
    std::fs::create_dir_all(&cfg.output_dir)?;
    let path = cfg.output_dir.join("checksums.txt");
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

struct Driver<'a, S: ObjectStore> {
    store: &'a S,
    cfg: &'a UploadConfig,
    catalogue: Option<File>,
}

impl<'a, S: ObjectStore> Driver<'a, S> {
    /// Uploads `body` to `bucket/remote_key`, skipping it if the store
    /// already holds an object whose etag matches its MD5, and appending the
    /// digest to the catalogue unless `record` is false (used for the
    /// catalogue file's own upload, to avoid self-reference).
    fn upload_body(&mut self, body: &mut dyn UploadBody, remote_key: &str, storage_class: &str, record: bool) -> Result<(), ArcError> {
        let digest = md5_digest(body)?;
        let hex_digest = format!("{digest:x}");

        match self.store.head_object(&self.cfg.bucket, remote_key)? {
            HeadResult::Found { etag } => {
                if unquote_etag(&etag) == hex_digest {
                    log::info!("Already uploaded {remote_key}, skipping");
                    return Ok(());
                }
                log::warn!("Remote etag for {remote_key} does not match local MD5, re-uploading");
            }
            HeadResult::NotFound => {}
        }

        if !self.cfg.for_real {
            log::info!("Dry run: would upload {remote_key}");
            return Ok(());
        }

        body.rewind()?;
        let content_length = body.content_length()?;
        log::info!("Uploading {remote_key} ({content_length} bytes)");

        self.store
            .put_object(&self.cfg.bucket, remote_key, body, storage_class, &hex_digest)
            .map_err(|e| ArcError::UploadFailed {
                key: remote_key.to_string(),
                source: Box::new(e),
            })?;

        if record {
            if let Some(catalogue) = self.catalogue.as_mut() {
                writeln!(catalogue, "{hex_digest} {remote_key}")?;
            }
        }

        Ok(())
    }

    fn upload_meta_files(&mut self, meta_files: &[std::path::PathBuf]) -> Result<(), ArcError> {
        log::info!("Uploading {} meta file(s)", meta_files.len());
        for relpath in meta_files {
            let local = self.cfg.bundle.join(relpath);
            let remote_key = format!("{}/{}", self.cfg.name, relpath.display());
            let mut file = File::open(&local)?;
            self.upload_body(&mut file, &remote_key, &self.cfg.storage_class, true)?;
        }
        Ok(())
    }

    /// Uploads each package in ascending id order, returning `true` if `stop`
    /// was observed set between two packages (in which case the caller must
    /// not proceed to the catalogue upload).
    fn upload_packages(&mut self, bands: &[u64], stop: Option<&AtomicBool>) -> Result<bool, ArcError> {
        let packages = package(bands, self.cfg.package_width);
        log::info!("Uploading {} package(s)", packages.len());

        for pkg in &packages {
            let pkg_name = pkg.name(self.cfg.package_width);
            let remote_key = format!("{}/bands/{}.arc", self.cfg.name, pkg_name);
            log::info!("Packing package {pkg_name}");

            let mut archiver = Archiver::new(self.cfg.compression, self.cfg.cache_chunks);
            let bands_dir = self.cfg.bundle.join("bands");
            for &band in &pkg.bands {
                let band_path = bands_dir.join(hex(band));
                let payload = FilePayload::open(&band_path)?;
                archiver.add_file(&hex(band), Box::new(payload))?;
            }

            self.upload_body(&mut archiver, &remote_key, &self.cfg.storage_class, true)?;

            if let Some(stop) = stop {
                if stop.load(Ordering::Relaxed) {
                    log::info!("Stopping...");
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    fn upload_catalogue(&mut self) -> Result<(), ArcError> {
        if let Some(catalogue) = self.catalogue.as_mut() {
            catalogue.flush()?;
        }

        let remote_key = format!("{}/checksums.txt", self.cfg.name);
        let path = self.cfg.output_dir.join("checksums.txt");
        log::info!("Uploading checksum file -> {remote_key}");
        let mut file = File::open(&path)?;
        // Standard storage class for the catalogue, regardless of the
        // configured archival class, and not recorded in itself.
        self.upload_body(&mut file, &remote_key, "STANDARD", false)
    }
}

/// Runs the full driver sequence: meta files, then packages in ascending
/// order, then the checksum catalogue. `stop` lets a caller request an early
/// stop between package uploads; if it fires, the driver returns immediately
/// without uploading the catalogue.
pub fn upload<S: ObjectStore>(
    store: &S,
    cfg: &UploadConfig,
    contents: &BundleContents,
    stop: Option<&AtomicBool>,
) -> Result<(), ArcError> {
    let mut driver = Driver {
        store,
        cfg,
        catalogue: Some(open_catalogue(cfg)?),
    };

    driver.upload_meta_files(&contents.meta_files)?;
    let stopped = driver.upload_packages(&contents.bands, stop)?;
    if stopped {
        return Ok(());
    }
    driver.upload_catalogue()?;

    Ok(())
}
