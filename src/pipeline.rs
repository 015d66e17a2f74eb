//! End-to-end acquisition: configure, scan, encode, persist.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::catalog::{self, OptionCatalog};
use crate::context::AccessContext;
use crate::encoder::OutputFormat;
use crate::negotiator::{self, ConfigurationRequest};
use crate::traits::{Result, ScanError, ScannerBackend, ScannerDevice};

/// A destination file that is removed unless the scan completes.
struct OutputFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl OutputFile {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| ScanError::Io(std::io::Error::other("output already closed")))
    }

    /// Flush and close; a failure here means the file on disk may be incomplete.
    fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|err| ScanError::Io(err.into_error()))?;
            file.sync_all()?;
        }
        // Kept: the close succeeded.
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        drop(self.writer.take());
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove incomplete output");
        }
    }
}

/// Configure `device`, acquire one image and write it to `destination`.
///
/// The destination format is checked before anything else. When `diagnostics`
/// is given, the device's settable options are printed to it before
/// negotiation. On failure the destination file is removed.
///
/// # Errors
///
/// [`ScanError::UnsupportedFormat`], negotiation errors,
/// [`ScanError::AcquisitionFailed`], [`ScanError::Encode`] or
/// [`ScanError::Io`]. Nothing is retried.
pub fn acquire<D: ScannerDevice + ?Sized>(
    device: &mut D,
    request: &ConfigurationRequest,
    destination: &Path,
    diagnostics: Option<&mut dyn Write>,
) -> Result<()> {
    let format = OutputFormat::from_path(destination)?;
    let mut output = OutputFile::create(destination)?;

    if let Some(out) = diagnostics {
        let catalog = OptionCatalog::read(&*device)?;
        catalog::write_catalog(&*device, &catalog, out)?;
    }

    negotiator::apply(device, request)?;

    let image = device.acquire().map_err(|err| match err {
        ScanError::AcquisitionFailed(_) => err,
        ScanError::Device(reason) => ScanError::AcquisitionFailed(reason),
        other => ScanError::AcquisitionFailed(other.to_string()),
    })?;
    info!(
        device = %device.info().name,
        width = image.width,
        height = image.height,
        color = ?image.color,
        "image acquired"
    );

    format.encode(output.writer()?, &image)?;
    output.finish()?;

    info!(path = %destination.display(), %format, "image written");
    Ok(())
}

/// Resolve `identifier`, run [`acquire`] on it and close the device.
///
/// An unsupported destination fails before any device is opened.
pub fn scan<B: ScannerBackend>(
    context: &AccessContext<B>,
    identifier: &str,
    request: &ConfigurationRequest,
    destination: &Path,
    diagnostics: Option<&mut dyn Write>,
) -> Result<()> {
    OutputFormat::from_path(destination)?;

    let mut session = context.resolve(identifier)?;
    let result = acquire(&mut *session, request, destination, diagnostics);
    session.close();
    result
}

/// Scan every visible device, one after another.
///
/// With more than one device, each output name gets a `-<n>` suffix before
/// the extension. Stops at the first failing device. Returns the files written.
pub fn scan_all<B: ScannerBackend>(
    context: &AccessContext<B>,
    request: &ConfigurationRequest,
    destination: &Path,
    mut diagnostics: Option<&mut dyn Write>,
) -> Result<Vec<PathBuf>> {
    OutputFormat::from_path(destination)?;

    let devices = context.devices()?;
    if devices.is_empty() {
        info!("no available devices");
        return Ok(Vec::new());
    }

    let mut written = Vec::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        info!(
            device = %device.name,
            vendor = %device.vendor,
            model = %device.model,
            class = %device.class,
            "scanning device"
        );
        let path = if devices.len() > 1 {
            numbered(destination, index + 1)
        } else {
            destination.to_path_buf()
        };
        let out = diagnostics.as_mut().map(|out| &mut **out as &mut dyn Write);
        scan(context, &device.name, request, &path, out)?;
        written.push(path);
    }
    Ok(written)
}

/// `dir/scan.jpg` with `n = 2` becomes `dir/scan-2.jpg`.
fn numbered(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}
