//! Choosing and running an image encoder for a destination file.

use std::fmt;
use std::io::{Seek, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::traits::{AcquiredImage, ColorModel, Result, ScanError};

/// Container format of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// PNG.
    Png,
    /// JPEG at the codec's default quality.
    Jpeg,
    /// TIFF with the codec's default compression.
    Tiff,
}

impl OutputFormat {
    /// Select a format from the file-name extension, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ScanError::UnsupportedFormat`] for any other extension, or none.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(ScanError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Encode `image` into `writer`.
    pub fn encode<W: Write + Seek>(self, writer: &mut W, image: &AcquiredImage) -> Result<()> {
        let color = match image.color {
            ColorModel::Gray => ExtendedColorType::L8,
            ColorModel::Rgb => ExtendedColorType::Rgb8,
        };
        let (data, width, height) = (image.data.as_slice(), image.width, image.height);

        let encoded = match self {
            Self::Png => PngEncoder::new(writer).write_image(data, width, height, color),
            Self::Jpeg => JpegEncoder::new(writer).write_image(data, width, height, color),
            Self::Tiff => TiffEncoder::new(writer).write_image(data, width, height, color),
        };
        encoded.map_err(|err| ScanError::Encode(format!("{self}: {err}")))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Tiff => "TIFF",
        };
        f.write_str(name)
    }
}
