//! Decoding scanner frame data into packed 8-bit rasters.
//!
//! Scanners deliver lines that may be padded, with 1, 8 or 16 bits per
//! sample. Everything downstream works on [`AcquiredImage`], one byte per
//! sample and no padding.

use crate::traits::{AcquiredImage, ColorModel, Result, ScanError};

/// Scale of the 16.16 fixed-point numbers scanners use for real options.
const FIXED_SCALE: f64 = 65536.0;

/// Layout of one frame as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Pixels per line.
    pub pixels_per_line: u32,
    /// Bytes per line, including padding.
    pub bytes_per_line: usize,
    /// Bits per sample: 1, 8 or 16.
    pub depth: u8,
    /// Samples per pixel.
    pub color: ColorModel,
}

/// Fixed-point word to real.
#[must_use]
pub fn fixed_to_f64(word: i32) -> f64 {
    f64::from(word) / FIXED_SCALE
}

/// Real to fixed-point word, `None` when it does not fit.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f64_to_fixed(value: f64) -> Option<i32> {
    let scaled = (value * FIXED_SCALE).round();
    (scaled.is_finite() && scaled >= f64::from(i32::MIN) && scaled <= f64::from(i32::MAX))
        .then_some(scaled as i32)
}

/// Decode raw frame bytes into a packed raster.
///
/// A trailing partial line is dropped. In 1-bit data a set bit is black.
pub fn decode(layout: FrameLayout, data: &[u8]) -> Result<AcquiredImage> {
    if layout.bytes_per_line == 0 {
        return Err(ScanError::AcquisitionFailed(
            "device reported zero bytes per line".to_owned(),
        ));
    }
    let samples = layout.pixels_per_line as usize * layout.color.channels();
    let lines = data.len() / layout.bytes_per_line;

    let mut raster = Vec::with_capacity(samples * lines);
    for line in data.chunks_exact(layout.bytes_per_line) {
        let short_line = || {
            ScanError::AcquisitionFailed(format!(
                "line of {} bytes cannot hold {samples} samples at depth {}",
                line.len(),
                layout.depth
            ))
        };
        match layout.depth {
            8 => raster.extend_from_slice(line.get(..samples).ok_or_else(short_line)?),
            16 => {
                let line = line.get(..samples * 2).ok_or_else(short_line)?;
                raster.extend(line.chunks_exact(2).map(high_byte));
            }
            1 => {
                if line.len() * 8 < samples {
                    return Err(short_line());
                }
                raster.extend((0..samples).map(|i| {
                    let byte = line.get(i / 8).copied().unwrap_or_default();
                    if byte & (0x80 >> (i % 8)) == 0 {
                        u8::MAX
                    } else {
                        0
                    }
                }));
            }
            depth => {
                return Err(ScanError::AcquisitionFailed(format!(
                    "unsupported sample depth {depth}"
                )))
            }
        }
    }

    let height = u32::try_from(lines)
        .map_err(|_| ScanError::AcquisitionFailed(format!("{lines} lines is too many")))?;
    AcquiredImage::new(layout.pixels_per_line, height, layout.color, raster)
}

/// Most significant byte of a native-endian 16-bit sample.
fn high_byte(pair: &[u8]) -> u8 {
    <[u8; 2]>::try_from(pair).map_or(0, |bytes| u16::from_ne_bytes(bytes).to_be_bytes()[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(pixels_per_line: u32, bytes_per_line: usize, depth: u8, color: ColorModel) -> FrameLayout {
        FrameLayout {
            pixels_per_line,
            bytes_per_line,
            depth,
            color,
        }
    }

    #[test]
    fn test_fixed_point_conversion() {
        assert!((fixed_to_f64(65536) - 1.0).abs() < f64::EPSILON);
        assert!((fixed_to_f64(-32768) + 0.5).abs() < f64::EPSILON);
        assert_eq!(f64_to_fixed(215.9), Some(14_149_222));
        assert_eq!(f64_to_fixed(1e10), None);
        assert_eq!(f64_to_fixed(f64::NAN), None);
    }

    #[test]
    fn test_gray_lines_drop_padding() {
        let data = [1, 2, 3, 0xEE, 4, 5, 6, 0xEE];
        let image = decode(layout(3, 4, 8, ColorModel::Gray), &data).expect("decode");

        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgb_lines() {
        let data = [10, 20, 30, 40, 50, 60];
        let image = decode(layout(2, 6, 8, ColorModel::Rgb), &data).expect("decode");

        assert_eq!(image.pixel(1, 0), Some(&[40u8, 50, 60][..]));
    }

    #[test]
    fn test_sixteen_bit_samples_keep_high_byte() {
        let data: Vec<u8> = [0x1234u16, 0xFF00]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        let image = decode(layout(2, 4, 16, ColorModel::Gray), &data).expect("decode");

        assert_eq!(image.data, vec![0x12, 0xFF]);
    }

    #[test]
    fn test_lineart_set_bit_is_black() {
        let data = [0b1010_0000];
        let image = decode(layout(3, 1, 1, ColorModel::Gray), &data).expect("decode");

        assert_eq!(image.data, vec![0, 255, 0]);
    }

    #[test]
    fn test_trailing_partial_line_dropped() {
        let data = [1, 2, 3];
        let image = decode(layout(2, 2, 8, ColorModel::Gray), &data).expect("decode");

        assert_eq!(image.height, 1);
        assert_eq!(image.data, vec![1, 2]);
    }

    #[test]
    fn test_bad_layouts_are_errors() {
        assert!(matches!(
            decode(layout(2, 2, 4, ColorModel::Gray), &[0, 0]),
            Err(ScanError::AcquisitionFailed(_))
        ));
        assert!(matches!(
            decode(layout(4, 2, 8, ColorModel::Gray), &[0, 0]),
            Err(ScanError::AcquisitionFailed(_))
        ));
        assert!(matches!(
            decode(layout(1, 0, 8, ColorModel::Gray), &[]),
            Err(ScanError::AcquisitionFailed(_))
        ));
    }
}
