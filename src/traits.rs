//! Core traits and types for scanner device access.

use std::fmt;

/// Declared type of a device option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Real number.
    Real,
    /// Free-form or enumerated string.
    Str,
    /// Action trigger without a value.
    Button,
    /// Display grouping marker without a value.
    Group,
}

impl ValueType {
    /// Whether values of this type can be negotiated.
    ///
    /// Buttons and groups carry no value and are skipped during negotiation.
    #[must_use]
    pub const fn is_negotiable(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Real | Self::Str)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Real => "real",
            Self::Str => "string",
            Self::Button => "button",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

/// An option value, or the sentinel asking the device to choose.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value.
    Real(f64),
    /// String value.
    Str(String),
    /// Let the device decide.
    Auto,
}

impl Value {
    /// Type of an explicit value; `None` for [`Value::Auto`].
    #[must_use]
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Int(_) => Some(ValueType::Int),
            Self::Real(_) => Some(ValueType::Real),
            Self::Str(_) => Some(ValueType::Str),
            Self::Auto => None,
        }
    }

    /// Numeric view used by range checks.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse text as a value of the given type.
    ///
    /// Returns `None` when the text is not a literal of that type, or when the
    /// type carries no value.
    #[must_use]
    pub fn parse_as(value_type: ValueType, text: &str) -> Option<Self> {
        let text = text.trim();
        match value_type {
            ValueType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(Self::Bool(true)),
                "false" | "no" | "off" | "0" => Some(Self::Bool(false)),
                _ => None,
            },
            ValueType::Int => text.parse().ok().map(Self::Int),
            ValueType::Real => text.parse().ok().map(Self::Real),
            ValueType::Str => Some(Self::Str(text.to_owned())),
            ValueType::Button | ValueType::Group => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Auto => f.write_str("auto"),
        }
    }
}

/// Physical unit of an option. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    /// Unitless.
    #[default]
    None,
    /// Pixels.
    Pixel,
    /// Bits.
    Bit,
    /// Millimetres.
    Millimetre,
    /// Dots per inch.
    Dpi,
    /// Percent.
    Percent,
    /// Microseconds.
    Microsecond,
}

impl Unit {
    /// Human readable unit name, `None` for unitless options.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Pixel => Some("pixels"),
            Self::Bit => Some("bits"),
            Self::Millimetre => Some("millimetres"),
            Self::Dpi => Some("dots per inch"),
            Self::Percent => Some("percent"),
            Self::Microsecond => Some("microseconds"),
        }
    }
}

/// Legal-value predicate of an option.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Constraint {
    /// Any value of the declared type.
    #[default]
    None,
    /// Closed numeric range. A zero `quant` means no quantization.
    Range {
        /// Lower bound, inclusive.
        min: f64,
        /// Upper bound, inclusive.
        max: f64,
        /// Quantization step.
        quant: f64,
    },
    /// Finite set of legal values.
    List(Vec<Value>),
}

/// Self-description of one configurable device parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    /// Stable identifier, unique within a device.
    pub name: String,
    /// Short title.
    pub title: String,
    /// Help text.
    pub description: String,
    /// Display group.
    pub group: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Physical unit.
    pub unit: Unit,
    /// Legal values.
    pub constraint: Constraint,
    /// Whether the caller may write the option.
    pub settable: bool,
    /// Whether the option currently accepts a value.
    pub active: bool,
    /// Whether the option accepts [`Value::Auto`].
    pub automatic: bool,
}

impl OptionDescriptor {
    /// Create an active, settable option without constraint.
    #[must_use]
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_owned(),
            title: String::new(),
            description: String::new(),
            group: String::new(),
            value_type,
            unit: Unit::None,
            constraint: Constraint::None,
            settable: true,
            active: true,
            automatic: false,
        }
    }

    /// Set the display group.
    #[must_use]
    pub fn with_group(mut self, group: &str) -> Self {
        group.clone_into(&mut self.group);
        self
    }

    /// Set the help text.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        description.clone_into(&mut self.description);
        self
    }

    /// Set the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Constrain to a closed range with optional quantization.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64, quant: f64) -> Self {
        self.constraint = Constraint::Range { min, max, quant };
        self
    }

    /// Constrain to an enumerated set.
    #[must_use]
    pub fn with_list(mut self, values: Vec<Value>) -> Self {
        self.constraint = Constraint::List(values);
        self
    }

    /// Declare support for the automatic sentinel.
    #[must_use]
    pub fn automatic(mut self) -> Self {
        self.automatic = true;
        self
    }

    /// Mark the option read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    /// Mark the option inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Identity of a visible device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name used to open it.
    pub name: String,
    /// Vendor.
    pub vendor: String,
    /// Model.
    pub model: String,
    /// Device class (e.g. "flatbed scanner").
    pub class: String,
}

/// Color model of an acquired raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// 8-bit grayscale.
    Gray,
    /// 8-bit interleaved RGB.
    Rgb,
}

impl ColorModel {
    /// Bytes per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }
}

/// Raster produced by one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub color: ColorModel,
    /// Row-major pixel data without padding.
    pub data: Vec<u8>,
}

impl AcquiredImage {
    /// Build a raster, checking the buffer length against the geometry.
    pub fn new(width: u32, height: u32, color: ColorModel, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(color.channels()))
            .ok_or_else(|| {
                ScanError::AcquisitionFailed(format!("raster of {width}x{height} is too large"))
            })?;
        if data.len() != expected {
            return Err(ScanError::AcquisitionFailed(format!(
                "raster of {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            color,
            data,
        })
    }

    /// Pixel bytes at `(x, y)`, `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.color.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        self.data.get(offset..offset + channels)
    }
}

/// Error type for scanner operations.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The device-access layer failed to list devices.
    #[error("device enumeration failed: {0}")]
    EnumerationFailed(String),
    /// No device matches the identifier.
    #[error("no device named {0}")]
    NotFound(String),
    /// Failed to open a device by its exact name.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Negotiation referenced an option the device does not expose.
    #[error("no such option: {0}")]
    UnknownOption(String),
    /// The value does not have the option's declared type.
    #[error("option {name} expects a {expected} value, got {found}")]
    TypeMismatch {
        /// Option name.
        name: String,
        /// Declared type.
        expected: ValueType,
        /// What the caller supplied.
        found: String,
    },
    /// The device or its constraint rejected a value.
    #[error("can't set option {name}: {reason}")]
    OptionError {
        /// Option name.
        name: String,
        /// Device-reported reason.
        reason: String,
    },
    /// Failure reported by the device itself.
    #[error("{0}")]
    Device(String),
    /// The destination extension has no encoder.
    #[error("unrecognized extension: {0}")]
    UnsupportedFormat(String),
    /// Image transfer failed.
    #[error("acquisition failed: {0}")]
    AcquisitionFailed(String),
    /// The codec failed to encode the raster.
    #[error("encoding failed: {0}")]
    Encode(String),
    /// Invalid scan profile or command-line configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// One open device session.
pub trait ScannerDevice {
    /// Identity of the device.
    fn info(&self) -> &DeviceInfo;

    /// All option descriptors, in device order.
    fn options(&self) -> Result<Vec<OptionDescriptor>>;

    /// Read the current value of an option.
    fn get_option(&self, name: &str) -> Result<Value>;

    /// Write a value, or [`Value::Auto`], to an option.
    fn set_option(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Perform one acquisition with the current configuration.
    fn acquire(&mut self) -> Result<AcquiredImage>;

    /// Release the session. Called exactly once.
    fn close(&mut self);
}

/// Process-wide device-access library.
pub trait ScannerBackend {
    /// The session type returned by `open`.
    type Device: ScannerDevice;

    /// Prepare the library for use.
    fn initialize(&mut self) -> Result<()>;

    /// Tear the library down. Called exactly once after a successful `initialize`.
    fn shutdown(&mut self);

    /// List currently visible devices.
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device by its exact name.
    fn open(&self, name: &str) -> Result<Self::Device>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_as_bool() {
        assert_eq!(Value::parse_as(ValueType::Bool, "yes"), Some(Value::Bool(true)));
        assert_eq!(Value::parse_as(ValueType::Bool, "OFF"), Some(Value::Bool(false)));
        assert_eq!(Value::parse_as(ValueType::Bool, "maybe"), None);
    }

    #[test]
    fn test_parse_as_numbers() {
        assert_eq!(Value::parse_as(ValueType::Int, "600"), Some(Value::Int(600)));
        assert_eq!(Value::parse_as(ValueType::Int, "6.5"), None);
        assert_eq!(Value::parse_as(ValueType::Real, "6.5"), Some(Value::Real(6.5)));
        assert_eq!(Value::parse_as(ValueType::Button, "1"), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Real(100.0).to_string(), "100");
        assert_eq!(Value::Str("color".to_owned()).to_string(), "color");
        assert_eq!(Value::Auto.to_string(), "auto");
    }

    #[test]
    fn test_acquired_image_checks_length() {
        assert!(AcquiredImage::new(2, 2, ColorModel::Rgb, vec![0; 12]).is_ok());
        assert!(matches!(
            AcquiredImage::new(2, 2, ColorModel::Rgb, vec![0; 4]),
            Err(ScanError::AcquisitionFailed(_))
        ));
    }

    #[test]
    fn test_acquired_image_huge_geometry_is_rejected() {
        assert!(matches!(
            AcquiredImage::new(u32::MAX, u32::MAX, ColorModel::Rgb, Vec::new()),
            Err(ScanError::AcquisitionFailed(_))
        ));
    }

    #[test]
    fn test_acquired_image_pixel() {
        let image = AcquiredImage::new(2, 1, ColorModel::Gray, vec![10, 20]).expect("valid raster");
        assert_eq!(image.pixel(1, 0), Some(&[20u8][..]));
        assert_eq!(image.pixel(2, 0), None);
    }
}
