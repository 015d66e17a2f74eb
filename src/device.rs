//! SANE backend implementation using the sane-scan crate.

use std::ffi::{CStr, CString};

use sane_scan::{
    DeviceHandle, DeviceOption, DeviceOptionValue, Frame, OptionCapability, OptionConstraint,
    Sane,
};
use tracing::debug;

use crate::raster::{self, FrameLayout};
use crate::traits::{
    AcquiredImage, ColorModel, Constraint, DeviceInfo, OptionDescriptor, Result, ScanError,
    ScannerBackend, ScannerDevice, Unit, Value, ValueType,
};

/// Bytes requested per read from the device.
const READ_CHUNK: usize = 64 * 1024;

/// Size of a single SANE word; larger numeric options are vectors.
const WORD_SIZE: u32 = 4;

/// Process-wide SANE library handle.
#[derive(Default)]
pub struct SaneBackend {
    sane: Option<Sane>,
}

impl SaneBackend {
    /// An uninitialized backend; [`AccessContext::init`](crate::AccessContext::init)
    /// brings it up.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn library(&self) -> Result<&Sane> {
        self.sane
            .as_ref()
            .ok_or_else(|| ScanError::Device("SANE is not initialized".to_owned()))
    }
}

impl ScannerBackend for SaneBackend {
    type Device = SaneDevice;

    fn initialize(&mut self) -> Result<()> {
        let sane = Sane::init_1_0()
            .map_err(|err| ScanError::Device(format!("failed to initialize SANE: {err}")))?;
        self.sane = Some(sane);
        Ok(())
    }

    fn shutdown(&mut self) {
        // Dropping the library handle calls sane_exit.
        self.sane = None;
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self
            .library()?
            .get_devices()
            .map_err(|err| ScanError::EnumerationFailed(err.to_string()))?;

        Ok(devices
            .iter()
            .map(|device| DeviceInfo {
                name: lossy(&device.name),
                vendor: lossy(&device.vendor),
                model: lossy(&device.model),
                class: lossy(&device.type_),
            })
            .collect())
    }

    fn open(&self, name: &str) -> Result<SaneDevice> {
        self.library()?;
        let device = sane_scan::Device {
            name: CString::new(name)
                .map_err(|err| ScanError::DeviceOpenFailed(format!("{name}: {err}")))?,
            vendor: CString::default(),
            model: CString::default(),
            type_: CString::default(),
        };
        let handle = device
            .open()
            .map_err(|err| ScanError::DeviceOpenFailed(format!("{name}: {err}")))?;

        Ok(SaneDevice {
            handle: Some(handle),
            info: DeviceInfo {
                name: name.to_owned(),
                ..DeviceInfo::default()
            },
        })
    }
}

/// An open SANE device.
pub struct SaneDevice {
    handle: Option<DeviceHandle>,
    info: DeviceInfo,
}

impl SaneDevice {
    fn handle(&self) -> Result<&DeviceHandle> {
        self.handle
            .as_ref()
            .ok_or_else(|| ScanError::Device("device is closed".to_owned()))
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle> {
        self.handle
            .as_mut()
            .ok_or_else(|| ScanError::Device("device is closed".to_owned()))
    }

    fn find(&self, name: &str) -> Result<DeviceOption> {
        self.handle()?
            .get_options()
            .map_err(|err| ScanError::Device(err.to_string()))?
            .into_iter()
            .find(|option| option.name.as_bytes() == name.as_bytes())
            .ok_or_else(|| ScanError::UnknownOption(name.to_owned()))
    }

    fn read_frame(&mut self) -> Result<(sane_scan::Parameters, Vec<u8>)> {
        let handle = self.handle_mut()?;
        let parameters = handle
            .start_scan()
            .map_err(|err| ScanError::AcquisitionFailed(err.to_string()))?;

        let mut data = Vec::new();
        let mut chunk = vec![0; READ_CHUNK];
        while let Some(read) = handle
            .read(&mut chunk)
            .map_err(|err| ScanError::AcquisitionFailed(err.to_string()))?
        {
            data.extend_from_slice(chunk.get(..read).unwrap_or_default());
        }
        Ok((parameters, data))
    }
}

impl ScannerDevice for SaneDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn options(&self) -> Result<Vec<OptionDescriptor>> {
        let options = self
            .handle()?
            .get_options()
            .map_err(|err| ScanError::Device(err.to_string()))?;

        let mut group = String::new();
        let mut descriptors = Vec::with_capacity(options.len());
        for option in &options {
            if option.type_ == sane_scan::ValueType::Group {
                group = lossy(&option.title);
            }
            descriptors.push(describe(option, &group));
        }
        Ok(descriptors)
    }

    fn get_option(&self, name: &str) -> Result<Value> {
        let option = self.find(name)?;
        if !value_type(option.type_).is_negotiable() {
            return Err(ScanError::Device(format!("option {name} carries no value")));
        }

        let value = self
            .handle()?
            .get_option(&option)
            .map_err(|err| ScanError::Device(err.to_string()))?;
        Ok(match value {
            DeviceOptionValue::Bool(v) => Value::Bool(v),
            DeviceOptionValue::Int(v) => Value::Int(i64::from(v)),
            DeviceOptionValue::Fixed(v) => Value::Real(raster::fixed_to_f64(v)),
            DeviceOptionValue::String(v) => Value::Str(lossy(&v)),
            DeviceOptionValue::Button | DeviceOptionValue::Group => {
                return Err(ScanError::Device(format!("option {name} carries no value")))
            }
        })
    }

    fn set_option(&mut self, name: &str, value: &Value) -> Result<()> {
        let option = self.find(name)?;
        let rejected = |reason: String| ScanError::OptionError {
            name: name.to_owned(),
            reason,
        };
        let handle = self.handle()?;

        let written = if *value == Value::Auto {
            handle.set_option_auto(&option)
        } else {
            handle.set_option(&option, encode_value(&option, value).map_err(rejected)?)
        };
        let info = written.map_err(|err| rejected(err.to_string()))?;

        debug!(option = name, %value, ?info, "option written");
        Ok(())
    }

    fn acquire(&mut self) -> Result<AcquiredImage> {
        let (parameters, data) = self.read_frame()?;
        if parameters.last_frame == 0 {
            return Err(ScanError::AcquisitionFailed(
                "multi-pass frames are not supported".to_owned(),
            ));
        }

        let color = match parameters.format {
            Frame::Gray => ColorModel::Gray,
            Frame::Rgb => ColorModel::Rgb,
            other => {
                return Err(ScanError::AcquisitionFailed(format!(
                    "unsupported frame format {other:?}"
                )))
            }
        };
        let geometry = |what: &str| {
            ScanError::AcquisitionFailed(format!("device reported invalid {what}"))
        };
        let layout = FrameLayout {
            pixels_per_line: u32::try_from(parameters.pixels_per_line)
                .map_err(|_| geometry("pixels per line"))?,
            bytes_per_line: usize::try_from(parameters.bytes_per_line)
                .map_err(|_| geometry("bytes per line"))?,
            depth: u8::try_from(parameters.depth).map_err(|_| geometry("depth"))?,
            color,
        };
        debug!(?layout, bytes = data.len(), "frame read");

        raster::decode(layout, &data)
    }

    fn close(&mut self) {
        // Dropping the handle cancels any scan and calls sane_close.
        self.handle = None;
    }
}

fn lossy(text: &CStr) -> String {
    text.to_string_lossy().into_owned()
}

fn value_type(value_type: sane_scan::ValueType) -> ValueType {
    match value_type {
        sane_scan::ValueType::Bool => ValueType::Bool,
        sane_scan::ValueType::Int => ValueType::Int,
        sane_scan::ValueType::Fixed => ValueType::Real,
        sane_scan::ValueType::String => ValueType::Str,
        sane_scan::ValueType::Button => ValueType::Button,
        sane_scan::ValueType::Group => ValueType::Group,
    }
}

const fn unit(unit: sane_scan::Unit) -> Unit {
    match unit {
        sane_scan::Unit::None => Unit::None,
        sane_scan::Unit::Pixel => Unit::Pixel,
        sane_scan::Unit::Bit => Unit::Bit,
        sane_scan::Unit::Mm => Unit::Millimetre,
        sane_scan::Unit::Dpi => Unit::Dpi,
        sane_scan::Unit::Percent => Unit::Percent,
        sane_scan::Unit::Microsecond => Unit::Microsecond,
    }
}

fn describe(option: &DeviceOption, group: &str) -> OptionDescriptor {
    let declared = value_type(option.type_);
    let number = |word: i32| {
        if declared == ValueType::Real {
            raster::fixed_to_f64(word)
        } else {
            f64::from(word)
        }
    };
    let word_value = |word: i32| {
        if declared == ValueType::Real {
            Value::Real(raster::fixed_to_f64(word))
        } else {
            Value::Int(i64::from(word))
        }
    };

    let constraint = match &option.constraint {
        OptionConstraint::None => Constraint::None,
        OptionConstraint::Range { range, quant } => Constraint::Range {
            min: number(range.start),
            max: number(range.end),
            quant: number(*quant),
        },
        OptionConstraint::WordList(words) => {
            Constraint::List(words.iter().copied().map(word_value).collect())
        }
        OptionConstraint::StringList(strings) => {
            Constraint::List(strings.iter().map(|s| Value::Str(lossy(s))).collect())
        }
    };

    let is_vector =
        matches!(declared, ValueType::Bool | ValueType::Int | ValueType::Real) && option.size > WORD_SIZE;

    OptionDescriptor {
        name: lossy(&option.name),
        title: lossy(&option.title),
        description: lossy(&option.desc),
        group: group.to_owned(),
        value_type: declared,
        unit: unit(option.unit),
        constraint,
        // Vector-valued options cannot be written one word at a time.
        settable: option.cap.contains(OptionCapability::SOFT_SELECT) && !is_vector,
        active: !option.cap.contains(OptionCapability::INACTIVE),
        automatic: option.cap.contains(OptionCapability::AUTOMATIC),
    }
}

fn encode_value(option: &DeviceOption, value: &Value) -> std::result::Result<DeviceOptionValue, String> {
    match (value_type(option.type_), value) {
        // SANE booleans are full words.
        (ValueType::Bool, Value::Bool(v)) => Ok(DeviceOptionValue::Int(i32::from(*v))),
        (ValueType::Int, Value::Int(v)) => i32::try_from(*v)
            .map(DeviceOptionValue::Int)
            .map_err(|_| format!("{v} does not fit in a device word")),
        (ValueType::Real, Value::Real(v)) => raster::f64_to_fixed(*v)
            .map(DeviceOptionValue::Fixed)
            .ok_or_else(|| format!("{v} does not fit in a fixed-point word")),
        (ValueType::Str, Value::Str(v)) => CString::new(v.as_str())
            .map(DeviceOptionValue::String)
            .map_err(|err| err.to_string()),
        (expected, found) => Err(format!("expected a {expected} value, got {found}")),
    }
}
