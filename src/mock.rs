//! Simulated scanner backend for testing without hardware.
//!
//! [`MockBackend::simulated`] exposes two ready-made devices. Tests build their
//! own devices with the builder methods and inject failures where needed.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::traits::{
    AcquiredImage, ColorModel, DeviceInfo, OptionDescriptor, Result, ScanError, ScannerBackend,
    ScannerDevice, Unit, Value, ValueType,
};
use crate::validation;

/// Shared counters that outlive a backend moved into a context.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    initialized: Rc<Cell<bool>>,
    shutdowns: Rc<Cell<usize>>,
    enumerations: Rc<Cell<usize>>,
}

impl Lifecycle {
    /// Whether the backend is currently initialized.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Number of completed shutdowns.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.get()
    }

    /// Number of device enumerations performed.
    #[must_use]
    pub fn enumerations(&self) -> usize {
        self.enumerations.get()
    }
}

/// Mock device-access library holding a fixed set of devices.
#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    enumeration_failure: Option<String>,
    open_failures: HashMap<String, String>,
    lifecycle: Lifecycle,
}

impl MockBackend {
    /// Create a backend with no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with a simulated flatbed and a simulated sheet-fed scanner.
    #[must_use]
    pub fn simulated() -> Self {
        Self::new()
            .with_device(
                MockDevice::flatbed("sim:flatbed")
                    .with_info("scanctl", "Virtual Flatbed", "flatbed scanner")
                    .with_pattern(TestPattern::ColorBars),
            )
            .with_device(
                MockDevice::flatbed("sim:sheetfed")
                    .with_info("scanctl", "Virtual Sheetfed", "sheetfed scanner")
                    .with_pattern(TestPattern::Gradient),
            )
    }

    /// Add a device.
    #[must_use]
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Make device enumeration fail.
    #[must_use]
    pub fn with_enumeration_failure(mut self, reason: &str) -> Self {
        self.enumeration_failure = Some(reason.to_owned());
        self
    }

    /// Make opening the named device fail.
    #[must_use]
    pub fn with_open_failure(mut self, name: &str, reason: &str) -> Self {
        self.open_failures
            .insert(name.to_owned(), reason.to_owned());
        self
    }

    /// Counters shared with this backend.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Number of device enumerations performed.
    #[must_use]
    pub fn enumerations(&self) -> usize {
        self.lifecycle.enumerations()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.lifecycle.initialized() {
            Ok(())
        } else {
            Err(ScanError::Device("device access not initialized".to_owned()))
        }
    }
}

impl ScannerBackend for MockBackend {
    type Device = MockDevice;

    fn initialize(&mut self) -> Result<()> {
        self.lifecycle.initialized.set(true);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.lifecycle.initialized.replace(false) {
            self.lifecycle
                .shutdowns
                .set(self.lifecycle.shutdowns.get() + 1);
        }
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.ensure_initialized()?;
        self.lifecycle
            .enumerations
            .set(self.lifecycle.enumerations.get() + 1);
        if let Some(reason) = &self.enumeration_failure {
            return Err(ScanError::EnumerationFailed(reason.clone()));
        }
        Ok(self.devices.iter().map(|d| d.info.clone()).collect())
    }

    fn open(&self, name: &str) -> Result<MockDevice> {
        self.ensure_initialized()?;
        if let Some(reason) = self.open_failures.get(name) {
            return Err(ScanError::DeviceOpenFailed(format!("{name}: {reason}")));
        }
        self.devices
            .iter()
            .find(|d| d.info.name == name)
            .cloned()
            .ok_or_else(|| ScanError::DeviceOpenFailed(format!("no device named {name}")))
    }
}

/// Test pattern types for simulated acquisitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestPattern {
    /// Eight vertical color bars.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Return this raster verbatim.
    Fixed(AcquiredImage),
}

#[derive(Debug, Clone)]
struct MockOption {
    descriptor: OptionDescriptor,
    value: Option<Value>,
    active_when: Option<(String, Value)>,
    rejection: Option<String>,
}

/// Mock scanner session.
#[derive(Debug, Clone)]
pub struct MockDevice {
    info: DeviceInfo,
    options: Vec<MockOption>,
    pattern: TestPattern,
    acquire_failure: Option<String>,
    writes: Vec<(String, Value)>,
    closes: Rc<Cell<usize>>,
}

impl MockDevice {
    /// Create a device with no options.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            info: DeviceInfo {
                name: name.to_owned(),
                vendor: "Mock".to_owned(),
                model: "Scanner".to_owned(),
                class: "virtual device".to_owned(),
            },
            options: Vec::new(),
            pattern: TestPattern::Gradient,
            acquire_failure: None,
            writes: Vec::new(),
            closes: Rc::default(),
        }
    }

    /// Create a device exposing a typical flatbed option set.
    #[must_use]
    pub fn flatbed(name: &str) -> Self {
        let text = |s: &str| Value::Str(s.to_owned());
        Self::new(name)
            .with_option(
                OptionDescriptor::new("mode", ValueType::Str)
                    .with_group("Scan Mode")
                    .with_description("Selects the scan mode.")
                    .with_list(vec![text("lineart"), text("gray"), text("color")]),
                text("gray"),
            )
            .with_option(
                OptionDescriptor::new("resolution", ValueType::Int)
                    .with_group("Scan Mode")
                    .with_description("Sets the resolution of the scanned image.")
                    .with_unit(Unit::Dpi)
                    .with_list([75, 150, 300, 600, 1200].map(Value::Int).to_vec()),
                Value::Int(300),
            )
            .with_option(
                OptionDescriptor::new("preview", ValueType::Bool)
                    .with_group("Scan Mode")
                    .with_description("Request a preview-quality scan."),
                Value::Bool(false),
            )
            .with_option(
                OptionDescriptor::new("threshold", ValueType::Int)
                    .with_group("Scan Mode")
                    .with_description("Select minimum brightness to get a white point.")
                    .with_unit(Unit::Percent)
                    .with_range(0.0, 100.0, 1.0),
                Value::Int(50),
            )
            .with_dependency("threshold", "mode", text("lineart"))
            .with_option(
                OptionDescriptor::new("brightness", ValueType::Int)
                    .with_group("Enhancement")
                    .with_description("Controls the brightness of the acquired image.")
                    .with_range(-100.0, 100.0, 1.0)
                    .automatic(),
                Value::Int(0),
            )
            .with_option(
                OptionDescriptor::new("gamma", ValueType::Real)
                    .with_group("Enhancement")
                    .with_description("Gamma correction applied to the image.")
                    .with_range(0.5, 3.0, 0.1),
                Value::Real(1.0),
            )
            .with_option(
                OptionDescriptor::new("exposure-time", ValueType::Int)
                    .with_group("Enhancement")
                    .with_description("Lamp exposure time per line.")
                    .with_unit(Unit::Microsecond)
                    .with_range(100.0, 100_000.0, 100.0)
                    .automatic(),
                Value::Auto,
            )
            .with_option(
                OptionDescriptor::new("tl-x", ValueType::Real)
                    .with_group("Geometry")
                    .with_description("Top-left x position of scan area.")
                    .with_unit(Unit::Millimetre)
                    .with_range(0.0, 215.9, 0.0),
                Value::Real(0.0),
            )
            .with_option(
                OptionDescriptor::new("br-x", ValueType::Real)
                    .with_group("Geometry")
                    .with_description("Bottom-right x position of scan area.")
                    .with_unit(Unit::Millimetre)
                    .with_range(0.0, 215.9, 0.0),
                Value::Real(215.9),
            )
            .with_valueless_option(
                OptionDescriptor::new("calibrate", ValueType::Button)
                    .with_group("Advanced")
                    .with_description("Run a calibration pass."),
            )
            .with_option(
                OptionDescriptor::new("scan-button", ValueType::Bool)
                    .with_group("Sensors")
                    .with_description("State of the front panel scan button.")
                    .read_only(),
                Value::Bool(false),
            )
    }

    /// Set vendor, model and class.
    #[must_use]
    pub fn with_info(mut self, vendor: &str, model: &str, class: &str) -> Self {
        vendor.clone_into(&mut self.info.vendor);
        model.clone_into(&mut self.info.model);
        class.clone_into(&mut self.info.class);
        self
    }

    /// Add an option with its initial value.
    #[must_use]
    pub fn with_option(self, descriptor: OptionDescriptor, value: Value) -> Self {
        self.push_option(descriptor, Some(value))
    }

    /// Add an option that carries no value, such as a button.
    #[must_use]
    pub fn with_valueless_option(self, descriptor: OptionDescriptor) -> Self {
        self.push_option(descriptor, None)
    }

    fn push_option(mut self, descriptor: OptionDescriptor, value: Option<Value>) -> Self {
        self.options.push(MockOption {
            descriptor,
            value,
            active_when: None,
            rejection: None,
        });
        self
    }

    /// Make `option` active only while `controller` holds `value`.
    #[must_use]
    pub fn with_dependency(mut self, option: &str, controller: &str, value: Value) -> Self {
        if let Some(entry) = self.option_mut(option) {
            entry.active_when = Some((controller.to_owned(), value));
        }
        self
    }

    /// Make every write to `option` fail with `reason`.
    #[must_use]
    pub fn with_rejection(mut self, option: &str, reason: &str) -> Self {
        if let Some(entry) = self.option_mut(option) {
            entry.rejection = Some(reason.to_owned());
        }
        self
    }

    /// Set the acquisition pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Make acquisition fail with `reason`.
    #[must_use]
    pub fn with_acquire_failure(mut self, reason: &str) -> Self {
        self.acquire_failure = Some(reason.to_owned());
        self
    }

    /// Successful writes, in order.
    #[must_use]
    pub fn writes(&self) -> &[(String, Value)] {
        &self.writes
    }

    /// Counter of `close` calls, shared with clones of this device.
    #[must_use]
    pub fn close_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.closes)
    }

    fn option(&self, name: &str) -> Option<&MockOption> {
        self.options.iter().find(|o| o.descriptor.name == name)
    }

    fn option_mut(&mut self, name: &str) -> Option<&mut MockOption> {
        self.options.iter_mut().find(|o| o.descriptor.name == name)
    }

    fn current(&self, name: &str) -> Option<&Value> {
        self.option(name).and_then(|o| o.value.as_ref())
    }

    fn is_active(&self, option: &MockOption) -> bool {
        option.descriptor.active
            && option
                .active_when
                .as_ref()
                .is_none_or(|(controller, value)| self.current(controller) == Some(value))
    }

    fn describe(&self, option: &MockOption) -> OptionDescriptor {
        let mut descriptor = option.descriptor.clone();
        descriptor.active = self.is_active(option);
        descriptor
    }

    fn geometry(&self) -> (u32, u32, ColorModel, bool) {
        let resolution = match self.current("resolution") {
            Some(Value::Int(dpi)) => u32::try_from(*dpi).unwrap_or(300),
            _ => 300,
        };
        let (color, lineart) = match self.current("mode") {
            Some(Value::Str(mode)) if mode == "color" => (ColorModel::Rgb, false),
            Some(Value::Str(mode)) if mode == "lineart" => (ColorModel::Gray, true),
            _ => (ColorModel::Gray, false),
        };
        // Letter-size page scaled down 50x.
        let width = (resolution * 85 / 500).max(8);
        let height = (resolution * 110 / 500).max(8);
        (width, height, color, lineart)
    }
}

impl ScannerDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn options(&self) -> Result<Vec<OptionDescriptor>> {
        Ok(self.options.iter().map(|o| self.describe(o)).collect())
    }

    fn get_option(&self, name: &str) -> Result<Value> {
        let option = self
            .option(name)
            .ok_or_else(|| ScanError::Device(format!("no such option {name}")))?;
        if !self.is_active(option) {
            return Err(ScanError::Device("option is inactive".to_owned()));
        }
        option
            .value
            .clone()
            .ok_or_else(|| ScanError::Device("option has no value".to_owned()))
    }

    fn set_option(&mut self, name: &str, value: &Value) -> Result<()> {
        let option = self
            .option(name)
            .ok_or_else(|| ScanError::Device(format!("no such option {name}")))?;
        if !option.descriptor.settable {
            return Err(ScanError::Device("option is read-only".to_owned()));
        }
        if !self.is_active(option) {
            return Err(ScanError::Device("option is inactive".to_owned()));
        }
        if let Some(reason) = &option.rejection {
            return Err(ScanError::Device(reason.clone()));
        }
        validation::check(&option.descriptor, value)
            .map_err(|violation| ScanError::Device(violation.to_string()))?;

        if let Some(entry) = self.option_mut(name) {
            entry.value = Some(value.clone());
        }
        debug!(device = %self.info.name, option = name, %value, "mock option written");
        self.writes.push((name.to_owned(), value.clone()));
        Ok(())
    }

    fn acquire(&mut self) -> Result<AcquiredImage> {
        if let Some(reason) = &self.acquire_failure {
            return Err(ScanError::Device(reason.clone()));
        }
        if let TestPattern::Fixed(image) = &self.pattern {
            return Ok(image.clone());
        }

        let (width, height, color, lineart) = self.geometry();
        let mut data = generate_test_frame(width, height, &self.pattern);
        if color == ColorModel::Gray {
            data = to_gray(&data, lineart);
        }
        AcquiredImage::new(width, height, color, data)
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}

/// Generate RGB frame data for a pattern.
fn generate_test_frame(width: u32, height: u32, pattern: &TestPattern) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for _ in 0..height {
        for x in 0..width {
            let rgb = match pattern {
                TestPattern::ColorBars => color_bar(x, width),
                TestPattern::Gradient | TestPattern::Fixed(_) => {
                    let level = gradient_level(x, width);
                    [level, level, level]
                }
            };
            data.extend_from_slice(&rgb);
        }
    }
    data
}

/// RGB value of the bar covering column `x`.
fn color_bar(x: u32, width: u32) -> [u8; 3] {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [[u8; 3]; 8] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
        [16, 16, 16],
    ];
    let bar_width = (width / 8).max(1);
    let index = (x / bar_width).min(7) as usize;
    BARS.get(index).copied().unwrap_or([0, 0, 0])
}

#[allow(clippy::cast_possible_truncation)]
fn gradient_level(x: u32, width: u32) -> u8 {
    ((x * 255) / width.max(1)) as u8
}

/// Collapse RGB to luma, optionally thresholded to black and white.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_gray(rgb: &[u8], lineart: bool) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let luma = match px {
                &[r, g, b] => {
                    let [r, g, b] = [r, g, b].map(f32::from);
                    0.114f32.mul_add(b, 0.587f32.mul_add(g, 0.299 * r)) as u8
                }
                _ => 0,
            };
            if lineart {
                if luma >= 128 {
                    255
                } else {
                    0
                }
            } else {
                luma
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_requires_init() {
        let backend = MockBackend::simulated();
        assert!(backend.devices().is_err());
        assert!(backend.open("sim:flatbed").is_err());
    }

    #[test]
    fn test_simulated_devices() {
        let mut backend = MockBackend::simulated();
        backend.initialize().expect("initialize");

        let devices = backend.devices().expect("devices");
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["sim:flatbed", "sim:sheetfed"]);
        assert_eq!(backend.enumerations(), 1);
    }

    #[test]
    fn test_dependency_toggles_activation() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        assert!(device.get_option("threshold").is_err());

        device
            .set_option("mode", &Value::Str("lineart".to_owned()))
            .expect("mode should be settable");

        assert_eq!(
            device.get_option("threshold").expect("threshold active"),
            Value::Int(50)
        );
    }

    #[test]
    fn test_set_option_rejects_illegal_value() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let err = device
            .set_option("resolution", &Value::Int(601))
            .expect_err("601 is not listed");
        assert!(matches!(err, ScanError::Device(_)));
        assert_eq!(device.get_option("resolution").expect("read"), Value::Int(300));
    }

    #[test]
    fn test_read_only_option_rejects_writes() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        assert!(device.set_option("scan-button", &Value::Bool(true)).is_err());
    }

    #[test]
    fn test_acquire_follows_configuration() {
        let mut device = MockDevice::flatbed("sim:flatbed").with_pattern(TestPattern::ColorBars);
        device
            .set_option("mode", &Value::Str("color".to_owned()))
            .expect("mode");
        device
            .set_option("resolution", &Value::Int(150))
            .expect("resolution");

        let image = device.acquire().expect("acquire");
        assert_eq!(image.color, ColorModel::Rgb);
        assert_eq!((image.width, image.height), (25, 33));
        assert_eq!(image.pixel(0, 0), Some(&[235u8, 235, 235][..]));
    }

    #[test]
    fn test_lineart_is_black_and_white() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        device
            .set_option("mode", &Value::Str("lineart".to_owned()))
            .expect("mode");

        let image = device.acquire().expect("acquire");
        assert_eq!(image.color, ColorModel::Gray);
        assert!(image.data.iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn test_fixed_pattern() {
        let raster =
            AcquiredImage::new(2, 2, ColorModel::Gray, vec![0, 64, 128, 255]).expect("raster");
        let mut device = MockDevice::new("m").with_pattern(TestPattern::Fixed(raster.clone()));
        assert_eq!(device.acquire().expect("acquire"), raster);
    }

    #[test]
    fn test_acquire_failure() {
        let mut device = MockDevice::new("m").with_acquire_failure("paper jam");
        assert!(matches!(device.acquire(), Err(ScanError::Device(_))));
    }
}
