//! Applying a desired configuration to a device.
//!
//! Requests are applied strictly in the order given: a write can change which
//! options are active and what they accept, so the catalog is re-read before
//! every request. The first failure aborts the rest; earlier writes stay
//! written.

use tracing::{debug, warn};

use crate::catalog::OptionCatalog;
use crate::traits::{OptionDescriptor, Result, ScanError, ScannerDevice, Value};
use crate::validation::{self, Violation};

/// What the caller wants an option set to.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// A typed value; must match the option's declared type.
    Value(Value),
    /// Text coerced to the option's declared type when applied.
    Text(String),
    /// Let the device decide.
    Auto,
}

/// One entry of a [`ConfigurationRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRequest {
    /// Target option.
    pub name: String,
    /// Desired setting.
    pub setting: Setting,
}

impl OptionRequest {
    /// Create a request entry.
    #[must_use]
    pub fn new(name: &str, setting: Setting) -> Self {
        Self {
            name: name.to_owned(),
            setting,
        }
    }
}

/// Ordered sequence of option requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationRequest {
    entries: Vec<OptionRequest>,
}

impl ConfigurationRequest {
    /// Empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration used when the caller specifies none:
    /// 600 dpi color, no preview.
    #[must_use]
    pub fn reference() -> Self {
        Self::new()
            .with_value("resolution", Value::Int(600))
            .with_value("mode", Value::Str("color".to_owned()))
            .with_value("preview", Value::Bool(false))
    }

    /// Append a typed value.
    #[must_use]
    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.push(OptionRequest::new(name, Setting::Value(value)));
        self
    }

    /// Append a textual value.
    #[must_use]
    pub fn with_text(mut self, name: &str, text: &str) -> Self {
        self.push(OptionRequest::new(name, Setting::Text(text.to_owned())));
        self
    }

    /// Append a request for the automatic value.
    #[must_use]
    pub fn with_auto(mut self, name: &str) -> Self {
        self.push(OptionRequest::new(name, Setting::Auto));
        self
    }

    /// Append an entry.
    pub fn push(&mut self, entry: OptionRequest) {
        self.entries.push(entry);
    }

    /// Entries in application order.
    #[must_use]
    pub fn entries(&self) -> &[OptionRequest] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<OptionRequest> for ConfigurationRequest {
    fn from_iter<I: IntoIterator<Item = OptionRequest>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<OptionRequest> for ConfigurationRequest {
    fn extend<I: IntoIterator<Item = OptionRequest>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

/// Validate and write every entry of `request` to `device`, in order.
///
/// # Errors
///
/// * [`ScanError::UnknownOption`] if an entry names no settable option.
/// * [`ScanError::TypeMismatch`] if a value does not have the option's type.
/// * [`ScanError::OptionError`] if the constraint or the device rejects a value.
///
/// Entries after the failing one are not attempted.
pub fn apply<D: ScannerDevice + ?Sized>(device: &mut D, request: &ConfigurationRequest) -> Result<()> {
    for entry in request.entries() {
        let catalog = OptionCatalog::read(&*device)?;
        let option = catalog
            .find(&entry.name)
            .ok_or_else(|| ScanError::UnknownOption(entry.name.clone()))?;

        if !option.value_type.is_negotiable() {
            warn!(
                option = %option.name,
                value_type = %option.value_type,
                "skipping option of unsupported type"
            );
            continue;
        }

        let value = resolve_value(option, &entry.setting)?;
        if !option.active {
            return Err(option_error(option, "option is inactive"));
        }
        validation::check(option, &value).map_err(|violation| match violation {
            Violation::TypeMismatch { expected, found } => ScanError::TypeMismatch {
                name: option.name.clone(),
                expected,
                found: found.to_string(),
            },
            other => option_error(option, &other.to_string()),
        })?;

        debug!(option = %option.name, %value, "setting option");
        device
            .set_option(&option.name, &value)
            .map_err(|err| option_error(option, &device_reason(err)))?;
    }
    Ok(())
}

fn resolve_value(option: &OptionDescriptor, setting: &Setting) -> Result<Value> {
    match setting {
        Setting::Auto if option.automatic => Ok(Value::Auto),
        Setting::Auto => Err(option_error(
            option,
            &Violation::AutoUnsupported.to_string(),
        )),
        Setting::Value(value) => Ok(value.clone()),
        Setting::Text(text) => {
            Value::parse_as(option.value_type, text).ok_or_else(|| ScanError::TypeMismatch {
                name: option.name.clone(),
                expected: option.value_type,
                found: format!("{text:?}"),
            })
        }
    }
}

fn option_error(option: &OptionDescriptor, reason: &str) -> ScanError {
    ScanError::OptionError {
        name: option.name.clone(),
        reason: reason.to_owned(),
    }
}

fn device_reason(err: ScanError) -> String {
    match err {
        ScanError::Device(reason) | ScanError::OptionError { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use crate::traits::ValueType;

    fn resolution_device() -> MockDevice {
        MockDevice::new("stub").with_option(
            OptionDescriptor::new("resolution", ValueType::Int).with_range(100.0, 1200.0, 100.0),
            Value::Int(300),
        )
    }

    #[test]
    fn test_apply_valid_value() {
        let mut device = resolution_device();
        let request = ConfigurationRequest::new().with_value("resolution", Value::Int(600));

        apply(&mut device, &request).expect("600 is on the grid");
        assert_eq!(device.get_option("resolution").expect("read"), Value::Int(600));
    }

    #[test]
    fn test_apply_off_grid_value_leaves_option_unchanged() {
        let mut device = resolution_device();
        let request = ConfigurationRequest::new().with_value("resolution", Value::Int(650));

        let err = apply(&mut device, &request).expect_err("650 is off the grid");
        assert!(matches!(err, ScanError::OptionError { ref name, .. } if name == "resolution"));
        assert_eq!(device.get_option("resolution").expect("read"), Value::Int(300));
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_fail_fast_keeps_earlier_writes() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let request = ConfigurationRequest::new()
            .with_value("preview", Value::Bool(true))
            .with_value("resolution", Value::Int(601))
            .with_value("mode", Value::Str("color".to_owned()));

        assert!(apply(&mut device, &request).is_err());

        let written: Vec<&str> = device.writes().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(written, ["preview"]);
        assert_eq!(
            device.get_option("mode").expect("read"),
            Value::Str("gray".to_owned())
        );
    }

    #[test]
    fn test_order_matters_for_activation() {
        let mut device = MockDevice::flatbed("sim:flatbed");

        let threshold_first = ConfigurationRequest::new()
            .with_value("threshold", Value::Int(70))
            .with_value("mode", Value::Str("lineart".to_owned()));
        let err = apply(&mut device, &threshold_first).expect_err("threshold inactive");
        assert!(matches!(err, ScanError::OptionError { ref reason, .. } if reason.contains("inactive")));

        let mode_first = ConfigurationRequest::new()
            .with_value("mode", Value::Str("lineart".to_owned()))
            .with_value("threshold", Value::Int(70));
        apply(&mut device, &mode_first).expect("threshold active after mode");
        assert_eq!(device.get_option("threshold").expect("read"), Value::Int(70));
    }

    #[test]
    fn test_unknown_option() {
        let mut device = resolution_device();
        let request = ConfigurationRequest::new().with_value("contrast", Value::Int(1));

        assert!(matches!(
            apply(&mut device, &request),
            Err(ScanError::UnknownOption(name)) if name == "contrast"
        ));
    }

    #[test]
    fn test_read_only_option_is_unknown() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let request = ConfigurationRequest::new().with_value("scan-button", Value::Bool(true));

        assert!(matches!(
            apply(&mut device, &request),
            Err(ScanError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut device = resolution_device();
        let request =
            ConfigurationRequest::new().with_value("resolution", Value::Str("600".to_owned()));

        assert!(matches!(
            apply(&mut device, &request),
            Err(ScanError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_text_is_coerced_to_declared_type() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let request = ConfigurationRequest::new()
            .with_text("resolution", "1200")
            .with_text("preview", "yes")
            .with_text("gamma", "2.2")
            .with_text("mode", "color");

        apply(&mut device, &request).expect("all values legal");
        assert_eq!(device.get_option("resolution").expect("read"), Value::Int(1200));
        assert_eq!(device.get_option("preview").expect("read"), Value::Bool(true));
        assert_eq!(device.get_option("gamma").expect("read"), Value::Real(2.2));
    }

    #[test]
    fn test_unparsable_text_is_type_mismatch() {
        let mut device = resolution_device();
        let request = ConfigurationRequest::new().with_text("resolution", "high");

        assert!(matches!(
            apply(&mut device, &request),
            Err(ScanError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_text_never_reaches_device() {
        let mut device = MockDevice::flatbed("sim:flatbed");

        for text in ["NaN", "inf", "-inf"] {
            let request = ConfigurationRequest::new().with_text("tl-x", text);
            assert!(
                matches!(apply(&mut device, &request), Err(ScanError::OptionError { .. })),
                "{text} should be rejected"
            );
        }
        assert_eq!(device.get_option("tl-x").expect("read"), Value::Real(0.0));
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_auto_on_supporting_option() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let request = ConfigurationRequest::new().with_auto("brightness");

        apply(&mut device, &request).expect("brightness supports auto");
        assert_eq!(device.get_option("brightness").expect("read"), Value::Auto);
    }

    #[test]
    fn test_auto_on_option_without_support() {
        let mut device = resolution_device();
        let request = ConfigurationRequest::new().with_auto("resolution");

        assert!(matches!(
            apply(&mut device, &request),
            Err(ScanError::OptionError { .. })
        ));
    }

    #[test]
    fn test_button_is_skipped() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        let request = ConfigurationRequest::new()
            .with_text("calibrate", "1")
            .with_value("preview", Value::Bool(true));

        apply(&mut device, &request).expect("button skipped");
        assert_eq!(device.writes().len(), 1);
    }

    #[test]
    fn test_device_rejection_surfaces_reason() {
        let mut device = resolution_device().with_rejection("resolution", "carriage locked");
        let request = ConfigurationRequest::new().with_value("resolution", Value::Int(600));

        let err = apply(&mut device, &request).expect_err("device rejects");
        assert!(matches!(
            err,
            ScanError::OptionError { ref name, ref reason }
                if name == "resolution" && reason == "carriage locked"
        ));
    }

    #[test]
    fn test_reference_request() {
        let mut device = MockDevice::flatbed("sim:flatbed");
        apply(&mut device, &ConfigurationRequest::reference()).expect("reference applies");

        let written: Vec<&str> = device.writes().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(written, ["resolution", "mode", "preview"]);
    }
}
