//! Read-only snapshot of a device's settable options.

use std::io::{self, Write};

use crate::traits::{Constraint, OptionDescriptor, Result, ScannerDevice, Value, ValueType};

/// Settable options of one device, in device-reported order.
///
/// A snapshot: take a new one to observe changes caused by writes, such as
/// options becoming active or inactive.
#[derive(Debug, Clone, Default)]
pub struct OptionCatalog {
    options: Vec<OptionDescriptor>,
}

impl OptionCatalog {
    /// Enumerate the device's options, keeping only settable ones.
    pub fn read<D: ScannerDevice + ?Sized>(device: &D) -> Result<Self> {
        Ok(Self::from_options(device.options()?))
    }

    /// Build a catalog from raw descriptors, dropping non-settable ones.
    #[must_use]
    pub fn from_options(options: Vec<OptionDescriptor>) -> Self {
        Self {
            options: options.into_iter().filter(|o| o.settable).collect(),
        }
    }

    /// Options in device order.
    #[must_use]
    pub fn options(&self) -> &[OptionDescriptor] {
        &self.options
    }

    /// Look up an option by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&OptionDescriptor> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Number of settable options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether the device exposes no settable options.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Iterate over the options.
    pub fn iter(&self) -> std::slice::Iter<'_, OptionDescriptor> {
        self.options.iter()
    }
}

impl<'a> IntoIterator for &'a OptionCatalog {
    type Item = &'a OptionDescriptor;
    type IntoIter = std::slice::Iter<'a, OptionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Current value of an option.
///
/// `None` for inactive options and for read failures; check
/// [`OptionDescriptor::active`] to tell the two apart.
pub fn current_value<D: ScannerDevice + ?Sized>(
    device: &D,
    option: &OptionDescriptor,
) -> Option<Value> {
    if !option.active || !option.value_type.is_negotiable() {
        return None;
    }
    device.get_option(&option.name).ok()
}

/// Render the legal values of an option, e.g. ` auto|100..1200 in steps of 100`.
#[must_use]
pub fn render_constraint(option: &OptionDescriptor) -> String {
    let mut parts = Vec::new();
    if option.automatic {
        parts.push("auto".to_owned());
    }

    match &option.constraint {
        Constraint::None => {}
        Constraint::Range { min, max, quant } => {
            let quantized = matches!(option.value_type, ValueType::Int | ValueType::Real);
            if quantized && *quant != 0.0 {
                parts.push(format!("{min}..{max} in steps of {quant}"));
            } else {
                parts.push(format!("{min}..{max}"));
            }
        }
        Constraint::List(values) => parts.extend(values.iter().map(ToString::to_string)),
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" {}", parts.join("|"))
    }
}

/// Print a device's settable options grouped as the device reports them.
pub fn write_catalog<D, W>(device: &D, catalog: &OptionCatalog, out: &mut W) -> io::Result<()>
where
    D: ScannerDevice + ?Sized,
    W: Write + ?Sized,
{
    writeln!(out, "Options for device {}:", device.info().name)?;

    let mut last_group: Option<&str> = None;
    for option in catalog {
        if last_group != Some(option.group.as_str()) {
            writeln!(out, "  {}:", option.group)?;
            last_group = Some(option.group.as_str());
        }
        write_option(out, option, current_value(device, option).as_ref())?;
    }
    Ok(())
}

fn write_option<W: Write + ?Sized>(
    out: &mut W,
    option: &OptionDescriptor,
    value: Option<&Value>,
) -> io::Result<()> {
    write!(out, "    -{}{}", option.name, render_constraint(option))?;

    match value {
        Some(value) => write!(out, " [{value}]")?,
        None if !option.active => write!(out, " [inactive]")?,
        None => write!(out, " [?]")?,
    }

    if let Some(unit) = option.unit.name() {
        write!(out, " {unit}")?;
    }
    writeln!(out)?;

    if !option.description.is_empty() {
        writeln!(out, "        {}", option.description)?;
    }
    Ok(())
}
