//! Scanctl: a scanner client library
//!
//! This library resolves a scanner by name, negotiates its self-describing
//! option set against a desired configuration, acquires one image and writes
//! it as PNG, JPEG or TIFF. Device access sits behind the [`ScannerBackend`]
//! and [`ScannerDevice`] traits: the `sane` feature provides the SANE
//! implementation, and the `mock` feature simulated devices for testing.

pub mod catalog;
pub mod config;
pub mod context;
#[cfg(feature = "sane")]
pub mod device;
pub mod encoder;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod negotiator;
pub mod pipeline;
pub mod raster;
pub mod resolver;
pub mod session;
pub mod telemetry;
pub mod traits;
pub mod validation;

pub use catalog::OptionCatalog;
pub use context::AccessContext;
#[cfg(feature = "sane")]
pub use device::{SaneBackend, SaneDevice};
pub use encoder::OutputFormat;
pub use negotiator::{ConfigurationRequest, OptionRequest, Setting};
pub use session::Session;
pub use traits::{
    AcquiredImage, ColorModel, Constraint, DeviceInfo, OptionDescriptor, ScanError,
    ScannerBackend, ScannerDevice, Unit, Value, ValueType,
};
