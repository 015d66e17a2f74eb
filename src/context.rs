//! Process-scoped lifetime of the device-access library.

use tracing::{debug, info};

use crate::resolver;
use crate::session::Session;
use crate::traits::{DeviceInfo, Result, ScanError, ScannerBackend};

/// Initialized device-access library.
///
/// Construct once at program start; dropping it shuts the library down.
/// Sessions borrow the context, so every device is closed before shutdown.
pub struct AccessContext<B: ScannerBackend> {
    backend: B,
}

impl<B: ScannerBackend> AccessContext<B> {
    /// Initialize the library.
    pub fn init(mut backend: B) -> Result<Self> {
        backend.initialize()?;
        info!("device access initialized");
        Ok(Self { backend })
    }

    /// The underlying backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// List visible devices.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.backend.devices().map_err(enumeration_failed)
    }

    /// Open a device by exact or partial name.
    pub fn resolve(&self, identifier: &str) -> Result<Session<'_, B::Device>> {
        resolver::resolve(&self.backend, identifier)
    }
}

impl<B: ScannerBackend> Drop for AccessContext<B> {
    fn drop(&mut self) {
        debug!("shutting down device access");
        self.backend.shutdown();
    }
}

pub(crate) fn enumeration_failed(err: ScanError) -> ScanError {
    match err {
        ScanError::EnumerationFailed(_) => err,
        other => ScanError::EnumerationFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockDevice};
    use crate::traits::{ScannerDevice, Value};

    #[test]
    fn test_init_and_shutdown_bracket_use() {
        let backend = MockBackend::new().with_device(MockDevice::new("mock:0"));
        let state = backend.lifecycle();

        {
            let context = AccessContext::init(backend).expect("init should succeed");
            assert!(state.initialized());
            assert_eq!(context.devices().expect("devices").len(), 1);
        }

        assert!(!state.initialized());
        assert_eq!(state.shutdowns(), 1);
    }

    #[test]
    fn test_sessions_end_before_shutdown() {
        let device = MockDevice::flatbed("sim:flatbed");
        let closes = device.close_counter();
        let backend = MockBackend::new().with_device(device);
        let state = backend.lifecycle();

        {
            let context = AccessContext::init(backend).expect("init should succeed");
            let mut first = context.resolve("flatbed").expect("resolve");
            first
                .set_option("preview", &Value::Bool(true))
                .expect("device usable while the context lives");
            drop(first);
            assert_eq!((closes.get(), state.shutdowns()), (1, 0));

            let second = context.resolve("sim:flatbed").expect("reopen");
            second.close();
            assert_eq!((closes.get(), state.shutdowns()), (2, 0));
        }

        assert_eq!(state.shutdowns(), 1);
    }

    #[test]
    fn test_enumeration_error_is_typed() {
        let backend = MockBackend::new().with_enumeration_failure("bus error");
        let context = AccessContext::init(backend).expect("init should succeed");

        assert!(matches!(
            context.devices(),
            Err(ScanError::EnumerationFailed(_))
        ));
    }
}
