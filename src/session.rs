//! Scoped ownership of an open device.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::traits::ScannerDevice;

/// An open device that is closed exactly once, on every exit path.
///
/// Dereferences to the wrapped device. Dropping the session closes it; use
/// [`Session::close`] to make the release point explicit.
///
/// A session borrows the [`AccessContext`](crate::AccessContext) that opened
/// it, so the library cannot be shut down while a device is in use:
///
/// ```compile_fail
/// use scanctl::mock::{MockBackend, MockDevice};
/// use scanctl::AccessContext;
///
/// let context = AccessContext::init(MockBackend::new().with_device(MockDevice::new("mock:0")))
///     .expect("init");
/// let session = context.resolve("mock:0").expect("resolve");
/// drop(context);
/// session.close();
/// ```
pub struct Session<'ctx, D: ScannerDevice> {
    device: D,
    closed: bool,
    context: PhantomData<&'ctx ()>,
}

impl<D: ScannerDevice> Session<'_, D> {
    /// Take ownership of an open device.
    pub(crate) const fn new(device: D) -> Self {
        Self {
            device,
            closed: false,
            context: PhantomData,
        }
    }

    /// Close the device now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(device = %self.device.info().name, "closing device");
            self.device.close();
        }
    }
}

impl<D: ScannerDevice> Deref for Session<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: ScannerDevice> DerefMut for Session<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: ScannerDevice> Drop for Session<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_close_releases_once() {
        let device = MockDevice::new("mock:0");
        let closes = device.close_counter();

        let session = Session::new(device);
        session.close();

        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let device = MockDevice::new("mock:0");
        let closes = device.close_counter();

        {
            let _session = Session::new(device);
        }

        assert_eq!(closes.get(), 1);
    }
}
