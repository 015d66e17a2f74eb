//! Turning a device identifier into an open session.

use tracing::{debug, info, warn};

use crate::context::enumeration_failed;
use crate::session::Session;
use crate::traits::{Result, ScanError, ScannerBackend};

/// Open the device named by `identifier`, tolerating partial names.
///
/// An exact open is tried first. If it fails, the visible devices are listed
/// and the first one whose name contains `identifier` is opened. Ties are
/// broken by enumeration order only.
///
/// # Errors
///
/// * [`ScanError::EnumerationFailed`] if listing devices fails.
/// * [`ScanError::NotFound`] if no device name contains `identifier`.
/// * Whatever opening the matched device reports.
pub fn resolve<'ctx, B: ScannerBackend>(
    backend: &'ctx B,
    identifier: &str,
) -> Result<Session<'ctx, B::Device>> {
    match backend.open(identifier) {
        Ok(device) => {
            info!(device = identifier, "opened device");
            return Ok(Session::new(device));
        }
        Err(err) => debug!(identifier, error = %err, "exact open failed, trying substring match"),
    }

    let devices = backend.devices().map_err(enumeration_failed)?;
    let mut matches = devices.iter().filter(|d| d.name.contains(identifier));
    let Some(first) = matches.next() else {
        return Err(ScanError::NotFound(identifier.to_owned()));
    };

    let others: Vec<&str> = matches.map(|d| d.name.as_str()).collect();
    if !others.is_empty() {
        warn!(
            identifier,
            chosen = %first.name,
            ?others,
            "ambiguous device name, using first match in enumeration order"
        );
    }

    let device = backend.open(&first.name)?;
    info!(device = %first.name, identifier, "opened device by partial name");
    Ok(Session::new(device))
}
