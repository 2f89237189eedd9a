//! Process-wide backend registration

use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::BackendOptions;
use crate::error::Result;

static REGISTERED: Lazy<RwLock<Option<BackendOptions>>> = Lazy::new(|| RwLock::new(None));

/// Register `options` for every loop run until the next registration.
///
/// Invalid options are rejected and leave the previous registration in place.
pub fn register(options: BackendOptions) -> Result<()> {
    options.chunk_size()?;
    let mut slot = REGISTERED.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(options);
    info!(chunk_size = options.chunk_size, "registered chunkloop backend");
    Ok(())
}

/// The currently registered options, if any
pub fn registered() -> Option<BackendOptions> {
    *REGISTERED.read().unwrap_or_else(PoisonError::into_inner)
}

/// Drop the registration, returning what was registered
pub fn unregister() -> Option<BackendOptions> {
    REGISTERED.write().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    // Registration is global, so the whole lifecycle lives in one test
    #[test]
    fn test_registration_lifecycle() {
        unregister();
        assert_eq!(registered(), None);

        register(BackendOptions { chunk_size: 4 }).unwrap();
        assert_eq!(registered(), Some(BackendOptions { chunk_size: 4 }));

        let err = register(BackendOptions { chunk_size: 0 }).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_CHUNK_SIZE);
        assert_eq!(registered(), Some(BackendOptions { chunk_size: 4 }));

        register(BackendOptions::default()).unwrap();
        assert_eq!(unregister(), Some(BackendOptions { chunk_size: 1 }));
        assert_eq!(registered(), None);
    }
}
