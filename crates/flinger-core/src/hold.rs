//! The resource held while the server is serving.
//!
//! On a device this keeps the host awake (see
//! [`SysfsWakeLock`](crate::platform::SysfsWakeLock)). The supervisor is the
//! only component that acquires or releases it, and pairs every acquire
//! with exactly one release.

use crate::error::Result;

/// A long-lived acquisition kept for the duration of a running server.
pub trait HeldResource: Send + Sync {
    /// Acquire the resource.
    fn acquire(&self) -> Result<()>;

    /// Release the resource.
    fn release(&self) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// A resource that does nothing, for hosts with nothing to hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHold;

impl HeldResource for NoopHold {
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}
