//! Memory guard seam.

use crate::error::Result;

/// Checked before every page fetch. Fails with `Error::ResourceExhausted`
/// once the process gets too close to its memory limit.
pub trait MemoryGuard: Send + Sync {
    fn check(&self) -> Result<()>;
}

/// Guard that never trips.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl MemoryGuard for Unlimited {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}
