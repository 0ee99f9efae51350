//! Audit trait for objects that can be checked against the audit policy.

use async_trait::async_trait;

use crate::audit::{AuditSettings, Problem};
use crate::error::Result;

/// Check an object against the audit policy.
#[async_trait]
pub trait Audit {
    /// Problems found on the object; empty when it complies.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the object state fails.
    async fn audit(&self, settings: &AuditSettings) -> Result<Vec<Problem>>;
}
