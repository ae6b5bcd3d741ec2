//! Driver identity reported through `ProvisionerGetInfo`.

use crate::error::CosiError;

/// Default driver name registered with the COSI sidecar.
pub const DEFAULT_DRIVER_NAME: &str = "rk8s.minio.cosi";

/// Name and version of this driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity {
    pub name: String,
    pub version: String,
}

impl DriverIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `"<name>-<version>"`.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Both name and version must be set before the driver provisions anything.
    pub fn validate(&self) -> Result<(), CosiError> {
        if self.name.is_empty() {
            return Err(CosiError::Configuration("driver name not defined".into()));
        }
        if self.version.is_empty() {
            return Err(CosiError::Configuration("driver version not defined".into()));
        }
        Ok(())
    }
}
