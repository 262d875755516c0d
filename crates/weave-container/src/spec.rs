//! Container specification and resource limits.

use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, ContainerResult};

/// Resource limits for a function container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Memory limit in megabytes (0 = unlimited).
    pub memory_mb: u64,

    /// Relative CPU weight.
    pub cpu_shares: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            cpu_shares: 1024,
        }
    }
}

impl ResourceLimits {
    /// No limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            memory_mb: 0,
            cpu_shares: 1024,
        }
    }

    /// Limit memory to the given number of megabytes.
    #[must_use]
    pub const fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Set the CPU weight.
    #[must_use]
    pub const fn with_cpu_shares(mut self, cpu_shares: u32) -> Self {
        self.cpu_shares = cpu_shares;
        self
    }
}

/// What the runtime is asked to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Function name the container serves.
    pub name: String,

    /// Image reference.
    pub image: String,

    /// Resource limits.
    pub limits: ResourceLimits,
}

impl ContainerSpec {
    /// Create a spec with default limits.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            limits: ResourceLimits::default(),
        }
    }

    /// Set resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate the specification.
    ///
    /// # Errors
    ///
    /// Returns error if the name or image is empty or the CPU weight is zero.
    pub fn validate(&self) -> ContainerResult<()> {
        if self.name.trim().is_empty() {
            return Err(ContainerError::InvalidSpec(
                "function name cannot be empty".to_string(),
            ));
        }
        if self.image.trim().is_empty() {
            return Err(ContainerError::InvalidSpec(
                "image cannot be empty".to_string(),
            ));
        }
        if self.limits.cpu_shares == 0 {
            return Err(ContainerError::InvalidSpec(
                "cpu_shares must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = ContainerSpec::new("resize", "fn/resize:1")
            .with_limits(ResourceLimits::default().with_memory_mb(512).with_cpu_shares(512));
        assert_eq!(spec.limits.memory_mb, 512);
        assert_eq!(spec.limits.cpu_shares, 512);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_spec_rejects_empty_fields() {
        assert!(ContainerSpec::new("", "img").validate().is_err());
        assert!(ContainerSpec::new("fn", "  ").validate().is_err());
        let zero_cpu = ContainerSpec::new("fn", "img")
            .with_limits(ResourceLimits::unlimited().with_cpu_shares(0));
        assert!(zero_cpu.validate().is_err());
    }

    #[test]
    fn test_limits_default_from_empty_json() {
        let limits: ResourceLimits = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(limits, ResourceLimits::default());
    }
}
