use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default label marking a node as spot capacity
pub const DEFAULT_SPOT_LABEL: &str = "spot";
/// Well-known instance type label
pub const DEFAULT_INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
/// Well-known region label
pub const DEFAULT_REGION_LABEL: &str = "topology.kubernetes.io/region";
/// Well-known availability zone label
pub const DEFAULT_ZONE_LABEL: &str = "topology.kubernetes.io/zone";
/// Label Spark puts on driver and executor pods
pub const DEFAULT_ROLE_LABEL: &str = "spark-role";

/// Label keys the scheduler reads from nodes and pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelSchema {
    /// Node label whose truthy value marks spot capacity
    pub spot: String,
    /// Node label carrying the instance type
    pub instance_type: String,
    /// Node label carrying the region
    pub region: String,
    /// Node label carrying the availability zone
    pub zone: String,
    /// Pod label carrying the workload role
    pub role: String,
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self {
            spot: DEFAULT_SPOT_LABEL.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE_LABEL.to_string(),
            region: DEFAULT_REGION_LABEL.to_string(),
            zone: DEFAULT_ZONE_LABEL.to_string(),
            role: DEFAULT_ROLE_LABEL.to_string(),
        }
    }
}

impl LabelSchema {
    /// Load a label schema from a YAML file. Keys not present keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CoreError::invalid_input(
                "label schema",
                format!("cannot read {}: {}", path.display(), e),
                "Pass a readable YAML file",
            )
        })?;
        let schema: Self = crate::from_yaml(&data)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Reject empty label keys
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("spot", &self.spot),
            ("instanceType", &self.instance_type),
            ("region", &self.region),
            ("zone", &self.zone),
            ("role", &self.role),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::invalid_input(
                    format!("label schema {}", field),
                    "label key is empty",
                    "Remove the key to use the default, or set a non-empty label key",
                ));
            }
        }
        Ok(())
    }
}
