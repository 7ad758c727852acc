//! Compile-time instance-type and region tables.
//!
//! Values are a snapshot of the provider's published instance catalog; they
//! are embedded in the binary and never change at runtime (spec: CORES_PER_INSTANCE).

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// vCPU count per instance-type API name.
pub static CORES_PER_INSTANCE: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    [
        ("c1.medium", 2),
        ("c1.xlarge", 8),
        ("c3.2xlarge", 8),
        ("c3.4xlarge", 16),
        ("c3.8xlarge", 32),
        ("c3.large", 2),
        ("c3.xlarge", 4),
        ("c4.2xlarge", 8),
        ("c4.4xlarge", 16),
        ("c4.8xlarge", 36),
        ("c4.large", 2),
        ("c4.xlarge", 4),
        ("c5.18xlarge", 72),
        ("c5.2xlarge", 8),
        ("c5.4xlarge", 16),
        ("c5.9xlarge", 36),
        ("c5.large", 2),
        ("c5.xlarge", 4),
        ("c5d.18xlarge", 72),
        ("c5d.2xlarge", 8),
        ("c5d.4xlarge", 16),
        ("c5d.9xlarge", 36),
        ("c5d.large", 2),
        ("c5d.xlarge", 4),
        ("cc2.8xlarge", 32),
        ("cr1.8xlarge", 32),
        ("d2.2xlarge", 8),
        ("d2.4xlarge", 16),
        ("d2.8xlarge", 36),
        ("d2.xlarge", 4),
        ("f1.16xlarge", 64),
        ("f1.2xlarge", 8),
        ("g2.2xlarge", 8),
        ("g2.8xlarge", 32),
        ("g3.16xlarge", 64),
        ("g3.4xlarge", 16),
        ("g3.8xlarge", 32),
        ("h1.16xlarge", 64),
        ("h1.2xlarge", 8),
        ("h1.4xlarge", 16),
        ("h1.8xlarge", 32),
        ("hs1.8xlarge", 16),
        ("i2.2xlarge", 8),
        ("i2.4xlarge", 16),
        ("i2.8xlarge", 32),
        ("i2.xlarge", 4),
        ("i3.16xlarge", 64),
        ("i3.2xlarge", 8),
        ("i3.4xlarge", 16),
        ("i3.8xlarge", 32),
        ("i3.large", 2),
        ("i3.metal", 72),
        ("i3.xlarge", 4),
        ("m1.large", 2),
        ("m1.medium", 1),
        ("m1.small", 1),
        ("m1.xlarge", 4),
        ("m2.2xlarge", 4),
        ("m2.4xlarge", 8),
        ("m2.xlarge", 2),
        ("m3.2xlarge", 8),
        ("m3.large", 2),
        ("m3.medium", 1),
        ("m3.xlarge", 4),
        ("m4.10xlarge", 40),
        ("m4.16xlarge", 64),
        ("m4.2xlarge", 8),
        ("m4.4xlarge", 16),
        ("m4.large", 2),
        ("m4.xlarge", 4),
        ("m5.12xlarge", 48),
        ("m5.24xlarge", 96),
        ("m5.2xlarge", 8),
        ("m5.4xlarge", 16),
        ("m5.large", 2),
        ("m5.xlarge", 4),
        ("m5d.12xlarge", 48),
        ("m5d.24xlarge", 96),
        ("m5d.2xlarge", 8),
        ("m5d.4xlarge", 16),
        ("m5d.large", 2),
        ("m5d.xlarge", 4),
        ("p2.16xlarge", 64),
        ("p2.8xlarge", 32),
        ("p2.xlarge", 4),
        ("p3.16xlarge", 64),
        ("p3.2xlarge", 8),
        ("p3.8xlarge", 32),
        ("r3.2xlarge", 8),
        ("r3.4xlarge", 16),
        ("r3.8xlarge", 32),
        ("r3.large", 2),
        ("r3.xlarge", 4),
        ("r4.16xlarge", 64),
        ("r4.2xlarge", 8),
        ("r4.4xlarge", 16),
        ("r4.8xlarge", 32),
        ("r4.large", 2),
        ("r4.xlarge", 4),
        ("r5.12xlarge", 48),
        ("r5.24xlarge", 96),
        ("r5.2xlarge", 8),
        ("r5.4xlarge", 16),
        ("r5.large", 2),
        ("r5.xlarge", 4),
        ("r5d.12xlarge", 48),
        ("r5d.24xlarge", 96),
        ("r5d.2xlarge", 8),
        ("r5d.4xlarge", 16),
        ("r5d.large", 2),
        ("r5d.xlarge", 4),
        ("t1.micro", 1),
        ("t2.2xlarge", 8),
        ("t2.large", 2),
        ("t2.medium", 2),
        ("t2.micro", 1),
        ("t2.nano", 1),
        ("t2.small", 1),
        ("t2.xlarge", 4),
        ("x1.16xlarge", 64),
        ("x1.32xlarge", 128),
        ("x1e.16xlarge", 64),
        ("x1e.2xlarge", 8),
        ("x1e.32xlarge", 128),
        ("x1e.4xlarge", 16),
        ("x1e.8xlarge", 32),
        ("x1e.xlarge", 4),
        ("z1d.12xlarge", 48),
        ("z1d.2xlarge", 8),
        ("z1d.3xlarge", 12),
        ("z1d.6xlarge", 24),
        ("z1d.large", 2),
        ("z1d.xlarge", 4),
    ]
    .into_iter()
    .collect()
});

/// The closed set of regions this system is allowed to operate in.
pub static SUPPORTED_REGIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ap-northeast-1",
        "ap-northeast-2",
        "ap-south-1",
        "ap-southeast-1",
        "ap-southeast-2",
        "ca-central-1",
        "eu-central-1",
        "eu-west-1",
        "eu-west-2",
        "eu-west-3",
        "sa-east-1",
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
    ]
    .into_iter()
    .collect()
});

/// Looks up the vCPU count for an instance-type name, if known.
pub fn cores_for_instance_type(name: &str) -> Option<u32> {
    CORES_PER_INSTANCE.get(name).copied()
}

pub fn is_supported_region(region: &str) -> bool {
    SUPPORTED_REGIONS.contains(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_instance_type_resolves() {
        assert_eq!(cores_for_instance_type("c4.xlarge"), Some(4));
        assert_eq!(cores_for_instance_type("m5.24xlarge"), Some(96));
    }

    #[test]
    fn unknown_instance_type_is_none() {
        assert_eq!(cores_for_instance_type("nonexistent.type"), None);
    }

    #[test]
    fn region_set_is_closed() {
        assert!(is_supported_region("us-east-1"));
        assert!(!is_supported_region("mars-central-1"));
    }

    #[test]
    fn table_has_expected_size() {
        assert_eq!(CORES_PER_INSTANCE.len(), 130);
        assert_eq!(SUPPORTED_REGIONS.len(), 15);
    }
}
