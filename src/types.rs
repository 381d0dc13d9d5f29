//! Platform and cluster metadata types
//!
//! The install config carries one section per supported platform; exactly one
//! of them must be set. `PlatformConfig::classify` turns the sections into a
//! tagged `Platform` so the rest of the crate can match exhaustively.

use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// Identifier key carried in cloud metadata so resources can be found again
pub const CLUSTER_ID_TAG: &str = "tectonicClusterID";

/// Supported infrastructure platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Aws,
    #[strum(serialize = "openstack")]
    OpenStack,
    Libvirt,
}

/// AWS platform section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsPlatform {
    pub region: String,
    /// Optional EC2 instance type for the masters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_instance_type: Option<String>,
}

/// OpenStack platform section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackPlatform {
    pub region: String,
    /// Glance image used for all nodes
    #[serde(default)]
    pub base_image: String,
    /// Entry in clouds.yaml to use
    #[serde(default)]
    pub cloud: String,
    /// Network providing floating IPs
    #[serde(default)]
    pub external_network: String,
}

/// Libvirt platform section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibvirtPlatform {
    /// Connection URI of the libvirt daemon (e.g. `qemu+tcp://192.168.122.1/system`)
    pub uri: String,
}

/// Platform sections as they appear in the install config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenStackPlatform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvirt: Option<LibvirtPlatform>,
}

/// The single platform selected by an install config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Aws(AwsPlatform),
    OpenStack(OpenStackPlatform),
    Libvirt(LibvirtPlatform),
}

impl Platform {
    pub fn kind(&self) -> PlatformKind {
        match self {
            Self::Aws(_) => PlatformKind::Aws,
            Self::OpenStack(_) => PlatformKind::OpenStack,
            Self::Libvirt(_) => PlatformKind::Libvirt,
        }
    }
}

impl PlatformConfig {
    /// Sections that are set, in declaration order
    pub fn selected(&self) -> Vec<PlatformKind> {
        let mut kinds = Vec::new();
        if self.aws.is_some() {
            kinds.push(PlatformKind::Aws);
        }
        if self.openstack.is_some() {
            kinds.push(PlatformKind::OpenStack);
        }
        if self.libvirt.is_some() {
            kinds.push(PlatformKind::Libvirt);
        }
        kinds
    }

    /// Select the one platform this config targets.
    ///
    /// # Errors
    ///
    /// - `NoKnownPlatform` if no section is set
    /// - `Config` if more than one section is set
    pub fn classify(&self) -> Result<Platform> {
        let selected = self.selected();
        if selected.len() > 1 {
            let names: Vec<String> = selected.iter().map(ToString::to_string).collect();
            return Err(AssetError::config(format!(
                "multiple platforms selected: {}",
                names.join(", ")
            )));
        }
        match (&self.aws, &self.openstack, &self.libvirt) {
            (Some(aws), _, _) => Ok(Platform::Aws(aws.clone())),
            (_, Some(openstack), _) => Ok(Platform::OpenStack(openstack.clone())),
            (_, _, Some(libvirt)) => Ok(Platform::Libvirt(libvirt.clone())),
            (None, None, None) => Err(AssetError::NoKnownPlatform),
        }
    }
}

/// Region and cluster identifier recorded for cloud platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPlatformMetadata {
    pub region: String,
    pub identifier: BTreeMap<String, String>,
}

/// Libvirt connection recorded for later teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibvirtPlatformMetadata {
    pub uri: String,
}

/// Platform-specific part of the cluster metadata; at most one is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPlatformMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<CloudPlatformMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<CloudPlatformMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvirt: Option<LibvirtPlatformMetadata>,
}

impl ClusterPlatformMetadata {
    /// Metadata identifying the infrastructure created for `platform`.
    pub fn for_platform(platform: &Platform, cluster_id: &str) -> Self {
        let identifier = || BTreeMap::from([(CLUSTER_ID_TAG.to_string(), cluster_id.to_string())]);
        match platform {
            Platform::Aws(aws) => Self {
                aws: Some(CloudPlatformMetadata {
                    region: aws.region.clone(),
                    identifier: identifier(),
                }),
                ..Self::default()
            },
            Platform::OpenStack(openstack) => Self {
                openstack: Some(CloudPlatformMetadata {
                    region: openstack.region.clone(),
                    identifier: identifier(),
                }),
                ..Self::default()
            },
            Platform::Libvirt(libvirt) => Self {
                libvirt: Some(LibvirtPlatformMetadata {
                    uri: libvirt.uri.clone(),
                }),
                ..Self::default()
            },
        }
    }
}

/// Record describing a provisioning attempt, written as `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub cluster_name: String,
    #[serde(flatten)]
    pub platform: ClusterPlatformMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn aws(region: &str) -> AwsPlatform {
        AwsPlatform {
            region: region.to_string(),
            master_instance_type: None,
        }
    }

    #[test]
    fn test_platform_kind_strings() {
        let names: Vec<String> = PlatformKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["aws", "openstack", "libvirt"]);
        assert_eq!("openstack".parse::<PlatformKind>(), Ok(PlatformKind::OpenStack));
        assert!("gcp".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_classify_none_is_no_known_platform() {
        let err = PlatformConfig::default().classify().unwrap_err();
        assert!(matches!(err, AssetError::NoKnownPlatform));
        assert_eq!(err.to_string(), "no known platform");
    }

    #[test]
    fn test_classify_single() {
        let config = PlatformConfig {
            libvirt: Some(LibvirtPlatform {
                uri: "qemu:///system".to_string(),
            }),
            ..PlatformConfig::default()
        };
        let platform = config.classify().expect("libvirt");
        assert_eq!(platform.kind(), PlatformKind::Libvirt);
    }

    #[test]
    fn test_classify_multiple_is_config_error() {
        let config = PlatformConfig {
            aws: Some(aws("us-east-1")),
            libvirt: Some(LibvirtPlatform {
                uri: "qemu:///system".to_string(),
            }),
            ..PlatformConfig::default()
        };
        let err = config.classify().unwrap_err();
        assert!(matches!(err, AssetError::Config(_)));
        assert!(err.to_string().contains("aws, libvirt"));
    }

    #[test]
    fn test_metadata_json_shape() {
        let metadata = ClusterMetadata {
            cluster_name: "demo".to_string(),
            platform: ClusterPlatformMetadata::for_platform(&Platform::Aws(aws("us-test-1")), "abc"),
        };
        let value = serde_json::to_value(&metadata).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "clusterName": "demo",
                "aws": {
                    "region": "us-test-1",
                    "identifier": { "tectonicClusterID": "abc" }
                }
            })
        );
    }

    #[test]
    fn test_metadata_libvirt_shape() {
        let platform = Platform::Libvirt(LibvirtPlatform {
            uri: "qemu+tcp://192.168.122.1/system".to_string(),
        });
        let metadata = ClusterMetadata {
            cluster_name: "lab".to_string(),
            platform: ClusterPlatformMetadata::for_platform(&platform, "ignored"),
        };
        let value = serde_json::to_value(&metadata).expect("serialize");
        assert_eq!(value["libvirt"]["uri"], "qemu+tcp://192.168.122.1/system");
        assert!(value.get("aws").is_none());
    }

    #[test]
    fn test_metadata_without_platform_has_only_name() {
        let metadata = ClusterMetadata {
            cluster_name: "bare".to_string(),
            ..ClusterMetadata::default()
        };
        let json = serde_json::to_string(&metadata).expect("serialize");
        assert_eq!(json, r#"{"clusterName":"bare"}"#);
    }
}
