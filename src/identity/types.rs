//! Identity records returned by the loopback `whois` endpoint.
//!
//! Field names follow the JSON emitted by the local API. Everything except the
//! node and user profile is optional on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of one `whois` lookup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdentityRecord {
    #[serde(rename = "Node")]
    pub node: NodeDetails,

    #[serde(rename = "UserProfile")]
    pub user_profile: UserProfile,

    /// Peer capabilities granted by policy; opaque to this crate.
    #[serde(rename = "CapMap", default)]
    pub cap_map: Option<BTreeMap<String, serde_json::Value>>,
}

/// The remote node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeDetails {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "StableID")]
    pub stable_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "User")]
    pub user: i64,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "KeyExpiry")]
    pub key_expiry: Option<String>,
    #[serde(rename = "Machine")]
    pub machine: String,
    #[serde(rename = "DiscoKey")]
    pub disco_key: String,
    #[serde(rename = "Addresses")]
    pub addresses: Vec<String>,
    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: Vec<String>,
    #[serde(rename = "HomeDERP")]
    pub home_derp: i32,
    #[serde(rename = "Hostinfo", alias = "HostInfo")]
    pub host_info: HostInfo,
    #[serde(rename = "Created")]
    pub created: String,
    #[serde(rename = "Cap")]
    pub cap: i32,
    #[serde(rename = "Online")]
    pub online: Option<bool>,
    #[serde(rename = "ComputedName")]
    pub computed_name: String,
    #[serde(rename = "ComputedNameWithHost")]
    pub computed_name_with_host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostInfo {
    #[serde(rename = "OS")]
    pub os: String,
    #[serde(rename = "Hostname")]
    pub hostname: String,
}

/// The user who owns the remote node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UserProfile {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "LoginName")]
    pub login_name: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "ProfilePicURL")]
    pub profile_pic_url: String,
}
