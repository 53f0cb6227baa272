//! Claims projection: the authenticated principal attached to each connection.

use std::sync::Arc;

use serde::Serialize;

use crate::identity::types::IdentityRecord;

/// Authentication type reported for principals built from overlay identities.
pub const AUTHENTICATION_TYPE: &str = "TailnetAuthentication";

pub const NAME_CLAIM: &str = "name";
pub const EMAIL_CLAIM: &str = "email";
pub const PICTURE_CLAIM: &str = "picture";

/// A single string claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub kind: &'static str,
    pub value: String,
}

/// The identity a request can trust without authenticating itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub authentication_type: &'static str,
    pub claims: Vec<Claim>,
}

impl Principal {
    /// Build the principal from a user profile.
    ///
    /// The login name is used as the email claim; for tagged devices it is a
    /// tag owner rather than an address.
    pub fn from_identity(record: &IdentityRecord) -> Self {
        let profile = &record.user_profile;
        Self {
            authentication_type: AUTHENTICATION_TYPE,
            claims: vec![
                Claim { kind: NAME_CLAIM, value: profile.display_name.clone() },
                Claim { kind: EMAIL_CLAIM, value: profile.login_name.clone() },
                Claim { kind: PICTURE_CLAIM, value: profile.profile_pic_url.clone() },
            ],
        }
    }

    /// Value of the first claim of `kind`.
    pub fn find_first(&self, kind: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.value.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.find_first(NAME_CLAIM)
    }

    pub fn email(&self) -> Option<&str> {
        self.find_first(EMAIL_CLAIM)
    }

    pub fn profile_picture_url(&self) -> Option<&str> {
        self.find_first(PICTURE_CLAIM)
    }
}

/// Connection feature carrying the verified peer identity.
///
/// Inserted into the connection's feature set by the accept loop and into each
/// request's extensions by the HTTP host.
#[derive(Debug, Clone)]
pub struct IdentityFeature {
    principal: Principal,
    record: Arc<IdentityRecord>,
}

impl IdentityFeature {
    pub fn new(record: IdentityRecord) -> Self {
        Self {
            principal: Principal::from_identity(&record),
            record: Arc::new(record),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The full lookup result, including node details and capabilities.
    pub fn record(&self) -> &IdentityRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::types::{NodeDetails, UserProfile};

    fn alice() -> IdentityRecord {
        IdentityRecord {
            node: NodeDetails::default(),
            user_profile: UserProfile {
                id: 1,
                login_name: "alice@example.com".to_string(),
                display_name: "Alice".to_string(),
                profile_pic_url: "https://pic/x.png".to_string(),
            },
            cap_map: None,
        }
    }

    #[test]
    fn maps_profile_to_claims() {
        let principal = Principal::from_identity(&alice());
        assert_eq!(principal.name(), Some("Alice"));
        assert_eq!(principal.email(), Some("alice@example.com"));
        assert_eq!(principal.profile_picture_url(), Some("https://pic/x.png"));
        assert_eq!(principal.authentication_type, AUTHENTICATION_TYPE);
        assert_eq!(principal.find_first("role"), None);
    }

    #[test]
    fn feature_keeps_record() {
        let feature = IdentityFeature::new(alice());
        assert_eq!(feature.record().user_profile.id, 1);
        assert_eq!(feature.principal().claims.len(), 3);
    }
}
