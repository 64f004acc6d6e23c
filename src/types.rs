use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque continuation token issued by the server.
///
/// Sent back verbatim as the body of the next fetch for the same stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Cursor for a stream that has never been fetched: the empty string.
    pub fn initial() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Cursor {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Cursor::new(value)
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Cursor(value)
    }
}

impl From<Cursor> for String {
    fn from(value: Cursor) -> Self {
        value.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a paginated event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch<T> {
    pub cursor: Cursor,
    pub has_more: bool,
    /// Events in server order.
    pub items: Vec<T>,
}

impl<T> EventBatch<T> {
    /// `true` when the caller may wait for the next poll interval.
    pub fn is_drained(&self) -> bool {
        !self.has_more
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub type SignInAttemptBatch = EventBatch<SignInAttempt>;
pub type ItemUsageBatch = EventBatch<ItemUsage>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInAttempt {
    pub uuid: String,
    pub session_uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub country: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Extra detail for some attempt types (e.g. a failure reason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<SignInAttemptDetails>,
    pub target_user: User,
    pub client: ClientInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInAttemptDetails {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUsage {
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Item version at the time of access.
    pub used_version: u32,
    pub vault_uuid: String,
    pub item_uuid: String,
    pub user: User,
    pub client: ClientInfo,
}

/// User identity attached to sign-in attempts (`target_user`) and item usages (`user`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uuid: String,
    pub name: String,
    pub email: String,
}

/// Client application and host that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub app_name: String,
    pub app_version: String,
    pub platform_name: String,
    pub platform_version: String,
    pub os_name: String,
    pub os_version: String,
    pub ip_address: String,
}

/// Metadata about the credential, returned by the introspection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "IssuedAt", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(rename = "Features")]
    pub features: BTreeSet<String>,
}

impl IntrospectionResult {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Whether the credential may read the sign-in attempt stream.
    pub fn can_read_sign_in_attempts(&self) -> bool {
        self.has_feature(FEATURE_SIGN_IN_ATTEMPTS)
    }

    /// Whether the credential may read the item usage stream.
    pub fn can_read_item_usages(&self) -> bool {
        self.has_feature(FEATURE_ITEM_USAGES)
    }
}

/// Feature flag granting access to the sign-in attempt stream.
pub const FEATURE_SIGN_IN_ATTEMPTS: &str = "signinattempts";
/// Feature flag granting access to the item usage stream.
pub const FEATURE_ITEM_USAGES: &str = "itemusages";
