//! # Simply Plural REST Collaborator
//!
//! Implements the four snapshot reads on top of [`ApiClient`]. The token is
//! sent raw in the `authorization` header.

use crate::engine::source::{CustomField, FrontEntry, MemberPayload, RosterSource, SystemIdentity};

use super::ky_http::ApiClient;

/// Production REST base.
pub const DEFAULT_API_URL: &str = "https://api.apparyllis.com/v1/";

/// REST client for identity, custom fields, members and fronters.
pub struct PluralApi {
    client: ApiClient,
}

impl PluralApi {
    /// Builds a client for `base_url` authenticated with `token`.
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: ApiClient::new(base_url, Some(token))?,
        })
    }
}

impl RosterSource for PluralApi {
    async fn fetch_identity(&self) -> anyhow::Result<SystemIdentity> {
        self.client.get_json("me").await
    }

    async fn fetch_field_metadata(&self, system_id: &str) -> anyhow::Result<Vec<CustomField>> {
        self.client.get_json(&format!("customFields/{}", system_id)).await
    }

    async fn fetch_roster(&self, system_id: &str) -> anyhow::Result<Vec<MemberPayload>> {
        self.client.get_json(&format!("members/{}", system_id)).await
    }

    async fn fetch_initial_front(&self) -> anyhow::Result<Vec<FrontEntry>> {
        self.client.get_json("fronters/").await
    }
}
