use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{Profile, ProfileId},
    error::{ApiError, ApiException},
    protocol::{AllowedServiceRow, AreaFilter, CapacitySnapshotRow, RawActivityRecord},
};
use tracing::debug;

use crate::{config::ClientSettings, ClubBackend};

pub struct HttpClubBackend {
    http: Client,
    base_url: String,
}

impl HttpClubBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(settings.backend_url.as_str(), settings.request_timeout())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "backend request");
        let res = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to /{path} failed"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(ApiException::from(api_error).into());
            }
            return Err(anyhow!("/{path} returned {status}"));
        }

        res.json::<T>()
            .await
            .with_context(|| format!("invalid /{path} payload"))
    }
}

#[async_trait]
impl ClubBackend for HttpClubBackend {
    async fn list_profiles(&self, owner_id: &ProfileId) -> Result<Vec<Profile>> {
        self.get_json("profiles", &[("owner_id", owner_id.as_str())])
            .await
    }

    async fn list_enrollments(
        &self,
        profile_id: &ProfileId,
        area_filter: AreaFilter,
    ) -> Result<Vec<RawActivityRecord>> {
        self.get_json(
            "enrollments",
            &[
                ("profile_id", profile_id.as_str()),
                ("area", area_filter.as_query_value()),
            ],
        )
        .await
    }

    async fn list_cancelled_visits(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Vec<RawActivityRecord>> {
        self.get_json("cancelled-visits", &[("profile_id", profile_id.as_str())])
            .await
    }

    async fn list_capacity_snapshot(&self) -> Result<Vec<CapacitySnapshotRow>> {
        self.get_json("capacity", &[]).await
    }

    async fn list_allowed_services(&self) -> Result<Vec<AllowedServiceRow>> {
        self.get_json("allowed-services", &[]).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
