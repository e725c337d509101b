// src/store/http.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::StoreError;
use crate::store::{NewRegion, RegionApi, RegionPatch, RegionRecord};

/// Region API over the product's JSON routes. Authentication rides on the
/// client (cookies or a bearer header configured by the host).
pub struct HttpRegionApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    regions: Vec<RegionRecord>,
}

#[derive(Deserialize)]
struct CreatedRegion {
    id: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    region: CreatedRegion,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl HttpRegionApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn regions_url(&self, track_id: &str) -> String {
        format!("{}/api/songs/{}/regions", self.base_url, track_id)
    }

    fn region_url(&self, id: &str) -> String {
        format!("{}/api/regions/{}", self.base_url, id)
    }
}

/// Non-2xx becomes `Rejected` with the body's `error` string when there is one.
async fn check(res: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body: ErrorBody = res.json().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message: body
            .error
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    })
}

#[async_trait]
impl RegionApi for HttpRegionApi {
    async fn list(&self, track_id: &str) -> Result<Vec<RegionRecord>, StoreError> {
        let res = self.client.get(self.regions_url(track_id)).send().await?;
        let body: ListResponse = check(res).await?.json().await?;
        let mut regions = body.regions;
        regions.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        Ok(regions)
    }

    async fn create(&self, track_id: &str, region: &NewRegion) -> Result<String, StoreError> {
        let res = self
            .client
            .post(self.regions_url(track_id))
            .json(region)
            .send()
            .await?;
        let body: CreateResponse = check(res).await?.json().await?;
        Ok(body.region.id)
    }

    async fn update(&self, id: &str, patch: &RegionPatch) -> Result<(), StoreError> {
        let res = self.client.put(self.region_url(id)).json(patch).send().await?;
        check(res).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let res = self.client.delete(self.region_url(id)).send().await?;
        check(res).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_the_region_routes() {
        let api = HttpRegionApi::with_client(reqwest::Client::new(), "https://example.test/");
        assert_eq!(
            api.regions_url("song-9"),
            "https://example.test/api/songs/song-9/regions"
        );
        assert_eq!(api.region_url("abc"), "https://example.test/api/regions/abc");
    }

    #[test]
    fn list_body_parses() {
        let body: ListResponse = serde_json::from_str(
            r#"{ "ok": true, "regions": [ { "id": "1", "label": "Verse", "start_sec": 2.0, "end_sec": 6.0, "loop": true } ] }"#,
        )
        .unwrap();
        assert_eq!(body.regions.len(), 1);
        assert!(body.regions[0].looped);
    }

    #[test]
    fn create_body_parses() {
        let body: CreateResponse =
            serde_json::from_str(r#"{ "ok": true, "region": { "id": "r-1", "label": null } }"#).unwrap();
        assert_eq!(body.region.id, "r-1");
    }
}
