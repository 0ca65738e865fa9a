//! Radio Browser API client (<https://www.radio-browser.info/>).

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use skywave_proto::config::CatalogConfig;
use skywave_proto::country;
use skywave_proto::protocol::{CatalogQuery, RegionEntry, Station};
use tracing::debug;

use super::{CatalogClient, CatalogResult, CountryCount};
use crate::error::CatalogError;

#[derive(Debug, Deserialize)]
struct RbStation {
    stationuuid: String,
    name: String,
    #[serde(default)]
    url_resolved: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    homepage: String,
    #[serde(default)]
    favicon: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    countrycode: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    codec: String,
    #[serde(default)]
    bitrate: u32,
}

#[derive(Debug, Deserialize)]
struct RbCountry {
    name: String,
    #[serde(default)]
    stationcount: u32,
}

#[derive(Debug, Deserialize)]
struct RbState {
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    stationcount: u32,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl From<RbStation> for Station {
    fn from(rb: RbStation) -> Self {
        let stream_url = if rb.url_resolved.trim().is_empty() {
            rb.url
        } else {
            rb.url_resolved
        };

        Station {
            id: rb.stationuuid,
            name: rb.name.trim().to_string(),
            stream_url: stream_url.trim().to_string(),
            homepage_url: non_empty(&rb.homepage),
            favicon_url: non_empty(&rb.favicon),
            country_code: non_empty(&rb.countrycode).map(|c| c.to_ascii_uppercase()),
            language: non_empty(&rb.language),
            tags: non_empty(&rb.tags),
            codec: non_empty(&rb.codec),
            bitrate_kbps: (rb.bitrate > 0).then_some(rb.bitrate),
        }
    }
}

impl From<RbState> for RegionEntry {
    fn from(rb: RbState) -> Self {
        // The API names the country in full; resolve it so callers can
        // filter by code.
        let country_code = country::resolve(&rb.country).unwrap_or(rb.country);
        RegionEntry {
            name: rb.name.trim().to_string(),
            country_code,
            station_count: rb.stationcount,
        }
    }
}

fn search_params(query: &CatalogQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let mut push = |key: &'static str, value: &Option<String>| {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            params.push((key, v.to_string()));
        }
    };
    push("name", &query.name);
    push("countrycode", &query.country_code);
    push("language", &query.language);
    push("tag", &query.tag);
    push("codec", &query.codec);

    if let Some(min) = query.bitrate_min {
        params.push(("bitrateMin", min.to_string()));
    }
    if let Some(max) = query.bitrate_max {
        params.push(("bitrateMax", max.to_string()));
    }
    if query.is_https {
        params.push(("is_https", "true".to_string()));
    }
    params.push(("order", query.order.as_str().to_string()));
    params.push(("reverse", query.reverse.to_string()));
    params.push(("hidebroken", query.hide_broken.to_string()));
    params.push(("limit", query.limit.to_string()));
    params.push(("offset", query.offset.to_string()));
    params
}

fn paged_params(limit: usize, offset: usize) -> Vec<(&'static str, String)> {
    vec![
        ("limit", limit.to_string()),
        ("offset", offset.to_string()),
        ("order", "clickcount".to_string()),
        ("reverse", "true".to_string()),
        ("hidebroken", "true".to_string()),
    ]
}

pub struct RadioBrowserClient {
    client: reqwest::Client,
    base_url: String,
}

impl RadioBrowserClient {
    /// Build a client against one of the configured mirrors, picked at random.
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let base_url = config
            .servers
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no catalog servers configured"))?;
        Self::with_base_url(
            base_url,
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base/json/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> CatalogResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CatalogError::Other(format!("bad catalog server URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::Other("catalog server URL cannot have a path".into()))?
            .pop_if_empty()
            .push("json")
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        params: &[(&str, String)],
    ) -> CatalogResult<T> {
        debug!("catalog: GET {}", url);
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::from_status(status.as_u16(), &body));
        }
        Ok(response.json::<T>().await?)
    }

    async fn stations(
        &self,
        url: reqwest::Url,
        params: &[(&str, String)],
    ) -> CatalogResult<Vec<Station>> {
        let raw: Vec<RbStation> = self.get_json(url, params).await?;
        Ok(raw.into_iter().map(Station::from).collect())
    }
}

#[async_trait]
impl CatalogClient for RadioBrowserClient {
    async fn top_clicked(&self, count: usize) -> CatalogResult<Vec<Station>> {
        let count = count.to_string();
        let url = self.endpoint(&["stations", "topclick", &count])?;
        self.stations(url, &[("hidebroken", "true".to_string())])
            .await
    }

    async fn search(&self, query: &CatalogQuery) -> CatalogResult<Vec<Station>> {
        let url = self.endpoint(&["stations", "search"])?;
        self.stations(url, &search_params(query)).await
    }

    async fn stations_by_country_code(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>> {
        let url = self.endpoint(&["stations", "bycountrycodeexact", code])?;
        self.stations(url, &paged_params(limit, offset)).await
    }

    async fn stations_by_region(
        &self,
        name: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>> {
        let url = self.endpoint(&["stations", "bystateexact", name])?;
        self.stations(url, &paged_params(limit, offset)).await
    }

    async fn countries(&self) -> CatalogResult<Vec<CountryCount>> {
        let url = self.endpoint(&["countries"])?;
        let raw: Vec<RbCountry> = self
            .get_json(
                url,
                &[
                    ("order", "name".to_string()),
                    ("hidebroken", "true".to_string()),
                ],
            )
            .await?;
        Ok(raw
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .map(|c| CountryCount {
                name: c.name.trim().to_string(),
                station_count: c.stationcount,
            })
            .collect())
    }

    async fn regions(&self, country_code: &str) -> CatalogResult<Vec<RegionEntry>> {
        debug!("catalog: regions for {}", country_code);
        let url = self.endpoint(&["states"])?;
        let raw: Vec<RbState> = self
            .get_json(
                url,
                &[
                    ("order", "name".to_string()),
                    ("hidebroken", "true".to_string()),
                ],
            )
            .await?;
        Ok(raw.into_iter().map(RegionEntry::from).collect())
    }

    async fn record_interaction(&self, station_id: &str) -> CatalogResult<()> {
        let url = self.endpoint(&["url", station_id])?;
        let _: serde_json::Value = self.get_json(url, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywave_proto::protocol::SortOrder;

    fn sample_rb_station() -> RbStation {
        RbStation {
            stationuuid: "abc-123".to_string(),
            name: " Test Radio ".to_string(),
            url_resolved: "http://stream.test.com/live".to_string(),
            url: "http://test.com/stream.pls".to_string(),
            homepage: "http://test.com".to_string(),
            favicon: String::new(),
            tags: "rock,pop".to_string(),
            countrycode: "de".to_string(),
            language: "german".to_string(),
            codec: "MP3".to_string(),
            bitrate: 128,
        }
    }

    fn client() -> RadioBrowserClient {
        RadioBrowserClient::with_base_url(
            "https://de1.api.radio-browser.info/",
            "skywave-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_station_conversion() {
        let station: Station = sample_rb_station().into();
        assert_eq!(station.id, "abc-123");
        assert_eq!(station.name, "Test Radio");
        assert_eq!(station.stream_url, "http://stream.test.com/live");
        assert_eq!(station.country_code.as_deref(), Some("DE"));
        assert_eq!(station.favicon_url, None);
        assert_eq!(station.bitrate_kbps, Some(128));
    }

    #[test]
    fn test_station_falls_back_to_url() {
        let mut rb = sample_rb_station();
        rb.url_resolved = "  ".to_string();
        rb.bitrate = 0;
        let station: Station = rb.into();
        assert_eq!(station.stream_url, "http://test.com/stream.pls");
        assert_eq!(station.bitrate_kbps, None);
    }

    #[test]
    fn test_region_resolves_country_name() {
        let region: RegionEntry = RbState {
            name: "Bavaria".into(),
            country: "Germany".into(),
            stationcount: 12,
        }
        .into();
        assert_eq!(region.country_code, "DE");

        let unknown: RegionEntry = RbState {
            name: "Somewhere".into(),
            country: "Atlantis".into(),
            stationcount: 1,
        }
        .into();
        assert_eq!(unknown.country_code, "Atlantis");
    }

    #[test]
    fn test_search_params_skip_unset_filters() {
        let query = CatalogQuery {
            name: Some(" jazz ".into()),
            tag: Some("".into()),
            bitrate_min: Some(128),
            order: SortOrder::Votes,
            reverse: true,
            ..CatalogQuery::default()
        }
        .with_page(50, 100);
        let params = search_params(&query);
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("name"), Some("jazz"));
        assert_eq!(get("tag"), None);
        assert_eq!(get("bitrateMin"), Some("128"));
        assert_eq!(get("order"), Some("votes"));
        assert_eq!(get("reverse"), Some("true"));
        assert_eq!(get("hidebroken"), Some("true"));
        assert_eq!(get("offset"), Some("100"));
        assert_eq!(get("is_https"), None);
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client();
        assert_eq!(c.base_url(), "https://de1.api.radio-browser.info");
        let url = c.endpoint(&["stations", "bystateexact", "Île-de-France"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://de1.api.radio-browser.info/json/stations/bystateexact/%C3%8Ele-de-France"
        );
        let url = c.endpoint(&["stations", "topclick", "50"]).unwrap();
        assert_eq!(url.path(), "/json/stations/topclick/50");
    }

    fn local_client(base_url: String) -> RadioBrowserClient {
        RadioBrowserClient::with_base_url(base_url, "skywave-test", Duration::from_secs(5)).unwrap()
    }

    async fn top_clicked_with_status(status: u16, body: &str) -> CatalogResult<Vec<Station>> {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/topclick/10"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        local_client(server.uri()).top_clicked(10).await
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = local_client(format!("http://{}", addr)).top_clicked(10).await;
        assert_eq!(result, Err(CatalogError::ServerUnavailable));
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        assert_eq!(
            top_clicked_with_status(404, "").await,
            Err(CatalogError::NotFound)
        );
        assert_eq!(
            top_clicked_with_status(429, "slow down").await,
            Err(CatalogError::RateLimited)
        );
        assert_eq!(
            top_clicked_with_status(503, "").await,
            Err(CatalogError::ServerUnavailable)
        );
        assert_eq!(
            top_clicked_with_status(400, " bad limit ").await,
            Err(CatalogError::InvalidRequest("bad limit".into()))
        );
        assert!(matches!(
            top_clicked_with_status(418, "").await,
            Err(CatalogError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_top_clicked_parses_listing() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/topclick/10"))
            .and(query_param("hidebroken", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "stationuuid": "abc-123",
                    "name": "Test Radio",
                    "url_resolved": "http://stream.test.com/live",
                    "countrycode": "DE",
                    "bitrate": 128
                }
            ])))
            .mount(&server)
            .await;

        let stations = local_client(server.uri()).top_clicked(10).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "abc-123");
        assert_eq!(stations[0].stream_url, "http://stream.test.com/live");
        assert_eq!(stations[0].country_code.as_deref(), Some("DE"));
    }
}
