//! Access to the IMS "envista" weather network.

use crate::types::station::Station;
use crate::weather::error::WeatherError;
use chrono::NaiveDate;
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Date format of the `from`/`to` query parameters.
const QUERY_DATE_FORMAT: &str = "%Y/%m/%d";

/// The source of station metadata and station time series.
///
/// [`ImsClient`] talks to the real network; tests and offline runs can supply
/// any other implementation.
pub trait WeatherProvider: Send + Sync {
    /// Every station of the network.
    fn stations(&self) -> impl Future<Output = Result<Vec<Station>, WeatherError>> + Send;

    /// All readings of one station between `from` and `to` (both `YYYY/MM/DD`
    /// days, as understood by the provider).
    fn station_data(
        &self,
        station_id: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<TimeSeries, WeatherError>> + Send;
}

/// Readings of one station, one entry per reporting interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub data: Vec<TimeSeriesEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesEntry {
    /// RFC 3339 timestamp with the local Israel offset, e.g. `2024-02-01T12:00:00+02:00`.
    pub datetime: String,
    #[serde(default)]
    pub channels: Vec<ChannelReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    pub name: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub valid: bool,
}

/// HTTP client for `api.ims.gov.il`.
#[derive(Debug, Clone)]
pub struct ImsClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ImsClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.ims.gov.il";

    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn stations_url(&self) -> String {
        format!("{}/v1/envista/stations", self.base_url)
    }

    fn station_data_url(&self, station_id: u32) -> String {
        format!("{}/v1/envista/stations/{}/data", self.base_url, station_id)
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Response, WeatherError> {
        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| WeatherError::NetworkRequest(url.to_string(), e))
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        url: &str,
        response: Response,
    ) -> Result<T, WeatherError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WeatherError::NetworkRequest(url.to_string(), e))?;
        serde_json::from_slice(&bytes).map_err(|source| WeatherError::JsonParse {
            url: url.to_string(),
            source,
        })
    }
}

impl WeatherProvider for ImsClient {
    async fn stations(&self) -> Result<Vec<Station>, WeatherError> {
        let url = self.stations_url();
        info!("Fetching station list from {}", url);
        let response = self.send(&url, &[]).await?;
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                if let Some(status) = e.status() {
                    return Err(WeatherError::HttpStatus {
                        url,
                        status,
                        source: e,
                    });
                } else {
                    return Err(WeatherError::NetworkRequest(url, e));
                }
            }
        };
        let stations: Vec<Station> = Self::parse_json(&url, response).await?;
        info!("Received {} stations", stations.len());
        Ok(stations)
    }

    async fn station_data(
        &self,
        station_id: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<TimeSeries, WeatherError> {
        let url = self.station_data_url(station_id);
        let query = [
            ("from", from.format(QUERY_DATE_FORMAT).to_string()),
            ("to", to.format(QUERY_DATE_FORMAT).to_string()),
        ];
        info!(
            "Requesting station {} data from {} to {}",
            station_id, query[0].1, query[1].1
        );
        let response = self.send(&url, &query).await?;

        // Stations without data for the window answer 204, or an error status.
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!("Station {} has no data for the requested window", station_id);
            return Ok(TimeSeries::default());
        }
        if !status.is_success() {
            warn!("Station {} answered with status {}", station_id, status);
            return Ok(TimeSeries::default());
        }
        Self::parse_json(&url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn urls_are_built_from_the_base() {
        let client = ImsClient::new("https://example.test/", None);
        assert_eq!(client.base_url(), "https://example.test");
        assert_eq!(client.stations_url(), "https://example.test/v1/envista/stations");
        assert_eq!(
            client.station_data_url(178),
            "https://example.test/v1/envista/stations/178/data"
        );
    }

    #[test]
    fn time_series_deserializes_provider_payload() {
        let payload = r#"{
            "stationId": 178,
            "data": [
                {
                    "datetime": "2024-02-01T12:00:00+02:00",
                    "channels": [
                        {"id": 1, "name": "Rain", "alias": null, "value": 0.2, "status": 1, "valid": true, "description": null},
                        {"id": 7, "name": "TD", "alias": null, "value": 14.9, "status": 2, "valid": false, "description": null}
                    ]
                }
            ]
        }"#;
        let series: TimeSeries = serde_json::from_str(payload).unwrap();
        assert_eq!(series.data.len(), 1);
        let channels = &series.data[0].channels;
        assert_eq!(channels[0].name, "Rain");
        assert_eq!(channels[0].value, Some(0.2));
        assert!(channels[0].valid);
        assert!(!channels[1].valid);
    }

    #[test]
    fn empty_payload_has_no_entries() {
        let series: TimeSeries = serde_json::from_str("{}").unwrap();
        assert!(series.data.is_empty());
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn station_list_is_requested_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"stationId": 178, "name": "TEL AVIV COAST", "active": true,
                 "location": {"latitude": 32.058, "longitude": 34.759}},
                {"stationId": 2, "name": "NO POSITION", "active": false,
                 "location": {"latitude": null, "longitude": null}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), Some("secret".into()));

        let stations = client.stations().await.unwrap();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].station_id, 178);
        assert_eq!(stations[0].location.latitude, Some(32.058));
        assert_eq!(stations[1].coordinates(), None);
    }

    #[tokio::test]
    async fn station_list_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), Some("expired".into()));

        let err = client.stations().await.unwrap_err();

        assert!(matches!(
            err,
            WeatherError::HttpStatus { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[tokio::test]
    async fn malformed_station_list_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), None);

        let err = client.stations().await.unwrap_err();

        assert!(matches!(err, WeatherError::JsonParse { .. }));
    }

    #[tokio::test]
    async fn station_data_asks_for_the_day_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations/178/data"))
            .and(header("authorization", "Bearer secret"))
            .and(query_param("from", "2024/02/01"))
            .and(query_param("to", "2024/02/04"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stationId": 178,
                "data": [{
                    "datetime": "2024-02-01T12:00:00+02:00",
                    "channels": [{"name": "TD", "value": 14.9, "valid": true}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), Some("secret".into()));

        let series = client
            .station_data(178, day(2024, 2, 1), day(2024, 2, 4))
            .await
            .unwrap();

        assert_eq!(series.data.len(), 1);
        assert_eq!(series.data[0].datetime, "2024-02-01T12:00:00+02:00");
        assert_eq!(series.data[0].channels[0].value, Some(14.9));
    }

    #[tokio::test]
    async fn no_content_means_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations/5/data"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), None);

        let series = client
            .station_data(5, day(2023, 7, 15), day(2023, 7, 16))
            .await
            .unwrap();

        assert!(series.data.is_empty());
    }

    #[tokio::test]
    async fn error_status_for_station_data_means_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/envista/stations/9/data"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        let client = ImsClient::new(server.uri(), None);

        let series = client
            .station_data(9, day(2023, 7, 15), day(2023, 7, 16))
            .await
            .unwrap();

        assert_eq!(series, TimeSeries::default());
    }
}
