//! The `get_alerts` and `get_forecast` tools.

use std::sync::Arc;

use async_trait::async_trait;
use mcp::{ToolHandler, ToolRouter};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::nws::NwsClient;
use crate::report;

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> mcp::Result<T> {
    serde_json::from_value(arguments).map_err(|e| mcp::Error::InvalidArguments(e.to_string()))
}

/// Validate and normalize a two-letter US state code.
pub fn normalize_state(state: &str) -> mcp::Result<String> {
    let state = state.trim();
    if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(mcp::Error::InvalidArguments(format!(
            "state must be a two-letter code, got {state:?}"
        )));
    }
    Ok(state.to_ascii_uppercase())
}

#[derive(Debug, Deserialize)]
struct AlertsArgs {
    state: String,
}

#[derive(Debug, Deserialize)]
struct ForecastArgs {
    latitude: f64,
    longitude: f64,
}

/// Active weather alerts for a US state.
pub struct GetAlerts {
    client: Arc<NwsClient>,
}

impl GetAlerts {
    pub fn new(client: Arc<NwsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GetAlerts {
    fn name(&self) -> &str {
        "get_alerts"
    }

    fn description(&self) -> &str {
        "Get weather alerts for a US state. Takes a two-letter state code (e.g. CA, NY)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "state": {
                    "type": "string",
                    "description": "Two-letter US state code (e.g. CA, NY)"
                }
            },
            "required": ["state"]
        })
    }

    async fn invoke(&self, arguments: Value) -> mcp::Result<String> {
        let args: AlertsArgs = parse_args(arguments)?;
        let state = normalize_state(&args.state)?;
        let body = self.client.active_alerts(&state).await;
        Ok(report::alerts_report(body.as_ref()))
    }
}

/// Forecast for a latitude/longitude, via the points lookup.
pub struct GetForecast {
    client: Arc<NwsClient>,
}

impl GetForecast {
    pub fn new(client: Arc<NwsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GetForecast {
    fn name(&self) -> &str {
        "get_forecast"
    }

    fn description(&self) -> &str {
        "Get weather forecast for a location given its latitude and longitude."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number", "description": "Latitude of the location"},
                "longitude": {"type": "number", "description": "Longitude of the location"}
            },
            "required": ["latitude", "longitude"]
        })
    }

    async fn invoke(&self, arguments: Value) -> mcp::Result<String> {
        let args: ForecastArgs = parse_args(arguments)?;

        let Some(point) = self.client.point(args.latitude, args.longitude).await else {
            return Ok(report::POINT_UNAVAILABLE.to_string());
        };
        let Some(url) = report::forecast_url(&point) else {
            return Ok(report::POINT_UNAVAILABLE.to_string());
        };

        let forecast = self.client.fetch(url).await;
        Ok(report::forecast_report(forecast.as_ref()))
    }
}

/// Router with both weather tools sharing one client.
pub fn router(client: NwsClient) -> mcp::Result<ToolRouter> {
    let client = Arc::new(client);
    ToolRouter::new()
        .with(GetAlerts::new(Arc::clone(&client)))?
        .with(GetForecast::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        ALERTS_UNAVAILABLE, FORECAST_UNAVAILABLE, NO_ACTIVE_ALERTS, POINT_UNAVAILABLE,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_client(server: &MockServer) -> Arc<NwsClient> {
        Arc::new(NwsClient::with_base_url(server.uri()).unwrap())
    }

    fn periods(count: usize) -> Value {
        let periods: Vec<_> = (1..=count)
            .map(|n| {
                json!({
                    "name": format!("Period {n}"),
                    "temperature": 70,
                    "temperatureUnit": "F",
                    "windSpeed": "10 mph",
                    "windDirection": "S",
                    "detailedForecast": "Sunny."
                })
            })
            .collect();
        json!({"properties": {"periods": periods}})
    }

    #[test]
    fn state_codes_are_normalized() {
        assert_eq!(normalize_state("ca").unwrap(), "CA");
        assert_eq!(normalize_state(" ny ").unwrap(), "NY");
        for bad in ["", "C", "CAL", "C1", "é"] {
            assert!(
                matches!(normalize_state(bad), Err(mcp::Error::InvalidArguments(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn alerts_query_uses_uppercase_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts/active/area/TX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [{"properties": {"event": "Heat Advisory", "areaDesc": "Travis"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = GetAlerts::new(mock_client(&server).await);
        let text = tool.invoke(json!({"state": "tx"})).await.unwrap();
        assert!(text.contains("Event: Heat Advisory"));
        assert!(text.contains("Area: Travis"));
    }

    #[tokio::test]
    async fn no_alerts_and_unreachable_upstream_differ() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts/active/area/VT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alerts/active/area/ME"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = GetAlerts::new(mock_client(&server).await);
        assert_eq!(tool.invoke(json!({"state": "VT"})).await.unwrap(), NO_ACTIVE_ALERTS);
        assert_eq!(tool.invoke(json!({"state": "ME"})).await.unwrap(), ALERTS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn invalid_alert_arguments_are_rejected() {
        let server = MockServer::start().await;
        let tool = GetAlerts::new(mock_client(&server).await);

        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, mcp::Error::InvalidArguments(_)));
        let err = tool.invoke(json!({"state": "California"})).await.unwrap_err();
        assert!(matches!(err, mcp::Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn forecast_follows_points_url_and_keeps_five_periods() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/points/40.7128,-74.006"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {"forecast": format!("{}/gridpoints/OKX/33,35/forecast", server.uri())}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gridpoints/OKX/33,35/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(periods(14)))
            .expect(1)
            .mount(&server)
            .await;

        let tool = GetForecast::new(mock_client(&server).await);
        let text = tool
            .invoke(json!({"latitude": 40.7128, "longitude": -74.006}))
            .await
            .unwrap();

        assert_eq!(text.split("\n---\n").count(), 5);
        assert!(text.contains("Period 5:"));
        assert!(!text.contains("Period 6:"));
    }

    #[tokio::test]
    async fn forecast_failures_map_to_distinct_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/points/1,1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/points/2,2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {"forecast": format!("{}/broken", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = GetForecast::new(mock_client(&server).await);
        let unavailable = tool.invoke(json!({"latitude": 1, "longitude": 1})).await.unwrap();
        assert_eq!(unavailable, POINT_UNAVAILABLE);
        let broken = tool.invoke(json!({"latitude": 2, "longitude": 2})).await.unwrap();
        assert_eq!(broken, FORECAST_UNAVAILABLE);
    }

    #[tokio::test]
    async fn router_registers_both_tools() {
        let router = router(NwsClient::new().unwrap()).unwrap();
        let names: Vec<_> = router.definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_alerts", "get_forecast"]);
    }
}
