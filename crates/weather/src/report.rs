//! Turns NWS GeoJSON into the plain-text reports the tools return.

use serde_json::Value;

pub const ALERTS_UNAVAILABLE: &str = "Unable to fetch alerts or no alerts found.";
pub const NO_ACTIVE_ALERTS: &str = "No active alerts for this state.";
pub const POINT_UNAVAILABLE: &str = "Unable to fetch forecast data for this location.";
pub const FORECAST_UNAVAILABLE: &str = "Unable to fetch detailed forecast.";

/// Forecast periods included in a report.
pub const MAX_PERIODS: usize = 5;

const SEPARATOR: &str = "\n---\n";

fn field<'a>(props: &'a Value, key: &str, default: &'a str) -> &'a str {
    props.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Render one alert feature.
pub fn format_alert(feature: &Value) -> String {
    let props = &feature["properties"];
    format!(
        "\nEvent: {}\nArea: {}\nSeverity: {}\nDescription: {}\nInstructions: {}\n",
        field(props, "event", "Unknown"),
        field(props, "areaDesc", "Unknown"),
        field(props, "severity", "Unknown"),
        field(props, "description", "No description available"),
        field(props, "instruction", "No specific instructions provided"),
    )
}

/// Render one forecast period.
pub fn format_period(period: &Value) -> String {
    let scalar = |key: &str| match &period[key] {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    };
    format!(
        "\n{}:\nTemperature: {}°{}\nWind: {} {}\nForecast: {}\n",
        scalar("name"),
        scalar("temperature"),
        scalar("temperatureUnit"),
        scalar("windSpeed"),
        scalar("windDirection"),
        scalar("detailedForecast"),
    )
}

/// Report for an alerts response; `None` means the fetch failed.
pub fn alerts_report(response: Option<&Value>) -> String {
    let Some(features) = response
        .and_then(|body| body.get("features"))
        .and_then(Value::as_array)
    else {
        return ALERTS_UNAVAILABLE.to_string();
    };

    if features.is_empty() {
        return NO_ACTIVE_ALERTS.to_string();
    }

    features
        .iter()
        .map(format_alert)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Forecast URL from a points response.
pub fn forecast_url(point: &Value) -> Option<&str> {
    point["properties"]["forecast"].as_str()
}

/// Report for a forecast response; `None` means the fetch failed.
pub fn forecast_report(response: Option<&Value>) -> String {
    let Some(periods) = response
        .and_then(|body| body["properties"]["periods"].as_array())
    else {
        return FORECAST_UNAVAILABLE.to_string();
    };

    periods
        .iter()
        .take(MAX_PERIODS)
        .map(format_period)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
