//! Trip history
//!
//! Trips uploaded from the on-board SD card, fetched from the trip-history API or generated
//! as demo data. Also date filtering and summary statistics; CSV reports live in `csv_export`.

pub mod csv_export;

use crate::config::TripSettings;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Devices that report real data. These never fall back to demo trips.
pub const REAL_TRUCKS: &[&str] = &["GJ-01-LIVE", "VAC13143", "MH-12-9988", "GJ-05-1122", "MH-04-5544"];

pub const DEMO_DEVICE: &str = "demo";

pub fn is_real_truck(device_id: &str) -> bool {
    REAL_TRUCKS.contains(&device_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceStatus {
    Passed,
    Failed,
    Warning,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Passed => "PASSED",
            ComplianceStatus::Failed => "FAILED",
            ComplianceStatus::Warning => "WARNING",
            ComplianceStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Numbers arrive either as JSON numbers or as preformatted strings ("45.20").
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer).map(|v| v.round() as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration: i64,
    /// Kilometres.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub distance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_temp: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_temp: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_temp: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: f64,
    #[serde(default)]
    pub start_location: String,
    #[serde(default)]
    pub end_location: String,
    #[serde(default)]
    pub vehicle_id: String,
    #[serde(default)]
    pub driver_id: String,
    #[serde(default)]
    pub farmer_id: String,
    #[serde(default)]
    pub compliance_status: ComplianceStatus,
    #[serde(default)]
    pub notes: String,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Five demo trips, one per day ending today, newest first.
pub fn generate_demo_trips_with<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Vec<TripRecord> {
    let mut trips: Vec<TripRecord> = (0..5)
        .map(|i| {
            let day = now - ChronoDuration::days(i);
            let hour = rng.gen_range(6..18);
            let minute = rng.gen_range(0..60);
            let start = day
                .with_hour(hour)
                .and_then(|d| d.with_minute(minute))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(day);
            let end = start + ChronoDuration::hours(rng.gen_range(2..6));
            let variation: f64 = rng.gen_range(-2.0..2.0);
            TripRecord {
                id: format!("TRIP_{}_{}", now.timestamp_millis(), i),
                start_time: start,
                end_time: end,
                duration: (end - start).num_minutes(),
                distance: round_to(rng.gen_range(20.0..100.0), 2),
                avg_temp: round_to(18.0 + variation, 1),
                max_temp: round_to(25.0 + variation, 1),
                min_temp: round_to(12.0 + variation, 1),
                humidity: rng.gen_range(50..80) as f64,
                start_location: "Farm A - Village".to_string(),
                end_location: "Market Hub - City".to_string(),
                vehicle_id: "TRUCK_001".to_string(),
                driver_id: "DRV_123".to_string(),
                farmer_id: "FARM_001".to_string(),
                compliance_status: ComplianceStatus::Passed,
                notes: "Automatic SD card upload from ESP32".to_string(),
            }
        })
        .collect();
    trips.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    trips
}

pub fn generate_demo_trips() -> Vec<TripRecord> {
    generate_demo_trips_with(&mut rand::thread_rng(), Utc::now())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripFilters {
    pub device_id: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: u32,
}

impl Default for TripFilters {
    fn default() -> Self {
        Self {
            device_id: DEMO_DEVICE.to_string(),
            date_from: None,
            date_to: None,
            limit: 50,
        }
    }
}

/// Trips plus whether they came from a live device, and a status line for reports.
#[derive(Debug, Clone, PartialEq)]
pub struct TripHistory {
    pub trips: Vec<TripRecord>,
    pub connected: bool,
    pub status: String,
}

impl TripHistory {
    fn demo(status: String) -> Self {
        Self {
            trips: generate_demo_trips(),
            connected: false,
            status,
        }
    }

    fn disconnected(status: String) -> Self {
        Self {
            trips: Vec::new(),
            connected: false,
            status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    trips: Vec<TripRecord>,
}

enum FetchFailure {
    NotFound,
    Status(reqwest::StatusCode),
    Unreachable(anyhow::Error),
}

pub struct TripHistoryClient {
    base_url: Url,
    client: reqwest::Client,
}

impl TripHistoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid trips API URL: {}", base_url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { base_url, client })
    }

    pub fn from_settings(settings: &TripSettings) -> Result<Self> {
        Self::new(&settings.api_base_url, Duration::from_secs(settings.timeout_secs))
    }

    /// `<base>/api/v1/trips/history?deviceId=..&limit=..[&dateFrom=..][&dateTo=..]`
    pub fn history_url(&self, filters: &TripFilters) -> Result<Url> {
        let mut url = self
            .base_url
            .join("/api/v1/trips/history")
            .context("Failed to build trips URL")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("deviceId", &filters.device_id);
            query.append_pair("limit", &filters.limit.to_string());
            if let Some(from) = filters.date_from {
                query.append_pair("dateFrom", &from.format("%Y-%m-%d").to_string());
            }
            if let Some(to) = filters.date_to {
                query.append_pair("dateTo", &to.format("%Y-%m-%d").to_string());
            }
        }
        Ok(url)
    }

    async fn request(&self, filters: &TripFilters) -> Result<Vec<TripRecord>, FetchFailure> {
        let url = self.history_url(filters).map_err(FetchFailure::Unreachable)?;
        debug!("Trips: GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Unreachable(e.into()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchFailure::NotFound);
        }
        if !status.is_success() {
            return Err(FetchFailure::Status(status));
        }
        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| FetchFailure::Unreachable(e.into()))?;
        Ok(body.trips)
    }

    /// Fetch trips for a device. Never fails: errors are folded into the status line.
    /// Unknown devices fall back to demo trips; real trucks report themselves disconnected.
    pub async fn fetch_trip_history(&self, filters: &TripFilters) -> TripHistory {
        let device = filters.device_id.as_str();
        if device == DEMO_DEVICE {
            return TripHistory::demo("Demo Data".to_string());
        }
        let real = is_real_truck(device);
        match self.request(filters).await {
            Ok(trips) => {
                info!("Trips: {} trip(s) from {}", trips.len(), device);
                TripHistory {
                    trips,
                    connected: true,
                    status: format!("Connected to {}", device),
                }
            }
            Err(failure) => {
                let real_status = match &failure {
                    FetchFailure::NotFound => {
                        warn!("Trips: device {} not found", device);
                        "Not Connected (Waiting for data)"
                    }
                    FetchFailure::Status(code) => {
                        warn!("Trips: API error for {}: HTTP {}", device, code);
                        "Connection Failed"
                    }
                    FetchFailure::Unreachable(e) => {
                        warn!("Trips: error connecting to {}: {:#}", device, e);
                        "Not Connected (No data available)"
                    }
                };
                if real {
                    TripHistory::disconnected(format!("{} - {}", device, real_status))
                } else {
                    TripHistory::demo(format!("{} - Demo Data", device))
                }
            }
        }
    }
}

/// Trips whose start time lies within `[from, to]`.
pub fn filter_by_date_range(trips: &[TripRecord], from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<TripRecord> {
    trips
        .iter()
        .filter(|t| t.start_time >= from && t.start_time <= to)
        .cloned()
        .collect()
}

/// Whole-day range for CLI date filters: `from` at 00:00:00, `to` at 23:59:59 UTC.
pub fn day_bounds(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let end = to
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|d| Utc.from_utc_datetime(&d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStats {
    pub total_trips: usize,
    pub total_distance: f64,
    pub total_duration: i64,
    /// Mean of the trips' average temperatures; `None` without trips.
    pub avg_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub compliance_passed: usize,
}

pub fn calculate_stats(trips: &[TripRecord]) -> TripStats {
    let n = trips.len();
    let (avg_temp, max_temp, min_temp) = if n == 0 {
        (None, None, None)
    } else {
        let avg = trips.iter().map(|t| t.avg_temp).sum::<f64>() / n as f64;
        let max = trips.iter().map(|t| t.max_temp).fold(f64::NEG_INFINITY, f64::max);
        let min = trips.iter().map(|t| t.min_temp).fold(f64::INFINITY, f64::min);
        (Some(round_to(avg, 1)), Some(round_to(max, 1)), Some(round_to(min, 1)))
    };
    TripStats {
        total_trips: n,
        total_distance: round_to(trips.iter().map(|t| t.distance).sum(), 2),
        total_duration: trips.iter().map(|t| t.duration).sum(),
        avg_temp,
        max_temp,
        min_temp,
        compliance_passed: trips
            .iter()
            .filter(|t| t.compliance_status == ComplianceStatus::Passed)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_demo_trips_newest_first() {
        let mut rng = SmallRng::seed_from_u64(8675309);
        let trips = generate_demo_trips_with(&mut rng, now());
        assert_eq!(trips.len(), 5);
        for pair in trips.windows(2) {
            assert!(pair[0].start_time > pair[1].start_time);
        }
        for t in &trips {
            assert!(t.end_time > t.start_time);
            assert_eq!(t.duration, (t.end_time - t.start_time).num_minutes());
            assert!((20.0..=100.0).contains(&t.distance));
            assert!((16.0..=20.0).contains(&t.avg_temp));
            assert_eq!(t.compliance_status, ComplianceStatus::Passed);
        }
        assert_eq!(trips[0].start_time.date_naive(), now().date_naive());
    }

    #[test]
    fn test_trip_parses_string_numbers() {
        let trip: TripRecord = serde_json::from_value(json!({
            "id": "TRIP_1",
            "startTime": "2024-06-09T08:15:00Z",
            "endTime": "2024-06-09T11:15:00Z",
            "duration": 180,
            "distance": "45.20",
            "avgTemp": "18.4",
            "maxTemp": 24.9,
            "minTemp": "12.1",
            "humidity": 61,
            "complianceStatus": "WARNING"
        }))
        .unwrap();
        assert_eq!(trip.distance, 45.2);
        assert_eq!(trip.avg_temp, 18.4);
        assert_eq!(trip.compliance_status, ComplianceStatus::Warning);
        assert!(trip.notes.is_empty());

        let odd: TripRecord = serde_json::from_value(json!({
            "id": "TRIP_2",
            "startTime": "2024-06-09T08:15:00Z",
            "endTime": "2024-06-09T11:15:00Z",
            "complianceStatus": "MAYBE"
        }))
        .unwrap();
        assert_eq!(odd.compliance_status, ComplianceStatus::Unknown);
    }

    #[test]
    fn test_filter_is_inclusive() {
        let mut rng = SmallRng::seed_from_u64(1);
        let trips = generate_demo_trips_with(&mut rng, now());
        let newest = trips[0].start_time;
        let oldest = trips[4].start_time;
        assert_eq!(filter_by_date_range(&trips, oldest, newest).len(), 5);
        assert_eq!(filter_by_date_range(&trips, newest, newest).len(), 1);

        let (from, to) = day_bounds(Some(now().date_naive()), Some(now().date_naive()));
        assert_eq!(filter_by_date_range(&trips, from, to).len(), 1);
    }

    #[test]
    fn test_stats() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut trips = generate_demo_trips_with(&mut rng, now());
        trips[0].compliance_status = ComplianceStatus::Failed;
        trips[1].max_temp = 31.0;
        trips[2].min_temp = 4.0;
        let stats = calculate_stats(&trips);
        assert_eq!(stats.total_trips, 5);
        assert_eq!(stats.compliance_passed, 4);
        assert_eq!(stats.max_temp, Some(31.0));
        assert_eq!(stats.min_temp, Some(4.0));
        assert_eq!(stats.total_duration, trips.iter().map(|t| t.duration).sum::<i64>());

        let empty = calculate_stats(&[]);
        assert_eq!(empty.total_trips, 0);
        assert_eq!(empty.avg_temp, None);
    }

    #[test]
    fn test_history_url() {
        let client = TripHistoryClient::new("http://localhost:8080", Duration::from_secs(1)).unwrap();
        let filters = TripFilters {
            device_id: "GJ-01-LIVE".to_string(),
            date_from: NaiveDate::from_ymd_opt(2024, 6, 1),
            date_to: None,
            limit: 20,
        };
        assert_eq!(
            client.history_url(&filters).unwrap().as_str(),
            "http://localhost:8080/api/v1/trips/history?deviceId=GJ-01-LIVE&limit=20&dateFrom=2024-06-01"
        );
    }

    #[tokio::test]
    async fn test_demo_device_and_fallbacks() {
        let client = TripHistoryClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();

        let demo = client.fetch_trip_history(&TripFilters::default()).await;
        assert_eq!(demo.status, "Demo Data");
        assert_eq!(demo.trips.len(), 5);
        assert!(!demo.connected);

        let real = client
            .fetch_trip_history(&TripFilters {
                device_id: "MH-12-9988".to_string(),
                ..TripFilters::default()
            })
            .await;
        assert!(real.trips.is_empty());
        assert_eq!(real.status, "MH-12-9988 - Not Connected (No data available)");

        let unknown = client
            .fetch_trip_history(&TripFilters {
                device_id: "TRUCK_042".to_string(),
                ..TripFilters::default()
            })
            .await;
        assert_eq!(unknown.status, "TRUCK_042 - Demo Data");
        assert_eq!(unknown.trips.len(), 5);
    }
}
