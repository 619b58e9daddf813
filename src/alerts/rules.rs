//! Alert rule evaluation

use super::{AlertKind, Notification, Severity};
use crate::liveness::Liveness;
use crate::telemetry::VehicleTelemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor limits. Breaching any of them raises an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorThresholds {
    /// Temperature above this (°C) is critical.
    pub temperature_max_c: f64,
    /// Humidity below this (%) is a warning.
    pub humidity_min_pct: f64,
    /// Shock above this (G) is critical.
    pub shock_max_g: f64,
}

impl Default for SensorThresholds {
    fn default() -> Self {
        Self {
            temperature_max_c: 30.0,
            humidity_min_pct: 40.0,
            shock_max_g: 2.0,
        }
    }
}

impl SensorThresholds {
    pub fn rules(&self) -> Vec<AlertRule> {
        vec![
            AlertRule::TemperatureHigh {
                threshold: self.temperature_max_c,
            },
            AlertRule::HumidityLow {
                threshold: self.humidity_min_pct,
            },
            AlertRule::ShockHigh {
                threshold: self.shock_max_g,
            },
        ]
    }
}

/// Alert context (data passed to rule evaluation)
#[derive(Debug, Clone)]
pub struct AlertContext<'a> {
    pub vehicle: &'a VehicleTelemetry,
    pub liveness: Liveness,
    pub now: DateTime<Utc>,
}

/// Alert rule types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertRule {
    /// Temperature > N°C
    TemperatureHigh { threshold: f64 },
    /// Humidity < N%
    HumidityLow { threshold: f64 },
    /// Shock > N G (after clamping)
    ShockHigh { threshold: f64 },
    /// No report within the liveness threshold
    ConnectionLost,
}

impl AlertRule {
    /// Evaluate rule against context; `Some` when it fires.
    pub fn evaluate(&self, context: &AlertContext<'_>) -> Option<Notification> {
        let vehicle = context.vehicle;
        let truck = vehicle.truck_id.as_str();
        match self {
            AlertRule::TemperatureHigh { threshold } => {
                let temp = vehicle.temperature_or_default();
                (temp > *threshold).then(|| {
                    let reading = format_reading(temp);
                    Notification::new(
                        AlertKind::Temperature,
                        truck,
                        format!("High temperature {}°C", reading),
                        format!("{}°C", reading),
                        Severity::Critical,
                        context.now,
                    )
                })
            }
            AlertRule::HumidityLow { threshold } => {
                let humidity = vehicle.humidity_or_default();
                (humidity < *threshold).then(|| {
                    let reading = format_reading(humidity);
                    Notification::new(
                        AlertKind::Humidity,
                        truck,
                        format!("Low humidity {}%", reading),
                        format!("{}%", reading),
                        Severity::Warning,
                        context.now,
                    )
                })
            }
            AlertRule::ShockHigh { threshold } => {
                let shock = vehicle.shock_clamped();
                (shock > *threshold).then(|| {
                    Notification::new(
                        AlertKind::Shock,
                        truck,
                        format!("High shock {:.2}G", shock),
                        format!("{:.2}G", shock),
                        Severity::Critical,
                        context.now,
                    )
                })
            }
            AlertRule::ConnectionLost => {
                (context.liveness == Liveness::Offline).then(|| connection_alert(truck, context.now))
            }
        }
    }
}

/// Critical fleet alert for a vehicle that stopped reporting.
pub fn connection_alert(truck: &str, now: DateTime<Utc>) -> Notification {
    Notification::new(
        AlertKind::Connection,
        truck,
        format!("{}: connection lost / no signal", truck),
        "Offline".to_string(),
        Severity::Critical,
        now,
    )
}

/// An offline vehicle only raises the connection alert; its last sensor values are stale.
pub fn evaluate_vehicle(thresholds: &SensorThresholds, context: &AlertContext<'_>) -> Vec<Notification> {
    if context.liveness == Liveness::Offline {
        return AlertRule::ConnectionLost.evaluate(context).into_iter().collect();
    }
    thresholds
        .rules()
        .iter()
        .filter_map(|rule| rule.evaluate(context))
        .collect()
}

/// Reading as reported, no rounding (31 -> "31", 35.555 -> "35.555").
fn format_reading(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vehicle(doc: serde_json::Value) -> VehicleTelemetry {
        VehicleTelemetry::from_document("GJ-01-LIVE", &doc)
    }

    fn online(v: &VehicleTelemetry) -> AlertContext<'_> {
        AlertContext {
            vehicle: v,
            liveness: Liveness::Online,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_temperature_breach_is_single_critical_alert() {
        let v = vehicle(json!({"sensors": {"temp": 31, "humidity": 60}}));
        let alerts = evaluate_vehicle(&SensorThresholds::default(), &online(&v));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "temp-GJ-01-LIVE");
        assert_eq!(alerts[0].kind, AlertKind::Temperature);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].value, "31°C");
    }

    #[test]
    fn test_limits_are_exclusive() {
        let v = vehicle(json!({"sensors": {"temp": 30, "humidity": 40}, "shock": 2.0}));
        assert!(evaluate_vehicle(&SensorThresholds::default(), &online(&v)).is_empty());
    }

    #[test]
    fn test_humidity_and_shock() {
        let v = vehicle(json!({"sensors": {"temp": 20, "humidity": 35}, "shock": 7.3}));
        let alerts = evaluate_vehicle(&SensorThresholds::default(), &online(&v));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::Humidity);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].message, "Low humidity 35%");
        assert_eq!(alerts[1].kind, AlertKind::Shock);
        assert_eq!(alerts[1].value, "2.50G");
    }

    #[test]
    fn test_readings_are_not_rounded() {
        let v = vehicle(json!({"sensors": {"temp": 31.125, "humidity": 35.555}}));
        let alerts = evaluate_vehicle(&SensorThresholds::default(), &online(&v));
        assert_eq!(alerts[0].value, "31.125°C");
        assert_eq!(alerts[1].message, "Low humidity 35.555%");
        assert_eq!(alerts[1].value, "35.555%");
    }

    #[test]
    fn test_offline_only_raises_connection_alert() {
        let v = vehicle(json!({"sensors": {"temp": 45}}));
        let ctx = AlertContext {
            vehicle: &v,
            liveness: Liveness::Offline,
            now: Utc::now(),
        };
        let alerts = evaluate_vehicle(&SensorThresholds::default(), &ctx);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "offline-GJ-01-LIVE");
        assert_eq!(alerts[0].category, super::super::Category::Fleet);
        assert_eq!(alerts[0].value, "Offline");
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = SensorThresholds {
            temperature_max_c: 8.0,
            ..SensorThresholds::default()
        };
        let v = vehicle(json!({"sensors": {"temp": 8.25}}));
        let alerts = evaluate_vehicle(&thresholds, &online(&v));
        assert_eq!(alerts[0].message, "High temperature 8.25°C");
    }
}
