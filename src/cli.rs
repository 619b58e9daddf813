//! CLI subcommands. Parsed by main and passed to `run()`.

use crate::alerts::Notification;
use crate::config::{Config, Settings};
use crate::liveness::SystemClock;
use crate::logging::ellipse;
use crate::monitor::{self, FleetMonitor, FleetStatus};
use crate::store::{Role, StateStore, UserSession};
use crate::telemetry::source::SnapshotSource;
use crate::translate::{self, auto::AutoTranslator};
use crate::trips::csv_export::{generate_csv_content, save_csv, CsvOptions};
use crate::trips::{calculate_stats, day_bounds, filter_by_date_range, TripFilters, TripHistoryClient};
use chrono::NaiveDate;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the monitor loop until Ctrl-C
    Watch {
        /// Evaluate one snapshot, deliver its alerts and exit
        #[arg(long)]
        once: bool,
    },
    /// Fetch one snapshot and print per-vehicle liveness
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Evaluate one snapshot and list the alerts a role would see
    Alerts {
        /// farmer|driver|transporter|admin (defaults to the logged-in role)
        #[arg(long)]
        role: Option<Role>,
    },
    /// Fetch trip history, print statistics and export a CSV report
    Trips {
        #[arg(long, default_value = "demo")]
        device: String,
        /// Report language (defaults to the saved language)
        #[arg(long)]
        lang: Option<String>,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
        /// Write the CSV here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Machine-translate English text
    Translate {
        lang: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Save a user session (its e-mail becomes the alert recipient)
    Login {
        name: String,
        email: String,
        role: Role,
    },
    Logout,
    /// Show or set the UI/report language
    Lang {
        code: Option<String>,
    },
    /// Show or set the fallback alert recipient
    Recipient {
        email: Option<String>,
    },
    /// Translation cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    Clear,
    Size,
}

fn fail(e: impl std::fmt::Display) -> i32 {
    eprintln!("Error: {}", e);
    1
}

fn save(store: &StateStore) -> Result<(), i32> {
    store.save().map_err(|e| fail(format!("{:#}", e)))
}

fn print_status(status: &FleetStatus) {
    println!(
        "{:<16} {:<8} {:>10} {:>8} {:>8} {:>7}",
        "TRUCK", "STATE", "AGE", "TEMP", "HUM", "SHOCK"
    );
    let fmt = |v: Option<f64>, unit: &str| v.map(|x| format!("{}{}", x, unit)).unwrap_or_else(|| "-".to_string());
    for v in &status.vehicles {
        let age = v
            .age_ms
            .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<16} {:<8} {:>10} {:>8} {:>8} {:>7}",
            v.truck_id,
            v.liveness.as_str(),
            age,
            fmt(v.temperature, "°C"),
            fmt(v.humidity, "%"),
            fmt(v.shock, "G"),
        );
    }
    println!("{} online, {} offline", status.online, status.offline);
}

fn print_alert(n: &Notification) {
    println!(
        "[{}] {:<8} {:<20} {:<12} {}",
        n.timestamp.format("%H:%M:%S"),
        n.severity.as_str(),
        n.id,
        n.value,
        ellipse(&n.message, 72)
    );
}

/// Role whose alerts are listed: the explicit one, else the logged-in user's. No user, no alerts.
fn viewer_role(explicit: Option<Role>, store: &StateStore) -> Option<Role> {
    explicit.or_else(|| store.session().map(|s| s.role))
}

async fn evaluate_once(settings: &Settings) -> anyhow::Result<FleetMonitor> {
    let mut source = SnapshotSource::from_settings(&settings.source)?;
    let snapshot = source.snapshot_now().await?;
    let mut fleet = FleetMonitor::from_settings(settings, Arc::new(SystemClock));
    fleet.on_snapshot(&snapshot);
    Ok(fleet)
}

/// Run a subcommand. Prints to stdout/stderr. Returns Ok(()) on success, Err(exit_code) on failure.
pub async fn run(cmd: Command, settings: Settings, cancel: CancellationToken) -> Result<(), i32> {
    match cmd {
        Command::Watch { once } => {
            if once {
                let fleet = monitor::run_once(&settings).await.map_err(|e| fail(format!("{:#}", e)))?;
                print_status(&fleet.fleet_status());
                println!("{} alert(s)", fleet.center().len());
                Ok(())
            } else {
                monitor::run_watch(&settings, cancel)
                    .await
                    .map_err(|e| fail(format!("{:#}", e)))
            }
        }
        Command::Status { json } => {
            let fleet = evaluate_once(&settings).await.map_err(|e| fail(format!("{:#}", e)))?;
            let status = fleet.fleet_status();
            if json {
                let s = serde_json::to_string_pretty(&status).map_err(fail)?;
                println!("{}", s);
            } else {
                print_status(&status);
            }
            Ok(())
        }
        Command::Alerts { role } => {
            let store = StateStore::load(Config::state_file_path());
            let Some(role) = viewer_role(role, &store) else {
                println!("Not logged in; no alerts to show (use --role or `login`)");
                return Ok(());
            };
            let fleet = evaluate_once(&settings).await.map_err(|e| fail(format!("{:#}", e)))?;
            let visible = fleet.center().notifications_for(role);
            if visible.is_empty() {
                println!("No alerts for {}", role);
            }
            for n in &visible {
                print_alert(n);
            }
            println!("{} unread for {}", fleet.center().unread_count(role), role);
            Ok(())
        }
        Command::Trips {
            device,
            lang,
            from,
            to,
            limit,
            out,
        } => {
            let store = StateStore::load(Config::state_file_path());
            let lang = lang.unwrap_or_else(|| store.language().to_string());
            let client = TripHistoryClient::from_settings(&settings.trips).map_err(|e| fail(format!("{:#}", e)))?;
            let filters = TripFilters {
                device_id: device,
                date_from: from,
                date_to: to,
                limit: limit.unwrap_or(settings.trips.limit),
            };
            let history = client.fetch_trip_history(&filters).await;
            let trips = if from.is_some() || to.is_some() {
                let (start, end) = day_bounds(from, to);
                filter_by_date_range(&history.trips, start, end)
            } else {
                history.trips.clone()
            };

            let stats = calculate_stats(&trips);
            eprintln!("Status: {}", history.status);
            eprintln!(
                "Trips: {}  distance: {:.2} km  duration: {} min  passed: {}",
                stats.total_trips, stats.total_distance, stats.total_duration, stats.compliance_passed
            );
            if let (Some(avg), Some(max), Some(min)) = (stats.avg_temp, stats.max_temp, stats.min_temp) {
                eprintln!("Temp avg {:.1}°C  max {:.1}°C  min {:.1}°C", avg, max, min);
            }

            let opts = CsvOptions::new(&lang, &history.status)
                .with_offset_minutes(settings.trips.report_utc_offset_minutes);
            let content = generate_csv_content(&trips, &opts).map_err(fail)?;
            match out {
                Some(path) => {
                    save_csv(&path, &content).map_err(fail)?;
                    println!("Saved: {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Command::Translate { lang, text } => {
            let mut translator = AutoTranslator::new(&settings.translation, Config::translation_cache_path())
                .map_err(|e| fail(format!("{:#}", e)))?;
            let text = text.join(" ");
            println!("{}", translator.translate(&text, &lang).await);
            Ok(())
        }
        Command::Login { name, email, role } => {
            let mut store = StateStore::load(Config::state_file_path());
            store.login(UserSession {
                name: name.clone(),
                email: Some(email.trim().to_string()).filter(|e| !e.is_empty()),
                role,
            });
            save(&store)?;
            println!("Logged in as {} ({})", name, role);
            Ok(())
        }
        Command::Logout => {
            let mut store = StateStore::load(Config::state_file_path());
            store.logout();
            save(&store)?;
            println!("Logged out");
            Ok(())
        }
        Command::Lang { code } => {
            let mut store = StateStore::load(Config::state_file_path());
            match code {
                None => {
                    println!("{}", translate::language_label(store.language()));
                    Ok(())
                }
                Some(code) => {
                    let code = code.to_lowercase();
                    if !translate::is_supported(&code) {
                        let codes: Vec<&str> = translate::available_languages().iter().map(|l| l.code).collect();
                        eprintln!("Unsupported language. Use one of: {}", codes.join(", "));
                        return Err(1);
                    }
                    store.set_language(&code);
                    save(&store)?;
                    println!("Language set to {}", translate::language_label(&code));
                    Ok(())
                }
            }
        }
        Command::Recipient { email } => {
            let mut store = StateStore::load(Config::state_file_path());
            if let Some(email) = email {
                if !email.contains('@') {
                    eprintln!("Invalid e-mail address: {}", email);
                    return Err(1);
                }
                store.set_recipient(&email);
                save(&store)?;
            }
            println!("{}", store.alert_recipient(&settings.email.default_recipient));
            Ok(())
        }
        Command::Cache { action } => {
            let mut translator = AutoTranslator::new(&settings.translation, Config::translation_cache_path())
                .map_err(|e| fail(format!("{:#}", e)))?;
            match action {
                CacheCmd::Clear => {
                    let n = translator.clear_cache().map_err(|e| fail(format!("{:#}", e)))?;
                    println!("Removed {} cached translation(s)", n);
                }
                CacheCmd::Size => {
                    println!(
                        "{:.2} KB ({} entries)",
                        translator.cache_size_kb(),
                        translator.cache_len()
                    );
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_role_needs_a_user_or_explicit_role() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(dir.path().join("state.json"));
        assert_eq!(viewer_role(None, &store), None);
        assert_eq!(viewer_role(Some(Role::Admin), &store), Some(Role::Admin));

        store.login(UserSession {
            name: "Ravi".to_string(),
            email: None,
            role: Role::Driver,
        });
        assert_eq!(viewer_role(None, &store), Some(Role::Driver));
        assert_eq!(viewer_role(Some(Role::Farmer), &store), Some(Role::Farmer));
    }
}
