//! CSV trip reports
//!
//! Layout:
//!
//! ```text
//! "Connection Status","<status>"
//! "Generated Date","<dd/mm/yyyy HH:MM:SS>"
//!
//! "<localized header>",...
//! "<value>",...
//! ```
//!
//! Every field is quoted and embedded quotes are doubled. An empty trip list produces the
//! status line followed by `"No data available"`.

use super::TripRecord;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const NO_DATA: &str = "No data available";
const STATUS_LABEL: &str = "Connection Status";
const GENERATED_LABEL: &str = "Generated Date";
const DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Column headers in report order for a language. Unknown languages get English.
pub fn column_headers(lang: &str) -> [&'static str; 16] {
    match lang {
        "hi" => [
            "यात्रा आईडी", "शुरुआत का समय", "समाप्ति का समय", "अवधि (मिनट)", "दूरी (किमी)",
            "औसत तापमान (°C)", "अधिकतम तापमान (°C)", "न्यूनतम तापमान (°C)", "आर्द्रता (%)",
            "प्रारंभ स्थान", "समाप्ति स्थान", "वाहन आईडी", "ड्राइवर आईडी", "किसान आईडी",
            "अनुपालन स्थिति", "नोट्स",
        ],
        "gu" => [
            "ટ્રિપ આઈડી", "શરૂઆતનો સમય", "સમાપ્તિનો સમય", "અવધિ (મિનિટ)", "અંતર (કિમી)",
            "સરેરાશ તાપમાન (°C)", "મહત્તમ તાપમાન (°C)", "ન્યૂનતમ તાપમાન (°C)", "આર્દ્રતા (%)",
            "શરૂઆતનું સ્થાન", "સમાપ્તિનું સ્થાન", "વાહન આઈડી", "ડ્રાઈવર આઈડી", "કૃષક આઈડી",
            "સમર્થન સ્થિતિ", "નોટ્સ",
        ],
        "pa" => [
            "ਯਾਤਰਾ ਆਈਡੀ", "ਸ਼ੁਰੂਆਤ ਦਾ ਸਮਾਂ", "ਸਮਾਪਤੀ ਦਾ ਸਮਾਂ", "ਮਿਆਦ (ਮਿੰਟ)", "ਦੂਰੀ (ਕਿਮੀ)",
            "ਔਸਤ ਤਾਪਮਾਨ (°C)", "ਵੱਧ ਤੋਂ ਵੱਧ ਤਾਪਮਾਨ (°C)", "ਘੱਟ ਤੋਂ ਘੱਟ ਤਾਪਮਾਨ (°C)", "ਨਮੀ (%)",
            "ਸ਼ੁਰੂਆਤ ਦੀ ਥਾਂ", "ਸਮਾਪਤੀ ਦੀ ਥਾਂ", "ਵਾਹਨ ਆਈਡੀ", "ਡਰਾਈਵਰ ਆਈਡੀ", "ਕਿਸਾਨ ਆਈਡੀ",
            "ਪਾਲਣਾ ਸਥਿਤੀ", "ਨੋਟ",
        ],
        "mr" => [
            "ट्रिप आयडी", "सुरुवातीन वेळ", "समाप्तीची वेळ", "कालावधी (मिनिट)", "अंतर (किमी)",
            "सरासरी तापमान (°C)", "जास्तीत जास्त तापमान (°C)", "किमानचे तापमान (°C)", "आर्द्रता (%)",
            "सुरुवातीचे स्थान", "समाप्तीचे स्थान", "वाहन आयडी", "ड्राइव्हर आयडी", "शेतकरी आयडी",
            "अनुपालन स्थिती", "नोट्स",
        ],
        "bn" => [
            "ট্রিপ আইডি", "শুরুর সময়", "শেষ সময়", "সময়কাল (মিনিট)", "দূরত্ব (কিমি)",
            "গড় তাপমাত্রা (°C)", "সর্বাধিক তাপমাত্রা (°C)", "সর্বনিম্ন তাপমাত্রা (°C)", "আর্দ্রতা (%)",
            "শুরুর অবস্থান", "শেষ অবস্থান", "গাড়ির আইডি", "ড্রাইভার আইডি", "কৃষক আইডি",
            "সম্মতি স্থিতি", "নোটস",
        ],
        _ => [
            "Trip ID", "Start Time", "End Time", "Duration (min)", "Distance (km)",
            "Avg Temp (°C)", "Max Temp (°C)", "Min Temp (°C)", "Humidity (%)",
            "Start Location", "End Location", "Vehicle ID", "Driver ID", "Farmer ID",
            "Compliance Status", "Notes",
        ],
    }
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub lang: String,
    pub connection_status: String,
    pub generated_at: DateTime<Utc>,
    /// Offset used to render start/end/generated times.
    pub utc_offset: FixedOffset,
}

impl CsvOptions {
    pub fn new(lang: &str, connection_status: &str) -> Self {
        Self {
            lang: lang.to_string(),
            connection_status: connection_status.to_string(),
            generated_at: Utc::now(),
            utc_offset: Utc.fix(),
        }
    }

    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(minutes * 60) {
            self.utc_offset = offset;
        }
        self
    }

    fn format_datetime(&self, at: &DateTime<Utc>) -> String {
        at.with_timezone(&self.utc_offset).format(DATETIME_FORMAT).to_string()
    }
}

fn trip_row(trip: &TripRecord, opts: &CsvOptions) -> [String; 16] {
    [
        trip.id.clone(),
        opts.format_datetime(&trip.start_time),
        opts.format_datetime(&trip.end_time),
        trip.duration.to_string(),
        format!("{:.2}", trip.distance),
        format!("{:.1}", trip.avg_temp),
        format!("{:.1}", trip.max_temp),
        format!("{:.1}", trip.min_temp),
        trip.humidity.to_string(),
        trip.start_location.clone(),
        trip.end_location.clone(),
        trip.vehicle_id.clone(),
        trip.driver_id.clone(),
        trip.farmer_id.clone(),
        trip.compliance_status.as_str().to_string(),
        trip.notes.clone(),
    ]
}

fn quoted_writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Render the full report.
pub fn generate_csv_content(trips: &[TripRecord], opts: &CsvOptions) -> Result<String, ExportError> {
    let mut preamble = quoted_writer();
    preamble.write_record([STATUS_LABEL, opts.connection_status.as_str()])?;
    if !trips.is_empty() {
        let generated = opts.format_datetime(&opts.generated_at);
        preamble.write_record([GENERATED_LABEL, generated.as_str()])?;
    }
    let mut content = finish(preamble)?;
    content.push('\n');

    let mut body = quoted_writer();
    if trips.is_empty() {
        body.write_record([NO_DATA])?;
    } else {
        body.write_record(column_headers(&opts.lang))?;
        for trip in trips {
            body.write_record(trip_row(trip, opts))?;
        }
    }
    content.push_str(&finish(body)?);
    Ok(content)
}

/// A report read back from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCsv {
    pub connection_status: Option<String>,
    pub generated_date: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn parse_csv(content: &str) -> Result<ParsedCsv, ExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut parsed = ParsedCsv::default();
    for record in reader.records() {
        let record = record?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        match record.get(0) {
            None => continue,
            Some(STATUS_LABEL) if parsed.headers.is_empty() => {
                parsed.connection_status = fields.get(1).cloned();
            }
            Some(GENERATED_LABEL) if parsed.headers.is_empty() => {
                parsed.generated_date = fields.get(1).cloned();
            }
            Some(NO_DATA) if fields.len() == 1 && parsed.headers.is_empty() => {}
            Some(_) if parsed.headers.is_empty() => parsed.headers = fields,
            Some(_) => parsed.rows.push(fields),
        }
    }
    Ok(parsed)
}

pub fn save_csv(path: &Path, content: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    info!("Trips: wrote report to {:?}", path);
    Ok(())
}

/// `trip_history_<device>_<yyyy-mm-dd>.csv`
pub fn default_filename(device_id: &str, date: DateTime<Utc>) -> String {
    format!("trip_history_{}_{}.csv", device_id, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trips::{generate_demo_trips_with, ComplianceStatus};
    use chrono::TimeZone;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn opts(lang: &str) -> CsvOptions {
        CsvOptions {
            lang: lang.to_string(),
            connection_status: "Connected to GJ-01-LIVE".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 6, 10, 9, 5, 0).unwrap(),
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    fn trips() -> Vec<TripRecord> {
        let mut rng = SmallRng::seed_from_u64(42);
        generate_demo_trips_with(&mut rng, Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_empty_report() {
        let content = generate_csv_content(&[], &opts("en")).unwrap();
        assert_eq!(
            content,
            "\"Connection Status\",\"Connected to GJ-01-LIVE\"\n\n\"No data available\"\n"
        );
        let parsed = parse_csv(&content).unwrap();
        assert_eq!(parsed.connection_status.as_deref(), Some("Connected to GJ-01-LIVE"));
        assert!(parsed.headers.is_empty());
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_report_reads_back() {
        let mut trips = trips();
        trips[0].notes = "Driver said \"door ajar\", checked".to_string();
        trips[1].compliance_status = ComplianceStatus::Warning;

        let content = generate_csv_content(&trips, &opts("en")).unwrap();
        assert!(content.starts_with(
            "\"Connection Status\",\"Connected to GJ-01-LIVE\"\n\"Generated Date\",\"10/06/2024 09:05:00\"\n\n\"Trip ID\""
        ));
        assert!(content.contains("\"Driver said \"\"door ajar\"\", checked\""));

        let parsed = parse_csv(&content).unwrap();
        assert_eq!(parsed.generated_date.as_deref(), Some("10/06/2024 09:05:00"));
        assert_eq!(parsed.headers.len(), 16);
        assert_eq!(parsed.rows.len(), trips.len());
        assert_eq!(parsed.rows[0][0], trips[0].id);
        assert_eq!(parsed.rows[0][15], trips[0].notes);
        assert_eq!(parsed.rows[1][14], "WARNING");
        assert_eq!(parsed.rows[2][4], format!("{:.2}", trips[2].distance));
    }

    #[test]
    fn test_localized_headers_and_offset() {
        let content = generate_csv_content(&trips(), &opts("gu").with_offset_minutes(330)).unwrap();
        let parsed = parse_csv(&content).unwrap();
        assert_eq!(parsed.headers[0], "ટ્રિપ આઈડી");
        assert_eq!(parsed.generated_date.as_deref(), Some("10/06/2024 14:35:00"));

        let fallback = parse_csv(&generate_csv_content(&trips(), &opts("xx")).unwrap()).unwrap();
        assert_eq!(fallback.headers[0], "Trip ID");
    }

    #[test]
    fn test_save_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("out.csv");
        save_csv(&path, "\"a\"\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"a\"\n");
        let date = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        assert_eq!(default_filename("GJ-01-LIVE", date), "trip_history_GJ-01-LIVE_2024-06-10.csv");
    }
}
