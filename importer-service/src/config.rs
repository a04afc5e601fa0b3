use serde::Deserialize;
use std::fs;
use time::{format_description::BorrowedFormatItem, macros::format_description, Date, OffsetDateTime};

static DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Inverter serial the import runs against.
    pub device_id: String,
    /// First day of the import window, `YYYY-MM-DD`.
    pub start_date: String,
    /// Last day, inclusive; defaults to yesterday so the running day is
    /// never imported half-finished.
    pub end_date: Option<String>,
    pub pause_between_days_ms: u64,
    pub throttle_max_retries: u32,
    pub throttle_backoff_ms: u64,
}

impl ApiConfig {
    pub fn date_range(&self) -> anyhow::Result<(Date, Date)> {
        let start = Date::parse(self.start_date.trim(), DATE_FORMAT)?;
        let end = match &self.end_date {
            Some(s) => Date::parse(s.trim(), DATE_FORMAT)?,
            None => OffsetDateTime::now_utc()
                .date()
                .previous_day()
                .ok_or_else(|| anyhow::anyhow!("cannot derive yesterday from the current date"))?,
        };
        anyhow::ensure!(
            start <= end,
            "start_date {start} is after end_date {end}"
        );
        Ok((start, end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Also archive the day's raw samples (with passthrough channels) into
    /// `power_sample`.
    pub archive_raw: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sink: SinkConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("IMPORTER_CONFIG").unwrap_or_else(|_| "importer-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn api(start: &str, end: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url: "https://openapi.example.com/api".to_string(),
            app_id: "app".to_string(),
            app_secret: "secret".to_string(),
            device_id: "AL1000".to_string(),
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
            pause_between_days_ms: 1000,
            throttle_max_retries: 3,
            throttle_backoff_ms: 5000,
        }
    }

    #[test]
    fn explicit_date_range_parses() {
        let (start, end) = api("2024-06-01", Some("2024-06-30")).date_range().unwrap();
        assert_eq!(start, date!(2024 - 06 - 01));
        assert_eq!(end, date!(2024 - 06 - 30));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(api("2024-07-01", Some("2024-06-01")).date_range().is_err());
    }

    #[test]
    fn config_parses_from_toml() {
        let toml = r#"
            [database]
            uri = "postgres://importer@localhost/energy"
            max_connections = 4

            [api]
            base_url = "https://openapi.example.com/api"
            app_id = "app"
            app_secret = "secret"
            device_id = "AL1000"
            start_date = "2024-06-01"
            pause_between_days_ms = 1500
            throttle_max_retries = 3
            throttle_backoff_ms = 5000

            [sink]
            max_retries = 3
            retry_backoff_ms = 500
            archive_raw = true

            [metrics]
            bind_addr = "127.0.0.1:9104"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();

        assert_eq!(cfg.database.max_connections, 4);
        assert!(cfg.api.end_date.is_none());
        assert!(cfg.sink.archive_raw);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9104");
    }
}
