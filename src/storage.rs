//! SQLite append store for weather logs and alert history.
//!
//! The core treats the database as a simple key/append store: the scheduler
//! appends a weather log row per district after each successful weather
//! refresh, and an alert-history row whenever a district's alert level is at
//! yellow or above. The district endpoints read the latest log back.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::AlertLevel;

/// A persisted per-district weather observation.
#[derive(Debug, Clone)]
pub struct WeatherLog {
    pub district: String,
    pub rainfall_mm: f64,
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// A persisted alert-history row.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub district: String,
    pub alert_level: AlertLevel,
    pub rainfall_mm: f64,
    pub source: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:floodwatch.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weather_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                district TEXT NOT NULL,
                rainfall_mm REAL NOT NULL,
                temperature_c REAL,
                humidity_percent REAL,
                recorded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_weather_logs_district_ts
            ON weather_logs(district, recorded_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                district TEXT NOT NULL,
                alert_level TEXT NOT NULL,
                rainfall_mm REAL NOT NULL,
                source TEXT NOT NULL,
                message TEXT NOT NULL,
                sent_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alert_history_sent
            ON alert_history(sent_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one weather log row.
    pub async fn insert_weather_log(&self, log: &WeatherLog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO weather_logs (district, rainfall_mm, temperature_c, humidity_percent, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.district)
        .bind(log.rainfall_mm)
        .bind(log.temperature_c)
        .bind(log.humidity_percent)
        .bind(log.recorded_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest weather log for a district within the lookback window.
    pub async fn latest_weather_log(
        &self,
        district: &str,
        lookback_hours: i64,
    ) -> anyhow::Result<Option<WeatherLog>> {
        let cutoff = (Utc::now() - Duration::hours(lookback_hours)).timestamp();

        let row = sqlx::query(
            r#"
            SELECT district, rainfall_mm, temperature_c, humidity_percent, recorded_at
            FROM weather_logs
            WHERE district = ? AND recorded_at >= ?
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(district)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| WeatherLog {
            district: row.get("district"),
            rainfall_mm: row.get("rainfall_mm"),
            temperature_c: row.get("temperature_c"),
            humidity_percent: row.get("humidity_percent"),
            recorded_at: Utc
                .timestamp_opt(row.get::<i64, _>("recorded_at"), 0)
                .single()
                .unwrap_or_default(),
        }))
    }

    /// Append one alert-history row.
    pub async fn insert_alert(&self, record: &AlertRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_history (district, alert_level, rainfall_mm, source, message, sent_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.district)
        .bind(record.alert_level.label())
        .bind(record.rainfall_mm)
        .bind(&record.source)
        .bind(&record.message)
        .bind(record.sent_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Alert history rows from the last `hours`, newest first.
    pub async fn recent_alerts(&self, hours: i64) -> anyhow::Result<Vec<AlertRecord>> {
        let cutoff = (Utc::now() - Duration::hours(hours)).timestamp();

        let rows = sqlx::query(
            r#"
            SELECT district, alert_level, rainfall_mm, source, message, sent_at
            FROM alert_history
            WHERE sent_at >= ?
            ORDER BY sent_at DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AlertRecord {
                district: row.get("district"),
                alert_level: parse_alert_level(row.get("alert_level")),
                rainfall_mm: row.get("rainfall_mm"),
                source: row.get("source"),
                message: row.get("message"),
                sent_at: Utc
                    .timestamp_opt(row.get::<i64, _>("sent_at"), 0)
                    .single()
                    .unwrap_or_default(),
            })
            .collect())
    }
}

fn parse_alert_level(label: &str) -> AlertLevel {
    match label {
        "yellow" => AlertLevel::Yellow,
        "orange" => AlertLevel::Orange,
        "red" => AlertLevel::Red,
        _ => AlertLevel::Green,
    }
}
