use anyhow::Result;
use importer_service::{config::AppConfig, observability};
use sqlx::postgres::PgPoolOptions;

const CHARGE_IMBALANCE_ALERT_KWH: f64 = 1.0; // |net charge| above this flags the day

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.

    // For now, recompute the entire daily_energy_balance table from scratch.
    sqlx::query("TRUNCATE TABLE daily_energy_balance;")
        .execute(&pool)
        .await?;

    // Roll reconciled 5-minute slots up to days. Net charge is the
    // energy-balance residual (pv + import) - (load + export); a large
    // residual on a day usually means bad telemetry rather than battery
    // behaviour, so it carries an alert flag.
    let insert_sql = r#"
        INSERT INTO daily_energy_balance
        SELECT
            r.device_id,
            r.date,
            SUM(r.pv_kwh)                                                       AS pv_kwh,
            SUM(r.load_kwh)                                                     AS load_kwh,
            SUM(r.feed_in_kwh)                                                  AS feed_in_kwh,
            SUM(r.grid_import_kwh)                                              AS grid_import_kwh,
            (SUM(r.pv_kwh) + SUM(r.grid_import_kwh))
                - (SUM(r.load_kwh) + SUM(r.feed_in_kwh))                        AS net_charge_kwh,
            CASE WHEN SUM(r.pv_kwh) = 0 THEN NULL
                 ELSE (SUM(r.pv_kwh) - SUM(r.feed_in_kwh)) / SUM(r.pv_kwh)
            END                                                                 AS self_consumption_pct,
            CASE
                WHEN ABS((SUM(r.pv_kwh) + SUM(r.grid_import_kwh))
                         - (SUM(r.load_kwh) + SUM(r.feed_in_kwh))) > $1
                    THEN TRUE
                ELSE FALSE
            END                                                                 AS alert
        FROM reconciled_interval r
        GROUP BY r.device_id, r.date;
        "#;

    let result = sqlx::query(insert_sql)
        .bind(CHARGE_IMBALANCE_ALERT_KWH)
        .execute(&pool)
        .await?;

    let inserted = result.rows_affected();
    tracing::info!(
        inserted_rows = inserted,
        charge_imbalance_alert_kwh = CHARGE_IMBALANCE_ALERT_KWH,
        "daily_energy_balance recomputed"
    );

    Ok(())
}
