use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder, Row};

use super::{AlertStore, ShiftStore, StoreError};
use crate::model::alert::{Alert, AlertReason, NewAlert, Resolution};
use crate::model::attendance::{Attendance, NewAttendance};
use crate::model::checkin::{Checkin, NewCheckin};
use crate::model::shift::{
    ActiveShift, CheckinProgress, NamedRef, Shift, ShiftBounds, ShiftProgress, ShiftTypeSchedule,
};

const SHIFT_COLUMNS: &str = r#"
    s.id, s.site_id, s.shift_type_id, s.assignee_id, s.shift_date, s.starts_at, s.ends_at,
    s.required_checkin_interval_mins, s.grace_minutes, s.status, s.last_heartbeat_at,
    s.missed_count, s.check_in_status, s.deleted_at
"#;

const ALERT_COLUMNS: &str = r#"
    id, shift_id, site_id, reason, severity, window_start, created_at, acknowledged_at,
    ack_by, resolved_at, resolved_by, resolution_type, resolution_note
"#;

/// Reads a snake_case string column into one of the model enums.
fn parse_col<T>(row: &MySqlRow, column: &'static str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn parse_opt_col<T>(row: &MySqlRow, column: &'static str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

impl FromRow<'_, MySqlRow> for Shift {
    fn from_row(row: &MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Shift {
            id: row.try_get("id")?,
            site_id: row.try_get("site_id")?,
            shift_type_id: row.try_get("shift_type_id")?,
            assignee_id: row.try_get("assignee_id")?,
            shift_date: row.try_get("shift_date")?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            required_checkin_interval_mins: row.try_get("required_checkin_interval_mins")?,
            grace_minutes: row.try_get("grace_minutes")?,
            status: parse_col(row, "status")?,
            last_heartbeat_at: row.try_get("last_heartbeat_at")?,
            missed_count: row.try_get("missed_count")?,
            check_in_status: parse_opt_col(row, "check_in_status")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl FromRow<'_, MySqlRow> for Alert {
    fn from_row(row: &MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Alert {
            id: row.try_get("id")?,
            shift_id: row.try_get("shift_id")?,
            site_id: row.try_get("site_id")?,
            reason: parse_col(row, "reason")?,
            severity: parse_col(row, "severity")?,
            window_start: row.try_get("window_start")?,
            created_at: row.try_get("created_at")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
            ack_by: row.try_get("ack_by")?,
            resolved_at: row.try_get("resolved_at")?,
            resolved_by: row.try_get("resolved_by")?,
            resolution_type: parse_opt_col(row, "resolution_type")?,
            resolution_note: row.try_get("resolution_note")?,
        })
    }
}

fn active_shift_from_row(row: &MySqlRow) -> Result<ActiveShift, sqlx::Error> {
    let shift = Shift::from_row(row)?;
    Ok(ActiveShift {
        site: NamedRef {
            id: shift.site_id,
            name: row.try_get("site_name")?,
        },
        shift_type: NamedRef {
            id: shift.shift_type_id,
            name: row.try_get("shift_type_name")?,
        },
        assignee: NamedRef {
            id: row.try_get("assignee_id")?,
            name: row.try_get("assignee_name")?,
        },
        shift,
    })
}

fn progress_from_row(row: &MySqlRow) -> Result<ShiftProgress, sqlx::Error> {
    Ok(ShiftProgress {
        id: row.try_get("id")?,
        status: parse_col(row, "status")?,
        last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        missed_count: row.try_get("missed_count")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Storage backed by the service's MySQL database.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_alert_row<'c, E>(executor: E, alert: &NewAlert) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (shift_id, site_id, reason, severity, window_start, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.shift_id)
        .bind(alert.site_id)
        .bind(alert.reason.to_string())
        .bind(alert.severity().to_string())
        .bind(alert.window_start)
        .bind(alert.created_at)
        .execute(executor)
        .await?;
        Ok(result.last_insert_id())
    }
}

fn new_alert_row(id: u64, alert: NewAlert) -> Alert {
    Alert {
        id,
        shift_id: alert.shift_id,
        site_id: alert.site_id,
        reason: alert.reason,
        severity: alert.severity(),
        window_start: alert.window_start,
        created_at: alert.created_at,
        acknowledged_at: None,
        ack_by: None,
        resolved_at: None,
        resolved_by: None,
        resolution_type: None,
        resolution_note: None,
    }
}

#[async_trait]
impl ShiftStore for MySqlStore {
    async fn active_shifts(&self, now: DateTime<Utc>) -> Result<Vec<ActiveShift>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SHIFT_COLUMNS},
                   st.name AS site_name,
                   t.name AS shift_type_name,
                   CONCAT(e.first_name, ' ', e.last_name) AS assignee_name
            FROM shifts s
            JOIN sites st ON st.id = s.site_id
            JOIN shift_types t ON t.id = s.shift_type_id
            JOIN employees e ON e.id = s.assignee_id
            WHERE s.status IN ('scheduled', 'in_progress')
              AND s.assignee_id IS NOT NULL
              AND s.deleted_at IS NULL
              AND s.starts_at <= ?
              AND s.ends_at >= ?
            ORDER BY s.site_id, s.starts_at
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| active_shift_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn shift_progress(&self, ids: &[u64]) -> Result<Vec<ShiftProgress>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT id, status, last_heartbeat_at, missed_count, deleted_at FROM shifts WHERE id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| progress_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn find_shift(&self, id: u64) -> Result<Option<Shift>, StoreError> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts s WHERE s.id = ?");
        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(shift)
    }

    async fn record_checkins(
        &self,
        shift_id: u64,
        expected_heartbeat: Option<DateTime<Utc>>,
        entries: Vec<NewCheckin>,
        progress: CheckinProgress,
    ) -> Result<Vec<Checkin>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // `<=>` is MySQL's null-safe equality.
        let updated = sqlx::query(
            r#"
            UPDATE shifts
            SET last_heartbeat_at = ?, check_in_status = ?, status = ?
            WHERE id = ? AND last_heartbeat_at <=> ?
            "#,
        )
        .bind(progress.last_heartbeat_at)
        .bind(progress.check_in_status.to_string())
        .bind(progress.status.to_string())
        .bind(shift_id)
        .bind(expected_heartbeat)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict);
        }

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO checkins
                    (shift_id, at, status, source, latitude, longitude, accuracy_m, lateness_mins, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.shift_id)
            .bind(entry.at)
            .bind(entry.status.to_string())
            .bind(entry.source.to_string())
            .bind(entry.location.map(|l| l.latitude))
            .bind(entry.location.map(|l| l.longitude))
            .bind(entry.location.and_then(|l| l.accuracy_m))
            .bind(entry.lateness_mins)
            .bind(progress.last_heartbeat_at)
            .execute(&mut *tx)
            .await?;

            written.push(Checkin {
                id: result.last_insert_id(),
                shift_id: entry.shift_id,
                at: entry.at,
                status: entry.status,
                source: entry.source,
                location: entry.location,
                lateness_mins: entry.lateness_mins,
                created_at: progress.last_heartbeat_at,
            });
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn record_attendance(&self, entry: NewAttendance) -> Result<Attendance, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (shift_id, employee_id, recorded_at, status, latitude, longitude, accuracy_m)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.shift_id)
        .bind(entry.employee_id)
        .bind(entry.recorded_at)
        .bind(entry.status.to_string())
        .bind(entry.location.map(|l| l.latitude))
        .bind(entry.location.map(|l| l.longitude))
        .bind(entry.location.and_then(|l| l.accuracy_m))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE shifts
            SET last_heartbeat_at = CASE
                    WHEN last_heartbeat_at IS NULL OR last_heartbeat_at < ? THEN ?
                    ELSE last_heartbeat_at
                END,
                status = IF(status = 'scheduled', 'in_progress', status)
            WHERE id = ?
            "#,
        )
        .bind(entry.recorded_at)
        .bind(entry.recorded_at)
        .bind(entry.shift_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Attendance {
            id: result.last_insert_id(),
            shift_id: entry.shift_id,
            employee_id: entry.employee_id,
            recorded_at: entry.recorded_at,
            status: entry.status,
            location: entry.location,
        })
    }

    async fn record_heartbeat(&self, shift_id: u64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE shifts
            SET last_heartbeat_at = CASE
                    WHEN last_heartbeat_at IS NULL OR last_heartbeat_at < ? THEN ?
                    ELSE last_heartbeat_at
                END
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(shift_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn shift_type_schedule(
        &self,
        shift_type_id: u64,
    ) -> Result<Option<ShiftTypeSchedule>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, start_time, end_time, checkin_interval_mins, grace_minutes
            FROM shift_types
            WHERE id = ?
            "#,
        )
        .bind(shift_type_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ShiftTypeSchedule {
            id: row.try_get("id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            checkin_interval_mins: row.try_get("checkin_interval_mins")?,
            grace_minutes: row.try_get("grace_minutes")?,
        }))
    }

    async fn upcoming_shifts_of_type(
        &self,
        shift_type_id: u64,
        after: DateTime<Utc>,
    ) -> Result<Vec<(u64, NaiveDate)>, StoreError> {
        let rows = sqlx::query_as::<_, (u64, NaiveDate)>(
            r#"
            SELECT id, shift_date
            FROM shifts
            WHERE shift_type_id = ?
              AND status = 'scheduled'
              AND deleted_at IS NULL
              AND starts_at > ?
            "#,
        )
        .bind(shift_type_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_shift_bounds(&self, bounds: &[ShiftBounds]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for b in bounds {
            let result = sqlx::query(
                r#"
                UPDATE shifts
                SET starts_at = ?, ends_at = ?, required_checkin_interval_mins = ?, grace_minutes = ?
                WHERE id = ? AND status = 'scheduled' AND deleted_at IS NULL
                "#,
            )
            .bind(b.starts_at)
            .bind(b.ends_at)
            .bind(b.required_checkin_interval_mins)
            .bind(b.grace_minutes)
            .bind(b.shift_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }
}

#[async_trait]
impl AlertStore for MySqlStore {
    async fn insert_missed_checkin(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut tx = self.pool.begin().await?;

        let id = Self::insert_alert_row(&mut *tx, &alert).await?;
        sqlx::query("UPDATE shifts SET missed_count = missed_count + 1 WHERE id = ?")
            .bind(alert.shift_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(new_alert_row(id, alert))
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let id = Self::insert_alert_row(&self.pool, &alert).await?;
        Ok(new_alert_row(id, alert))
    }

    async fn find_alert(&self, id: u64) -> Result<Option<Alert>, StoreError> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let alert = sqlx::query_as::<_, Alert>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    async fn find_alert_by_key(
        &self,
        shift_id: u64,
        reason: AlertReason,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE shift_id = ? AND reason = ? AND window_start = ?"
        );
        let alert = sqlx::query_as::<_, Alert>(&sql)
            .bind(shift_id)
            .bind(reason.to_string())
            .bind(window_start)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    async fn find_open_alert(
        &self,
        shift_id: u64,
        reason: AlertReason,
    ) -> Result<Option<Alert>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE shift_id = ? AND reason = ? AND resolved_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        let alert = sqlx::query_as::<_, Alert>(&sql)
            .bind(shift_id)
            .bind(reason.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    async fn resolve_open_alerts(
        &self,
        shift_id: u64,
        reason: AlertReason,
        resolution: &Resolution,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE shift_id = ? AND reason = ? AND resolved_at IS NULL
            FOR UPDATE
            "#
        );
        let open = sqlx::query_as::<_, Alert>(&sql)
            .bind(shift_id)
            .bind(reason.to_string())
            .fetch_all(&mut *tx)
            .await?;

        if open.is_empty() {
            tx.commit().await?;
            return Ok(open);
        }

        sqlx::query(
            r#"
            UPDATE alerts
            SET resolved_at = ?, resolved_by = ?, resolution_type = ?, resolution_note = ?
            WHERE shift_id = ? AND reason = ? AND resolved_at IS NULL
            "#,
        )
        .bind(resolution.resolved_at)
        .bind(resolution.resolved_by)
        .bind(resolution.resolution_type.to_string())
        .bind(resolution.note.as_deref())
        .bind(shift_id)
        .bind(reason.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(open
            .into_iter()
            .map(|alert| Alert {
                resolved_at: Some(resolution.resolved_at),
                resolved_by: resolution.resolved_by,
                resolution_type: Some(resolution.resolution_type),
                resolution_note: resolution.note.clone(),
                ..alert
            })
            .collect())
    }

    async fn acknowledge_alert(
        &self,
        id: u64,
        ack_by: u64,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET acknowledged_at = ?, ack_by = ?
            WHERE id = ? AND acknowledged_at IS NULL
            "#,
        )
        .bind(at)
        .bind(ack_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_alert(id).await
    }
}
