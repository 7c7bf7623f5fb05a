use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use common::model::{Device, Reading};

use crate::schema::{devices, readings, users};

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = devices)]
pub struct DeviceRow {
    pub device_id: String,
    pub device_name: String,
    pub location: Option<String>,
    pub lab_incharge: Option<String>,
    pub status: String,
    pub power_state: String,
}

impl DeviceRow {
    pub fn into_model(self) -> Device {
        Device {
            device_id: self.device_id,
            device_name: self.device_name,
            location: self.location,
            lab_incharge: self.lab_incharge,
            status: self.status.parse().unwrap_or_default(),
            power_state: self.power_state.parse().unwrap_or_default(),
        }
    }
}

/// Partial update; `None` fields keep their stored values.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = devices)]
pub struct DeviceChanges {
    pub device_name: Option<String>,
    pub location: Option<String>,
    pub lab_incharge: Option<String>,
    pub status: Option<String>,
    pub power_state: Option<String>,
}

impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.device_name.is_none()
            && self.location.is_none()
            && self.lab_incharge.is_none()
            && self.status.is_none()
            && self.power_state.is_none()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = readings)]
pub struct NewReadingRow {
    pub device_id: String,
    pub temperature: f32,
    pub humidity: f32,
    pub timestamp: i64,
}

#[derive(Debug, Queryable)]
pub struct ReadingRow {
    pub id: i32,
    pub device_id: Option<String>,
    pub temperature: f32,
    pub humidity: f32,
    pub timestamp: i64,
}

impl ReadingRow {
    pub fn into_model(self) -> Reading {
        Reading {
            id: self.id,
            device_id: self.device_id.unwrap_or_default(),
            temperature: self.temperature,
            humidity: self.humidity,
            timestamp: epoch_to_datetime(self.timestamp),
        }
    }
}

#[derive(Debug, Queryable)]
pub struct UserRow {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

pub fn epoch_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)
            .with_context(|| format!("failed to open store at {database_url}"))?;

        // SQLite leaves FK checks off per connection; the Device -> Readings
        // cascade depends on them.
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn init_schema(&mut self) -> Result<()> {
        self.conn
            .batch_execute(include_str!(
                "../migrations/2025-11-02-000000_create_tables/up.sql"
            ))
            .context("failed to apply store schema")?;
        Ok(())
    }

    // --- devices ---

    pub fn insert_device(&mut self, row: &DeviceRow) -> QueryResult<()> {
        diesel::insert_into(devices::table)
            .values(row)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn device(&mut self, id: &str) -> QueryResult<Option<DeviceRow>> {
        devices::table.find(id).first(&mut self.conn).optional()
    }

    pub fn devices(&mut self, limit: Option<i64>, offset: Option<i64>) -> QueryResult<Vec<DeviceRow>> {
        devices::table
            .order(devices::device_id.asc())
            .limit(limit.unwrap_or(i64::MAX))
            .offset(offset.unwrap_or(0))
            .load(&mut self.conn)
    }

    pub fn update_device(&mut self, id: &str, changes: &DeviceChanges) -> QueryResult<usize> {
        diesel::update(devices::table.find(id))
            .set(changes)
            .execute(&mut self.conn)
    }

    pub fn delete_device(&mut self, id: &str) -> QueryResult<usize> {
        diesel::delete(devices::table.find(id)).execute(&mut self.conn)
    }

    // --- readings ---

    pub fn insert_reading(&mut self, row: &NewReadingRow) -> QueryResult<ReadingRow> {
        use crate::schema::readings::dsl::*;

        diesel::insert_into(readings)
            .values(row)
            .execute(&mut self.conn)?;

        readings.order(id.desc()).first(&mut self.conn)
    }

    /// Readings for one device, oldest first, optionally bounded below.
    pub fn readings_for_device(
        &mut self,
        device: &str,
        since: Option<i64>,
    ) -> QueryResult<Vec<ReadingRow>> {
        use crate::schema::readings::dsl::*;

        let mut query = readings
            .filter(device_id.eq(device))
            .order(timestamp.asc())
            .into_boxed();
        if let Some(cutoff) = since {
            query = query.filter(timestamp.ge(cutoff));
        }
        query.load(&mut self.conn)
    }

    pub fn latest_reading_ts(&mut self, device: &str) -> QueryResult<Option<i64>> {
        use crate::schema::readings::dsl::*;

        readings
            .filter(device_id.eq(device))
            .select(diesel::dsl::max(timestamp))
            .first(&mut self.conn)
    }

    // --- users ---

    pub fn admin_by_email(&mut self, user_email: &str) -> QueryResult<Option<UserRow>> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(user_email))
            .filter(role.eq("admin"))
            .first(&mut self.conn)
            .optional()
    }

    pub fn insert_user(&mut self, row: &NewUserRow) -> QueryResult<()> {
        diesel::insert_into(users::table)
            .values(row)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn users_count(&mut self) -> QueryResult<i64> {
        users::table.count().get_result(&mut self.conn)
    }
}

#[cfg(test)]
impl Db {
    pub fn open_in_memory() -> Self {
        let mut db = Db::connect(":memory:").unwrap();
        db.init_schema().unwrap();
        db
    }

    pub fn readings_count(&mut self) -> i64 {
        readings::table.count().get_result(&mut self.conn).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::{DatabaseErrorKind, Error};

    fn sample_device(id: &str) -> DeviceRow {
        DeviceRow {
            device_id: id.to_owned(),
            device_name: format!("{id} sensor"),
            location: Some("Chemistry Lab".to_owned()),
            lab_incharge: None,
            status: "active".to_owned(),
            power_state: "OFF".to_owned(),
        }
    }

    fn sample_reading(device: &str, ts: i64) -> NewReadingRow {
        NewReadingRow {
            device_id: device.to_owned(),
            temperature: 21.5,
            humidity: 55.0,
            timestamp: ts,
        }
    }

    #[test]
    fn duplicate_device_id_is_a_unique_violation() {
        let mut db = Db::open_in_memory();
        db.insert_device(&sample_device("dev-1")).unwrap();

        let err = db.insert_device(&sample_device("dev-1")).unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        ));

        // the original row survives
        let row = db.device("dev-1").unwrap().unwrap();
        assert_eq!(row.device_name, "dev-1 sensor");
    }

    #[test]
    fn reading_for_unknown_device_is_rejected_by_the_store() {
        let mut db = Db::open_in_memory();
        assert!(db.insert_reading(&sample_reading("ghost", 1000)).is_err());
        assert_eq!(db.readings_count(), 0);
    }

    #[test]
    fn delete_cascades_to_readings() {
        let mut db = Db::open_in_memory();
        db.insert_device(&sample_device("dev-1")).unwrap();
        db.insert_device(&sample_device("dev-2")).unwrap();
        db.insert_reading(&sample_reading("dev-1", 1000)).unwrap();
        db.insert_reading(&sample_reading("dev-1", 2000)).unwrap();
        db.insert_reading(&sample_reading("dev-2", 3000)).unwrap();

        assert_eq!(db.delete_device("dev-1").unwrap(), 1);
        assert!(db.device("dev-1").unwrap().is_none());
        // only the other device's reading remains
        assert_eq!(db.readings_count(), 1);
        assert!(db.readings_for_device("dev-1", None).unwrap().is_empty());
    }

    #[test]
    fn readings_are_windowed_and_ascending() {
        let mut db = Db::open_in_memory();
        db.insert_device(&sample_device("dev-1")).unwrap();
        for ts in [5000, 1000, 3000] {
            db.insert_reading(&sample_reading("dev-1", ts)).unwrap();
        }

        let all = db.readings_for_device("dev-1", None).unwrap();
        let stamps: Vec<i64> = all.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![1000, 3000, 5000]);

        let recent = db.readings_for_device("dev-1", Some(2000)).unwrap();
        let stamps: Vec<i64> = recent.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![3000, 5000]);
    }

    #[test]
    fn latest_reading_probe() {
        let mut db = Db::open_in_memory();
        db.insert_device(&sample_device("dev-1")).unwrap();
        assert_eq!(db.latest_reading_ts("dev-1").unwrap(), None);

        db.insert_reading(&sample_reading("dev-1", 1000)).unwrap();
        db.insert_reading(&sample_reading("dev-1", 9000)).unwrap();
        assert_eq!(db.latest_reading_ts("dev-1").unwrap(), Some(9000));
    }

    #[test]
    fn changeset_merges_only_present_fields() {
        let mut db = Db::open_in_memory();
        db.insert_device(&sample_device("dev-1")).unwrap();

        let changes = DeviceChanges {
            location: Some("Physics Lab".to_owned()),
            ..Default::default()
        };
        assert_eq!(db.update_device("dev-1", &changes).unwrap(), 1);

        let row = db.device("dev-1").unwrap().unwrap();
        assert_eq!(row.location.as_deref(), Some("Physics Lab"));
        assert_eq!(row.device_name, "dev-1 sensor");
        assert_eq!(row.status, "active");
        assert_eq!(row.power_state, "OFF");
    }

    #[test]
    fn device_listing_is_paged() {
        let mut db = Db::open_in_memory();
        for id in ["dev-1", "dev-2", "dev-3"] {
            db.insert_device(&sample_device(id)).unwrap();
        }

        let page = db.devices(Some(2), Some(1)).unwrap();
        let ids: Vec<&str> = page.iter().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["dev-2", "dev-3"]);
    }
}
