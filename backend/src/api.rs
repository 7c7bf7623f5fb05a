use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{
    delete, get, post, put,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use chrono::{Duration, Utc};

use common::model::{DeviceDetail, DeviceWithStatus, Reading};
use common::req::{
    IngestRequest, IngestResponse, MessageResponse, NewDeviceRequest, UpdateDeviceRequest,
};
use common::status::connection_status;

use crate::auth::{self, AdminClaims};
use crate::config::Config;
use crate::db::{epoch_to_datetime, Db, DeviceChanges, DeviceRow, NewReadingRow, ReadingRow};
use crate::error::ApiError;
use crate::export;

pub type SharedDb = Arc<Mutex<Db>>;

const REQUIRED_READING_FIELDS: &str = "device_id, temperature, and humidity are required.";
const REQUIRED_DEVICE_FIELDS: &str = "Device ID, Name, and Status are required.";

fn lock(db: &Data<SharedDb>) -> Result<MutexGuard<'_, Db>, ApiError> {
    db.lock().map_err(|_| ApiError::internal("store lock poisoned"))
}

fn online_window(config: &Config) -> Duration {
    Duration::seconds(config.online_window_secs)
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::Validation(format!(
            "{field} must be at most {max} characters."
        ))),
        _ => Ok(()),
    }
}

fn with_status(db: &mut Db, row: DeviceRow, window: Duration) -> Result<DeviceWithStatus, ApiError> {
    let last_seen = db
        .latest_reading_ts(&row.device_id)?
        .map(epoch_to_datetime);
    Ok(DeviceWithStatus {
        device: row.into_model(),
        connection: connection_status(last_seen, Utc::now(), window),
    })
}

/// Bounded window token (`24h`, `7d`, `30d`, any humantime duration) or the
/// unbounded `all`.
fn parse_window(token: Option<&str>) -> Result<Option<Duration>, ApiError> {
    match token {
        None | Some("all") | Some("") => Ok(None),
        Some(tok) => humantime::parse_duration(tok)
            .ok()
            .and_then(|d| Duration::from_std(d).ok())
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("invalid window '{tok}'"))),
    }
}

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("backend")
}

// Open by design: field devices cannot hold admin credentials.
#[post("/devices/data")]
async fn ingest_reading(
    body: web::Json<IngestRequest>,
    db: Data<SharedDb>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();

    // explicit presence checks so 0 and 0.0 pass
    let device_id = match req.device_id {
        Some(ref id) if !id.is_empty() => id.clone(),
        _ => return Err(ApiError::Validation(REQUIRED_READING_FIELDS.to_owned())),
    };
    let (Some(temperature), Some(humidity)) = (req.temperature, req.humidity) else {
        return Err(ApiError::Validation(REQUIRED_READING_FIELDS.to_owned()));
    };

    let mut db = lock(&db)?;
    if db.device(&device_id)?.is_none() {
        return Err(ApiError::NotFound("Device not found.".to_owned()));
    }

    let timestamp = req.timestamp.unwrap_or_else(Utc::now).timestamp();
    let row = db.insert_reading(&NewReadingRow {
        device_id,
        temperature,
        humidity,
        timestamp,
    })?;

    Ok(HttpResponse::Created().json(IngestResponse {
        message: "Data received".to_owned(),
        reading: row.into_model(),
    }))
}

#[post("/devices/add")]
async fn add_device(
    _admin: AdminClaims,
    body: web::Json<NewDeviceRequest>,
    db: Data<SharedDb>,
    config: Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();

    let (Some(device_id), Some(device_name), Some(status)) =
        (req.device_id, req.device_name, req.status)
    else {
        return Err(ApiError::Validation(REQUIRED_DEVICE_FIELDS.to_owned()));
    };
    if device_id.is_empty() || device_name.is_empty() {
        return Err(ApiError::Validation(REQUIRED_DEVICE_FIELDS.to_owned()));
    }
    check_len("device_id", Some(&device_id), 50)?;
    check_len("device_name", Some(&device_name), 100)?;
    check_len("location", req.location.as_deref(), 100)?;
    check_len("lab_incharge", req.lab_incharge.as_deref(), 100)?;

    let row = DeviceRow {
        device_id,
        device_name,
        location: req.location,
        lab_incharge: req.lab_incharge,
        status: status.to_string(),
        power_state: req.power_state.unwrap_or_default().to_string(),
    };

    let mut db = lock(&db)?;
    db.insert_device(&row).map_err(|e| match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => ApiError::Conflict("Device ID already exists.".to_owned()),
        other => other.into(),
    })?;

    let created = with_status(&mut db, row, online_window(&config))?;
    Ok(HttpResponse::Created().json(created))
}

#[derive(serde::Deserialize, Debug)]
struct DevicesQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[get("/devices/all")]
async fn list_devices(
    _admin: AdminClaims,
    query: web::Query<DevicesQuery>,
    db: Data<SharedDb>,
    config: Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let mut db = lock(&db)?;
    let rows = db.devices(query.limit.map(|l| l.max(0)), query.offset.map(|o| o.max(0)))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(with_status(&mut db, row, online_window(&config))?);
    }
    Ok(HttpResponse::Ok().json(out))
}

#[get("/devices/{device_id}")]
async fn get_device(
    _admin: AdminClaims,
    path: web::Path<String>,
    db: Data<SharedDb>,
    config: Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let mut db = lock(&db)?;
    let Some(row) = db.device(&id)? else {
        return Err(ApiError::NotFound("Device not found".to_owned()));
    };

    let readings: Vec<Reading> = db
        .readings_for_device(&id, None)?
        .into_iter()
        .map(ReadingRow::into_model)
        .collect();
    // ascending order, so the newest reading is last
    let connection = connection_status(
        readings.last().map(|r| r.timestamp),
        Utc::now(),
        online_window(&config),
    );

    Ok(HttpResponse::Ok().json(DeviceDetail {
        device: row.into_model(),
        connection,
        readings,
    }))
}

#[put("/devices/{device_id}")]
async fn update_device(
    _admin: AdminClaims,
    path: web::Path<String>,
    body: web::Json<UpdateDeviceRequest>,
    db: Data<SharedDb>,
    config: Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let req = body.into_inner();

    check_len("device_name", req.device_name.as_deref(), 100)?;
    check_len("location", req.location.as_deref(), 100)?;
    check_len("lab_incharge", req.lab_incharge.as_deref(), 100)?;

    let changes = DeviceChanges {
        device_name: req.device_name,
        location: req.location,
        lab_incharge: req.lab_incharge,
        status: req.status.map(|s| s.to_string()),
        power_state: req.power_state.map(|p| p.to_string()),
    };

    let mut db = lock(&db)?;
    if db.device(&id)?.is_none() {
        return Err(ApiError::NotFound("Device not found".to_owned()));
    }
    if !changes.is_empty() {
        db.update_device(&id, &changes)?;
    }

    let row = db
        .device(&id)?
        .ok_or_else(|| ApiError::internal("device vanished during update"))?;
    let updated = with_status(&mut db, row, online_window(&config))?;
    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/devices/{device_id}")]
async fn remove_device(
    _admin: AdminClaims,
    path: web::Path<String>,
    db: Data<SharedDb>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let mut db = lock(&db)?;
    // repeat delete answers 404, not success
    if db.delete_device(&id)? == 0 {
        return Err(ApiError::NotFound("Device not found".to_owned()));
    }

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Device removed successfully".to_owned(),
    }))
}

#[derive(serde::Deserialize, Debug)]
struct ReadingsQuery {
    window: Option<String>,
}

fn windowed_readings(
    db: &mut Db,
    device: &str,
    window: Option<Duration>,
) -> Result<Vec<Reading>, ApiError> {
    if db.device(device)?.is_none() {
        return Err(ApiError::NotFound("Device not found".to_owned()));
    }
    let since = window.map(|w| (Utc::now() - w).timestamp());
    Ok(db
        .readings_for_device(device, since)?
        .into_iter()
        .map(ReadingRow::into_model)
        .collect())
}

#[get("/devices/{device_id}/readings")]
async fn device_readings(
    _admin: AdminClaims,
    path: web::Path<String>,
    query: web::Query<ReadingsQuery>,
    db: Data<SharedDb>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let window = parse_window(query.window.as_deref())?;

    let mut db = lock(&db)?;
    let readings = windowed_readings(&mut db, &id, window)?;
    Ok(HttpResponse::Ok().json(readings))
}

#[get("/devices/{device_id}/readings/export")]
async fn export_readings(
    _admin: AdminClaims,
    path: web::Path<String>,
    query: web::Query<ReadingsQuery>,
    db: Data<SharedDb>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let window = parse_window(query.window.as_deref())?;

    let mut db = lock(&db)?;
    let readings = windowed_readings(&mut db, &id, window)?;
    drop(db);

    let label = query.window.clone().unwrap_or_else(|| "all".to_owned());
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"device-{id}-data-{label}.csv\""),
        ))
        .body(export::readings_csv(&readings)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(hello)
        .service(auth::login)
        .service(ingest_reading)
        .service(add_device)
        .service(list_devices)
        .service(device_readings)
        .service(export_readings)
        .service(get_device)
        .service(update_device)
        .service(remove_device);
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::Validation(format!("invalid request body: {err}")).into())
}

pub async fn new_http_server(db: SharedDb, config: Config) -> std::io::Result<()> {
    let port = config.port;
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(json_config())
            .wrap(Logger::default())
            .configure(configure)
            .wrap(
                Cors::default()
                    .allowed_origin(&config.frontend_origin)
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .supports_credentials()
                    .max_age(3600),
            )
    })
    .client_request_timeout(StdDuration::from_secs(30))
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
