use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{post, web, FromRequest, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use common::req::{LoginRequest, LoginResponse};

use crate::config::Config;
use crate::db::{Db, NewUserRow, UserRow};
use crate::error::ApiError;

/// Fixed token validity; re-login is the only renewal path.
pub const TOKEN_TTL_HOURS: i64 = 2;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i32,
    pub role: String,
    pub exp: usize,
}

pub fn issue_token(user: &UserRow, secret: &str) -> Result<String, ApiError> {
    let expiry = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);
    let claims = Claims {
        user_id: user.id,
        role: user.role.clone(),
        exp: expiry.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    // Validation::default() checks signature and expiry.
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Decoded identity of an admin caller. Extracting this is the gate in
/// front of every registry handler: 401 when the credential is missing,
/// malformed or invalid, 403 when it is valid but the role is not admin.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

impl FromRequest for AdminClaims {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_admin(req))
    }
}

fn extract_admin(req: &HttpRequest) -> Result<AdminClaims, ApiError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| ApiError::internal("server config missing from app data"))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("No token provided".to_owned()))?;

    let token = header_value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Malformed token".to_owned()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_owned()))?;

    if claims.role != "admin" {
        return Err(ApiError::Forbidden("Admins only".to_owned()));
    }

    Ok(AdminClaims(claims))
}

#[post("/auth/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<Arc<Mutex<Db>>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();

    let user = {
        let mut db = db
            .lock()
            .map_err(|_| ApiError::internal("store lock poisoned"))?;
        db.admin_by_email(&req.email)?
    };

    let Some(user) = user else {
        return Err(ApiError::Unauthorized("Invalid credentials".to_owned()));
    };

    let valid =
        bcrypt::verify(&req.password, &user.password_hash).map_err(|e| ApiError::Internal(e.into()))?;
    if !valid {
        return Err(ApiError::Unauthorized("Invalid credentials".to_owned()));
    }

    let token = issue_token(&user, &config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        name: user.name,
    }))
}

/// First-run bootstrap: when the users table is empty and the ADMIN_* vars
/// are set, create the admin account.
pub fn seed_admin(db: &mut Db, config: &Config) -> anyhow::Result<()> {
    if db.users_count()? > 0 {
        return Ok(());
    }

    match &config.admin_seed {
        Some(seed) => {
            let password_hash = bcrypt::hash(&seed.password, bcrypt::DEFAULT_COST)?;
            db.insert_user(&NewUserRow {
                name: seed.name.clone(),
                email: seed.email.clone(),
                password_hash,
                role: "admin".to_owned(),
            })?;
            log::info!("seeded admin user {}", seed.email);
        }
        None => {
            log::warn!("users table is empty and ADMIN_EMAIL/ADMIN_PASSWORD are unset; no one can log in");
        }
    }
    Ok(())
}
