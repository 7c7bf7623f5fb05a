use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use common::status::DEFAULT_ONLINE_WINDOW_SECS;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub frontend_origin: String,
    /// Max age of the newest reading for a device to count as online.
    pub online_window_secs: i64,
    pub admin_seed: Option<AdminSeed>,
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Config {
    /// No fallback for secrets: a missing DATABASE_URL or JWT_SECRET stops
    /// the process at startup.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let port = match env::var("PORT") {
            Ok(v) => v.parse().context("PORT must be a port number")?,
            Err(_) => 3000,
        };

        let frontend_origin =
            env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned());

        let online_window_secs = match env::var("ONLINE_WINDOW_SECS") {
            Ok(v) => v.parse().context("ONLINE_WINDOW_SECS must be an integer")?,
            Err(_) => DEFAULT_ONLINE_WINDOW_SECS,
        };

        let admin_seed = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_owned()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            frontend_origin,
            online_window_secs,
            admin_seed,
        })
    }
}
