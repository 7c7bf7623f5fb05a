use std::sync::{Arc, Mutex};

use anyhow::Result;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod export;
mod schema;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = config::Config::from_env()?;

    let mut db = db::Db::connect(&config.database_url)?;
    db.init_schema()?;
    auth::seed_admin(&mut db, &config)?;

    let db = Arc::new(Mutex::new(db));

    log::info!("listening on 0.0.0.0:{}", config.port);
    api::new_http_server(db, config).await?;

    Ok(())
}
