// src/utils/env.rs

use log::{debug, info};

/// Load variables from a .env file when present. Real deployments set the
/// environment directly; the file is a development convenience.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found, using process environment"),
    }
}
