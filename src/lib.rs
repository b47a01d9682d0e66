pub mod chem;
pub mod error;
pub mod task;
pub mod utils;
pub mod web;

use std::{env, path::PathBuf, sync::Arc, time::Duration};
use chem::ChemToolkit;
use once_cell::sync::Lazy;
use task::{RecognitionBackend, TaskRegistry};
use tracing::warn;

pub struct AppContext {
    pub settings: Settings,
    pub registry: Arc<TaskRegistry>,
    pub backend: Arc<dyn RecognitionBackend>,
    pub toolkit: Arc<dyn ChemToolkit>,
}

const CHEMVIEW_HOST: &str = "0.0.0.0";
const CHEMVIEW_PORT: u16 = 8080;
const CHEMVIEW_UPLOAD_PATH: &str = "./uploads";
const CHEMVIEW_LOG_PATH: &str = "./logs";
const CHEMVIEW_DOCKER_BIN: &str = "docker";
const CHEMVIEW_OSRA_IMAGE: &str = "daverona/osra";
const CHEMVIEW_RECOGNITION_TIMEOUT_SECS: u64 = 300;
const CHEMVIEW_HEARTBEAT_SECS: u64 = 2;
const CHEMVIEW_STOP_TIMEOUT_SECS: u64 = 10;

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) => value,
        Err(_) => dotenv::var(key).unwrap_or_else(|_| default.to_string()),
    }
}

fn env_number<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    let raw = env_or(key, &default.to_string());
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Invalid value {:?} for {}, falling back to {}", raw, key, default);
            default
        }
    }
}

pub static HOST: Lazy<String> = Lazy::new(|| env_or("CHEMVIEW_HOST", CHEMVIEW_HOST));

pub static PORT: Lazy<u16> = Lazy::new(|| env_number("CHEMVIEW_PORT", CHEMVIEW_PORT));

pub static UPLOAD_PATH: Lazy<String> = Lazy::new(|| env_or("CHEMVIEW_UPLOAD_PATH", CHEMVIEW_UPLOAD_PATH));

pub static LOG_PATH: Lazy<String> = Lazy::new(|| env_or("CHEMVIEW_LOG_PATH", CHEMVIEW_LOG_PATH));

pub static DOCKER_BIN: Lazy<String> = Lazy::new(|| env_or("CHEMVIEW_DOCKER_BIN", CHEMVIEW_DOCKER_BIN));

pub static OSRA_IMAGE: Lazy<String> = Lazy::new(|| env_or("CHEMVIEW_OSRA_IMAGE", CHEMVIEW_OSRA_IMAGE));

/// Runtime knobs shared by the handlers. Built from the environment in
/// production, constructed directly in tests.
#[derive(Debug, Clone)]
pub struct Settings {
    pub upload_dir: PathBuf,
    pub recognition_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub stop_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            upload_dir: PathBuf::from(UPLOAD_PATH.as_str()),
            recognition_timeout: Duration::from_secs(env_number(
                "CHEMVIEW_RECOGNITION_TIMEOUT_SECS",
                CHEMVIEW_RECOGNITION_TIMEOUT_SECS,
            )),
            heartbeat_interval: Duration::from_secs(env_number(
                "CHEMVIEW_HEARTBEAT_SECS",
                CHEMVIEW_HEARTBEAT_SECS,
            )),
            stop_timeout: Duration::from_secs(env_number(
                "CHEMVIEW_STOP_TIMEOUT_SECS",
                CHEMVIEW_STOP_TIMEOUT_SECS,
            )),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(CHEMVIEW_UPLOAD_PATH),
            recognition_timeout: Duration::from_secs(CHEMVIEW_RECOGNITION_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(CHEMVIEW_HEARTBEAT_SECS),
            stop_timeout: Duration::from_secs(CHEMVIEW_STOP_TIMEOUT_SECS),
        }
    }
}

pub fn init_env() {
    dotenv::dotenv().ok();
}
