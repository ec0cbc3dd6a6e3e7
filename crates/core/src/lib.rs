pub mod error;
pub mod model;
pub mod storage;
pub mod time;

pub fn core_version() -> &'static str {
    "0.1.0"
}
