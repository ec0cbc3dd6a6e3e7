pub mod credential;
pub mod http;
pub mod media;
pub mod orchestrator;
pub mod pool;
pub mod quota;
pub mod runtime_config;
pub mod session;
pub mod stream;
pub mod trace_log;
pub mod upstream;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8787";
