use std::env;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = env::var("ASSISTGW_ADDR").unwrap_or_else(|_| assistgw_gateway::DEFAULT_ADDR.to_string());
    log::info!("assistgw-gateway starting on {addr}");

    if let Err(err) = assistgw_gateway::http::server::run(&addr).await {
        log::error!("server exited with error: {err}");
        std::process::exit(1);
    }
}
