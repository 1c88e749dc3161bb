//! Gateway configuration from the environment

use std::env;
use std::net::SocketAddr;

use tracing::warn;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Market relay token. Empty disables the relay; the rest of the
    /// system runs without price events.
    pub finnhub_api_key: String,
    pub jwt_secret: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let listen_addr = env::var("LISTEN_ADDR")
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(addr) => Some(addr),
                Err(err) => {
                    warn!(raw, error = %err, "bad LISTEN_ADDR, using default");
                    None
                }
            })
            .unwrap_or_else(|| {
                DEFAULT_LISTEN_ADDR
                    .parse()
                    .expect("default listen addr parses")
            });

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using development secret");
            "dev-secret".to_string()
        });

        Self {
            listen_addr,
            finnhub_api_key: env::var("FINNHUB_API_KEY").unwrap_or_default(),
            jwt_secret,
        }
    }
}
