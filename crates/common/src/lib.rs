pub mod config;
pub mod error;

pub use config::{
    AppConfig, AuthConfig, Environment, RateLimitConfig, RealtimeConfig, ServerConfig,
};
pub use error::{GatewayError, GatewayResult};
