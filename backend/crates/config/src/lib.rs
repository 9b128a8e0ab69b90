pub mod env;
pub mod tracing_init;

pub use env::{env_bool, env_or, AppConfig};
pub use tracing_init::init_tracing;
