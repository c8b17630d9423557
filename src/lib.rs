#[macro_use]
extern crate tracing;

mod app;
mod logging;
pub mod server;

pub use app::run;
pub use logging::{
    init_errors,
    init_logging,
};
