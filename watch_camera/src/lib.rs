mod opencv_backend;
mod preview;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod device;
pub mod overlay;
pub mod sampler;
pub mod view;

pub use app::start_app;
