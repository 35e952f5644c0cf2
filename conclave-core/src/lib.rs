pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod registry;
pub mod session;
pub mod tracker;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::RoomRegistry;
pub use session::SessionController;
pub use tracker::ResourceTracker;
