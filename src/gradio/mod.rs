pub mod client;
pub mod error;
pub mod types;

pub use client::{Connector, GradioConnector, RemoteApi};
pub use error::GradioError;
pub use types::Params;
