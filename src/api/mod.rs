pub mod handlers;
pub mod routes;
pub mod service;

pub use routes::create_api_router;
pub use service::{CreatedQr, QrService};
