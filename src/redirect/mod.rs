pub mod handlers;
pub mod resolver;
pub mod routes;

pub use resolver::{normalize_destination, ResolveError, Resolver};
pub use routes::create_redirect_router;
