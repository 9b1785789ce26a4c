pub mod http;
pub mod middleware;
pub mod model;
pub mod router;
pub mod state;
