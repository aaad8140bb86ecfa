mod handlers;
mod models;
mod state;

pub use handlers::{run_server, serve};
pub use models::{ClearRequest, ClearResponse, ErrorResponse, MemeRequest, MemeResponse};
