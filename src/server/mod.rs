/// HTTP server and shutdown handling
mod server;
mod shutdown;

pub use server::{bind, build_router, run_server};
pub use shutdown::ShutdownCoordinator;
