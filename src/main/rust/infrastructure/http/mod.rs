mod health_server;

pub use health_server::{bind, routes};
