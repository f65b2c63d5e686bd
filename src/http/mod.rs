pub mod dispatch;
pub mod request;
pub mod server;
