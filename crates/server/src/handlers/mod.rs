//! HTTP request handlers.

pub mod health;
pub mod logs;
pub mod upload_url;
pub mod uploads;

pub use health::*;
pub use logs::*;
pub use upload_url::*;
pub use uploads::*;
