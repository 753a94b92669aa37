mod auth;
mod email;
mod health;
mod metrics;
pub mod records;
mod upload;

pub use auth::{login_handler, me_handler, refresh_handler};
pub use email::email_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use upload::{delete_image_handler, list_images_handler, upload_handler};
