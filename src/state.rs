use std::sync::Arc;

use crate::backend::{EmailSender, IdentityProvider, ObjectStore, ProfileStore, RecordStore};
use crate::config::EmailSettings;
use crate::rate_limit::RateLimiter;

// app's shared state, built once in main and cloned into every handler
pub struct AppState {
    pub rate_limiter: RateLimiter,
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub records: Arc<dyn RecordStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn EmailSender>,
    pub email: EmailSettings,
}

pub type SharedState = Arc<AppState>;
