use clap::{ArgAction, Parser};

use crate::backend::hosted::HostedSettings;
use crate::cors::{CorsSettings, DEFAULT_MAX_AGE_SECS};
use crate::error::ConfigError;
use crate::rate_limit::{DEFAULT_LIMIT, DEFAULT_WINDOW_SECS, RateLimitPolicy};

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "content-gateway")]
#[command(about = "REST API for posts, categories and consultations on top of a hosted backend")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8787)]
    pub port: u16,

    // Hosted backend (auth, rest, storage) base url
    #[arg(long, env = "SUPABASE_URL")]
    pub backend_url: String,

    // Public key, used for reads and sign-in
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub anon_key: String,

    // Elevated key, used for writes and storage
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    pub service_role_key: String,

    // Storage bucket holding uploaded images
    #[arg(long, env = "STORAGE_BUCKET", default_value = "galilea-posts")]
    pub bucket: String,

    #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
    pub sendgrid_api_key: Option<String>,

    // Recipient of contact notifications, defaults to the sender address
    #[arg(long, env = "OWNER_EMAIL")]
    pub owner_email: Option<String>,

    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,

    #[arg(long, env = "SMTP_REPLY_TO")]
    pub smtp_reply_to: Option<String>,

    #[arg(
        long,
        env = "OWNER_TEMPLATE_ID",
        default_value = "d-51125060ad184d2a8ded541dca5256eb"
    )]
    pub owner_template_id: String,

    #[arg(
        long,
        env = "CONFIRMATION_TEMPLATE_ID",
        default_value = "d-64abcd8ced2a4a0bb87915faf89a2b31"
    )]
    pub confirmation_template_id: String,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value_t = DEFAULT_LIMIT)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value_t = DEFAULT_WINDOW_SECS)]
    pub rate_window: u32,

    // Comma separated origins, "https://*.example.com" allows subdomains
    #[arg(long, env = "CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    #[arg(long, env = "CORS_CREDENTIALS", default_value_t = true, action = ArgAction::Set)]
    pub cors_credentials: bool,

    // Preflight cache in seconds
    #[arg(long, env = "CORS_MAX_AGE", default_value_t = DEFAULT_MAX_AGE_SECS)]
    pub cors_max_age: u64,
}

/// Addresses and templates for the contact form mails.
#[derive(Debug, Clone, Default)]
pub struct EmailSettings {
    pub owner: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub owner_template_id: String,
    pub confirmation_template_id: String,
}

impl Args {
    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy, ConfigError> {
        RateLimitPolicy::new(self.rate_limit, self.rate_window)
    }

    pub fn cors_settings(&self) -> CorsSettings {
        CorsSettings::from_list(
            self.cors_origins.as_deref(),
            self.cors_credentials,
            self.cors_max_age,
        )
    }

    pub fn hosted_settings(&self) -> HostedSettings {
        HostedSettings {
            base_url: self.backend_url.trim_end_matches('/').to_string(),
            anon_key: self.anon_key.clone(),
            service_key: self.service_role_key.clone(),
            bucket: self.bucket.clone(),
        }
    }

    pub fn email_settings(&self) -> EmailSettings {
        EmailSettings {
            owner: self.owner_email.clone().or_else(|| self.smtp_from.clone()),
            from: self.smtp_from.clone(),
            reply_to: self.smtp_reply_to.clone(),
            owner_template_id: self.owner_template_id.clone(),
            confirmation_template_id: self.confirmation_template_id.clone(),
        }
    }
}
