use async_trait::async_trait;
use serde_json::{Value, json};

use super::{EmailSender, TemplateMessage};
use super::hosted::ensure_success;
use crate::error::BackendError;

const MAIL: &str = "sendgrid";
const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

// Dynamic-template mail through the SendGrid v3 API
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SendGridMailer {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

fn payload(message: &TemplateMessage) -> Value {
    let mut body = json!({
        "personalizations": [{
            "to": [{ "email": message.to }],
            "dynamic_template_data": message.data,
        }],
        "from": { "email": message.from },
        "template_id": message.template_id,
    });
    if let Some(reply_to) = &message.reply_to {
        body["reply_to"] = json!({ "email": reply_to });
    }
    body
}

#[async_trait]
impl EmailSender for SendGridMailer {
    async fn send_template(&self, message: &TemplateMessage) -> Result<(), BackendError> {
        let Some(api_key) = &self.api_key else {
            return Err(BackendError::NotConfigured("SENDGRID_API_KEY"));
        };

        let response = self
            .client
            .post(SEND_URL)
            .bearer_auth(api_key)
            .json(&payload(message))
            .send()
            .await;
        ensure_success(MAIL, response).await?;
        Ok(())
    }
}
