use axum::{Json, extract::State, http::HeaderMap};
use serde_json::json;
use tracing::{error, info};

use crate::backend::TemplateMessage;
use crate::error::{AppError, BackendError};
use crate::extract::JsonBody;
use crate::middleware::{apply_status_headers, check_scoped};
use crate::models::{EmailRequest, EmailResponse};
use crate::rate_limit::RateLimitPolicy;
use crate::state::SharedState;

const NOT_PROVIDED: &str = "No proporcionado";

fn validate(request: &EmailRequest) -> Result<(), AppError> {
    let required = [
        ("first_name", &request.first_name),
        ("last_name", &request.last_name),
        ("phone_number", &request.phone_number),
        ("nationality", &request.nationality),
        ("consultation_request", &request.consultation_request),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }

    let email = request.email.trim();
    let valid_email = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if !valid_email || email.contains(char::is_whitespace) {
        return Err(AppError::BadRequest("email is invalid".to_string()));
    }
    Ok(())
}

/// The owner notification and the visitor's confirmation, in send order.
pub fn contact_messages(
    request: &EmailRequest,
    owner: &str,
    from: &str,
    reply_to: Option<&str>,
    owner_template_id: &str,
    confirmation_template_id: &str,
) -> [TemplateMessage; 2] {
    let dni = request
        .dni_or_id
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(NOT_PROVIDED);

    let to_owner = TemplateMessage {
        to: owner.to_string(),
        from: from.to_string(),
        // the owner answers the visitor directly
        reply_to: Some(request.email.clone()),
        template_id: owner_template_id.to_string(),
        data: json!({
            "name": format!("{} {}", request.first_name, request.last_name),
            "first_name": request.first_name,
            "last_name": request.last_name,
            "phone_number": request.phone_number,
            "email": request.email,
            "dni_orid": dni,
            "nationality": request.nationality,
            "consultation_request": request.consultation_request,
        }),
    };

    let to_visitor = TemplateMessage {
        to: request.email.clone(),
        from: from.to_string(),
        reply_to: Some(reply_to.unwrap_or(from).to_string()),
        template_id: confirmation_template_id.to_string(),
        data: json!({
            "first_name": request.first_name,
            "last_name": request.last_name,
            "email": request.email,
            "phone_number": request.phone_number,
            "consultation_reason": request.consultation_request,
            "dni_or_id": dni,
            "nationality": request.nationality,
        }),
    };

    [to_owner, to_visitor]
}

// Public contact form: strict per-client limit, no authentication
pub async fn email_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Result<(HeaderMap, Json<EmailResponse>), AppError> {
    let status = check_scoped(&state, &headers, "email", &RateLimitPolicy::strict())?;
    validate(&request)?;

    let settings = &state.email;
    let from = settings
        .from
        .as_deref()
        .ok_or(BackendError::NotConfigured("SMTP_FROM"))?;
    let owner = settings
        .owner
        .as_deref()
        .ok_or(BackendError::NotConfigured("OWNER_EMAIL or SMTP_FROM"))?;

    let messages = contact_messages(
        &request,
        owner,
        from,
        settings.reply_to.as_deref(),
        &settings.owner_template_id,
        &settings.confirmation_template_id,
    );
    for message in &messages {
        if let Err(e) = state.mailer.send_template(message).await {
            error!(template_id = %message.template_id, error = %e, "Sending contact email failed");
            return Err(e.into());
        }
        info!(template_id = %message.template_id, "Contact email sent");
    }

    let mut response_headers = HeaderMap::new();
    apply_status_headers(&mut response_headers, &status);
    Ok((
        response_headers,
        Json(EmailResponse {
            success: true,
            message: "Emails enviados correctamente".to_string(),
        }),
    ))
}
