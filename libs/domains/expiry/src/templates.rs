//! Handlebars rendering of expiry reminder emails.

use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ExpiryError, ExpiryResult};
use crate::models::{ServiceType, days_label};

const REMINDER_HTML: &str = "expiry_reminder_html";
const REMINDER_TEXT: &str = "expiry_reminder_text";

/// Rendered email content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Template variables for a reminder
#[derive(Debug, Clone, Serialize)]
pub struct ReminderData {
    pub client_name: String,
    pub service_label: String,
    pub days_until_expiry: i32,
    pub days_label: String,
    pub expiry_date: String,
    pub company_name: String,
}

impl ReminderData {
    pub fn new(
        client_name: &str,
        service: ServiceType,
        days_until_expiry: i32,
        expiry_date: NaiveDate,
        company_name: &str,
    ) -> Self {
        Self {
            client_name: client_name.to_string(),
            service_label: service.label().to_string(),
            days_until_expiry,
            days_label: days_label(days_until_expiry),
            expiry_date: expiry_date.format("%B %-d, %Y").to_string(),
            company_name: company_name.to_string(),
        }
    }
}

/// Strict-mode Handlebars registry; a missing variable is a render error.
///
/// The plain-text template uses triple-stash so names are not HTML-escaped.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    pub fn new() -> ExpiryResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        for (name, source) in [
            (REMINDER_HTML, EXPIRY_REMINDER_HTML_TEMPLATE),
            (REMINDER_TEXT, EXPIRY_REMINDER_TEXT_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, source)
                .map_err(|e| ExpiryError::Template(format!("Failed to register {}: {}", name, e)))?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Subject line, stable for identical input
    pub fn subject(data: &ReminderData) -> String {
        format!("Your {} expires {}", data.service_label, data.days_label)
    }

    pub fn render_reminder(&self, data: &ReminderData) -> ExpiryResult<RenderedEmail> {
        debug!(client = %data.client_name, service = %data.service_label, "Rendering expiry reminder");

        Ok(RenderedEmail {
            subject: Self::subject(data),
            html: self.handlebars.render(REMINDER_HTML, data)?,
            text: self.handlebars.render(REMINDER_TEXT, data)?,
        })
    }

    /// Render an arbitrary registered template; used to surface errors in tests
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> ExpiryResult<String> {
        Ok(self.handlebars.render(name, data)?)
    }
}

const EXPIRY_REMINDER_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Your {{service_label}} expires {{days_label}}</title>
</head>
<body style="font-family: Arial, sans-serif; color: #1f2933; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #b45309;">Renewal reminder</h2>
  <p>Hello {{client_name}},</p>
  <p>
    Your <strong>{{service_label}}</strong> expires <strong>{{days_label}}</strong>,
    on {{expiry_date}}.
  </p>
  <p>Please renew before the expiry date to avoid any interruption of service.</p>
  <p style="color: #6b7280; font-size: 12px;">
    Sent by {{company_name}}. Reply to this email if you have already renewed.
  </p>
</body>
</html>
"#;

const EXPIRY_REMINDER_TEXT_TEMPLATE: &str = r#"Hello {{{client_name}}},

Your {{{service_label}}} expires {{{days_label}}}, on {{{expiry_date}}}.

Please renew before the expiry date to avoid any interruption of service.

-- 
{{{company_name}}}
"#;
