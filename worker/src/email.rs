// ==============================================================================
// email.rs - Email Notification System
// ==============================================================================
// Description: Completion and failure emails for processed genome files
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use reputation_processor::error::ProcessingError;
use reputation_processor::models::FileRecord;
use reputation_processor::services::Notifier;

const DEFAULT_COMPLETION_TEXT: &str = "\
Hello,

Your genome file {{file_name}} has been processed on {{completed_at}}.
{{sequenced_line}}
Your gene reputation report is now available.
";

const DEFAULT_FAILURE_TEXT: &str = "\
Hello,

We could not process your genome file {{file_name}}.

Reason: {{reason}}

Please check that the file is an unmodified export from a supported service
and upload it again.
";

// ==============================================================================
// TEMPLATE RENDERING
// ==============================================================================

/// Replace `{{variable}}` placeholders; unknown placeholders are left as-is
fn render_template(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%B %d, %Y at %I:%M %p UTC").to_string()
}

// ==============================================================================
// EMAIL CONFIGURATION
// ==============================================================================

/// SMTP settings from environment variables
#[derive(Debug, Clone)]
pub struct EmailConfig {
    smtp_host: String,
    smtp_port: u16,
    smtp_username: String,
    smtp_password: String,
    smtp_use_tls: bool,
    from_email: String,
    from_name: String,
    /// Optional directory holding `<name>.txt` / `<name>.html` overrides
    template_dir: Option<PathBuf>,
}

impl EmailConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: std::env::var("SMTP_HOST").context("SMTP_HOST not set")?,
            smtp_port: std::env::var("SMTP_PORT")
                .context("SMTP_PORT not set")?
                .parse()
                .context("SMTP_PORT must be a valid port number")?,
            smtp_username: std::env::var("SMTP_USERNAME").context("SMTP_USERNAME not set")?,
            smtp_password: Self::read_smtp_password()?,
            smtp_use_tls: std::env::var("SMTP_USE_TLS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            from_email: std::env::var("SMTP_FROM_EMAIL").context("SMTP_FROM_EMAIL not set")?,
            from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Gene Reputation".to_string()),
            template_dir: std::env::var("REPUTATION_EMAIL_TEMPLATE_DIR").ok().map(PathBuf::from),
        })
    }

    /// Password from SMTP_PASSWORD_FILE (secret mount) or SMTP_PASSWORD
    fn read_smtp_password() -> Result<String> {
        if let Ok(password_file) = std::env::var("SMTP_PASSWORD_FILE") {
            return fs::read_to_string(&password_file)
                .with_context(|| format!("Failed to read SMTP password from {}", password_file))
                .map(|s| s.trim().to_string());
        }
        std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD or SMTP_PASSWORD_FILE must be set")
    }
}

/// Rendered message bodies
#[derive(Debug, Clone, PartialEq)]
struct Bodies {
    text: String,
    html: Option<String>,
}

/// Load `<name>.txt` (and `<name>.html` if present) from the template
/// directory, falling back to the built-in text
fn load_bodies(
    template_dir: Option<&Path>,
    name: &str,
    fallback: &str,
    variables: &HashMap<&str, String>,
) -> Result<Bodies> {
    let Some(dir) = template_dir else {
        return Ok(Bodies {
            text: render_template(fallback, variables),
            html: None,
        });
    };

    let text_path = dir.join(format!("{}.txt", name));
    let text = match fs::read_to_string(&text_path) {
        Ok(template) => template,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => fallback.to_string(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", text_path)),
    };

    let html_path = dir.join(format!("{}.html", name));
    let html = fs::read_to_string(&html_path).ok();

    Ok(Bodies {
        text: render_template(&text, variables),
        html: html.map(|template| render_template(&template, variables)),
    })
}

// ==============================================================================
// EMAIL NOTIFIER
// ==============================================================================

/// Notifier sending mail over SMTP
#[derive(Clone)]
pub struct EmailNotifier {
    config: Arc<EmailConfig>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn build_message(&self, recipient: &str, subject: &str, bodies: Bodies) -> Result<Message> {
        let from_mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .context("Failed to parse from address")?;
        let to_mailbox = recipient.parse().context("Failed to parse recipient address")?;

        let builder = Message::builder().from(from_mailbox).to(to_mailbox).subject(subject);

        let message = match bodies.html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(bodies.text),
                    )
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html)),
            ),
            None => builder.header(ContentType::TEXT_PLAIN).body(bodies.text),
        };

        message.context("Failed to build email message")
    }

    async fn send(&self, message: Message) -> Result<()> {
        let config = Arc::clone(&self.config);

        tokio::task::spawn_blocking(move || {
            let credentials = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

            let mailer = if config.smtp_use_tls {
                SmtpTransport::relay(&config.smtp_host)?
                    .credentials(credentials)
                    .port(config.smtp_port)
                    .build()
            } else {
                // No TLS for internal SMTP relay (e.g., local mail bridge)
                SmtpTransport::builder_dangerous(&config.smtp_host)
                    .credentials(credentials)
                    .port(config.smtp_port)
                    .build()
            };

            mailer
                .send(&message)
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("SMTP send failed: {}", e))
        })
        .await
        .context("Email task failed")?
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_completion(&self, recipient: &str, record: &FileRecord) -> Result<()> {
        let completed_at = record.completed_at.unwrap_or_else(Utc::now);

        let mut variables = HashMap::new();
        variables.insert("file_name", record.original_name.clone());
        variables.insert("file_id", record.id.to_string());
        variables.insert("format", record.format.display_name().to_string());
        variables.insert("completed_at", format_datetime(&completed_at));
        variables.insert(
            "sequenced_line",
            record
                .sequenced_at
                .as_ref()
                .map(|date| format!("Sequencing date reported by the vendor: {}\n", date))
                .unwrap_or_default(),
        );

        let bodies = load_bodies(
            self.config.template_dir.as_deref(),
            "reputation_ready",
            DEFAULT_COMPLETION_TEXT,
            &variables,
        )?;
        let message = self.build_message(recipient, "Your gene reputation report is ready", bodies)?;

        self.send(message).await?;
        info!("Completion email sent to {} for file {}", recipient, record.id);
        Ok(())
    }

    async fn handle_failure(&self, record: &FileRecord, error: &ProcessingError) -> Result<()> {
        error!("File {} ({}) failed: {}", record.id, record.original_name, error);

        let mut variables = HashMap::new();
        variables.insert("file_name", record.original_name.clone());
        variables.insert("file_id", record.id.to_string());
        variables.insert("reason", error.to_string());

        let bodies = load_bodies(
            self.config.template_dir.as_deref(),
            "reputation_failed",
            DEFAULT_FAILURE_TEXT,
            &variables,
        )?;
        let message = self.build_message(&record.recipient, "We could not process your genome file", bodies)?;

        self.send(message).await?;
        info!("Failure email sent to {} for file {}", record.recipient, record.id);
        Ok(())
    }
}

// ==============================================================================
// TESTS
// ==============================================================================
