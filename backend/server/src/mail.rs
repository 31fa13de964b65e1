use anyhow::{Context, Result};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

use crate::config::MailConfig;

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Invalid EMAIL_HOST")?
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();
        let from = format!("ORT Platform <{}>", config.user)
            .parse()
            .context("EMAIL_USER is not a valid address")?;

        info!("Mail enabled through {}:{}", config.host, config.port);
        Ok(Self { transport, from })
    }

    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("Invalid recipient")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        self.transport.send(message).await?;
        Ok(())
    }

    /// Mail failures never fail the request that triggered them.
    pub async fn send_logged(&self, to: &str, subject: &str, html: String) -> bool {
        match self.send(to, subject, html).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send \"{subject}\" to {to}: {e:#}");
                false
            }
        }
    }
}

pub fn verification_email(link: &str) -> String {
    format!(
        "<h2>Welcome to ORT Platform</h2>\
         <p>Confirm your email address by following the link below.</p>\
         <p><a href=\"{link}\">{link}</a></p>"
    )
}

pub fn reset_email(link: &str) -> String {
    format!(
        "<h2>Password reset</h2>\
         <p>Follow the link below to choose a new password. It expires in one hour.</p>\
         <p><a href=\"{link}\">{link}</a></p>\
         <p>If you did not ask for this, ignore this email.</p>"
    )
}
