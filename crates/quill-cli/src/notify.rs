//! Notifications over SMTP, or into the log when no mail server is
//! configured.

use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox,
  transport::smtp::authentication::Credentials,
};
use quill_core::ports::{Notification, Notifier};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("invalid address: {0}")]
  Address(#[from] lettre::address::AddressError),

  #[error("failed to build message: {0}")]
  Message(#[from] lettre::error::Error),

  #[error("SMTP error: {0}")]
  Smtp(#[from] lettre::transport::smtp::Error),
}

pub struct SmtpNotifier {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  from:      Mailbox,
  to:        Mailbox,
}

impl SmtpNotifier {
  pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
    let from = config.from.parse()?;
    let to = config.to.parse()?;
    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
      .port(config.port)
      .credentials(Credentials::new(config.username.clone(), config.password.clone()))
      .build();
    Ok(Self { transport, from, to })
  }
}

/// The notifier the binary runs with.
pub enum MailNotifier {
  Smtp(SmtpNotifier),
  LogOnly,
}

impl MailNotifier {
  pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self, NotifyError> {
    Ok(match smtp {
      Some(config) => Self::Smtp(SmtpNotifier::new(config)?),
      None => Self::LogOnly,
    })
  }
}

impl Notifier for MailNotifier {
  type Error = NotifyError;

  async fn notify<'a>(&'a self, notification: &'a Notification) -> Result<(), NotifyError> {
    match self {
      Self::Smtp(smtp) => {
        let message = Message::builder()
          .from(smtp.from.clone())
          .to(smtp.to.clone())
          .subject(notification.subject.as_str())
          .body(notification.body.clone())?;
        smtp.transport.send(message).await?;
        info!(category = ?notification.category, subject = %notification.subject, "notification sent");
      }
      Self::LogOnly => {
        info!(
          category = ?notification.category,
          subject = %notification.subject,
          body = %notification.body,
          "notification (SMTP not configured)"
        );
      }
    }
    Ok(())
  }
}
