use std::fs;
use std::path::Path;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::Message;
use thiserror::Error;

use crate::attachments::{attachment_filename, content_type_for};
use crate::config::SmtpSettings;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    SmtpError(String),

    #[error("Message error: {0}")]
    MessageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An open, authenticated connection that accepts messages until closed.
pub trait MailSession {
    fn submit(&mut self, message: &Message) -> Result<(), EmailError>;

    fn close(self) -> Result<(), EmailError>;
}

/// Opens mail-submission sessions.
pub trait Mailer {
    type Session: MailSession;

    fn open(&self, settings: &SmtpSettings, connect_timeout: Duration) -> Result<Self::Session, EmailError>;
}

/// Builds the outbound message: a plain-text body plus one image attachment
/// named after the file's base name.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachment: &Path,
) -> Result<Message, EmailError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| EmailError::MessageError(format!("Invalid From address '{}': {}", from, e)))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| EmailError::MessageError(format!("Invalid To address '{}': {}", to, e)))?;

    let data = fs::read(attachment)?;
    let filename = attachment_filename(attachment);
    let content_type = ContentType::parse(content_type_for(attachment))
        .map_err(|e| EmailError::MessageError(e.to_string()))?;

    log::debug!("Attaching {} ({} bytes, {})", filename, data.len(), content_type_for(attachment));

    let body_part = MultiPart::mixed()
        .singlepart(SinglePart::plain(body.to_string()))
        .singlepart(Attachment::new(filename).body(data, content_type));

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(body_part)
        .map_err(|e| EmailError::MessageError(e.to_string()))
}

/// How the connection to the SMTP server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    None,
    #[default]
    StartTLS,
    SSL,
}

impl SmtpSecurity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" => Some(SmtpSecurity::None),
            "starttls" => Some(SmtpSecurity::StartTLS),
            "ssl" | "tls" => Some(SmtpSecurity::SSL),
            _ => None,
        }
    }
}

/// Submits over SMTP with PLAIN/LOGIN authentication, STARTTLS by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpMailer {
    pub security: SmtpSecurity,
}

impl SmtpMailer {
    pub fn new(security: SmtpSecurity) -> Self {
        Self { security }
    }
}

/// One authenticated connection, reopened with the same settings when the
/// server side drops it.
pub struct SmtpSession {
    connection: SmtpConnection,
    settings: SmtpSettings,
    security: SmtpSecurity,
    connect_timeout: Duration,
}

fn smtp_error(e: lettre::transport::smtp::Error) -> EmailError {
    EmailError::SmtpError(e.to_string())
}

fn connect(
    settings: &SmtpSettings,
    security: SmtpSecurity,
    connect_timeout: Duration,
) -> Result<SmtpConnection, EmailError> {
    let hello_name = ClientId::default();

    let wrapper = match security {
        SmtpSecurity::SSL => Some(TlsParameters::new(settings.smtp_server.clone()).map_err(smtp_error)?),
        SmtpSecurity::StartTLS | SmtpSecurity::None => None,
    };

    let mut connection = SmtpConnection::connect(
        (settings.smtp_server.as_str(), settings.smtp_port),
        Some(connect_timeout),
        &hello_name,
        wrapper.as_ref(),
        None,
    )
    .map_err(smtp_error)?;

    if security == SmtpSecurity::StartTLS {
        let tls_params = TlsParameters::new(settings.smtp_server.clone()).map_err(smtp_error)?;
        connection.starttls(&tls_params, &hello_name).map_err(smtp_error)?;
    }

    let credentials = Credentials::new(settings.username.clone(), settings.password.clone());
    connection
        .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
        .map_err(smtp_error)?;

    Ok(connection)
}

impl Mailer for SmtpMailer {
    type Session = SmtpSession;

    fn open(&self, settings: &SmtpSettings, connect_timeout: Duration) -> Result<SmtpSession, EmailError> {
        let connection = connect(settings, self.security, connect_timeout)?;

        log::info!(
            "SMTP session open to {}:{} as {} ({:?})",
            settings.smtp_server,
            settings.smtp_port,
            settings.username,
            self.security
        );
        Ok(SmtpSession {
            connection,
            settings: settings.clone(),
            security: self.security,
            connect_timeout,
        })
    }
}

impl SmtpSession {
    /// lettre aborts the connection on any error reply, so a rejected
    /// message leaves it unusable for the next one.
    fn reconnect_if_broken(&mut self) -> Result<(), EmailError> {
        if !self.connection.has_broken() {
            return Ok(());
        }

        log::warn!(
            "SMTP connection to {}:{} dropped, reconnecting",
            self.settings.smtp_server,
            self.settings.smtp_port
        );
        self.connection = connect(&self.settings, self.security, self.connect_timeout)?;
        Ok(())
    }
}

impl MailSession for SmtpSession {
    fn submit(&mut self, message: &Message) -> Result<(), EmailError> {
        self.reconnect_if_broken()?;
        self.connection
            .send(message.envelope(), &message.formatted())
            .map_err(smtp_error)?;
        Ok(())
    }

    fn close(mut self) -> Result<(), EmailError> {
        if self.connection.has_broken() {
            return Err(EmailError::SmtpError("connection already closed".to_string()));
        }
        self.connection.quit().map_err(smtp_error)?;
        log::info!("SMTP session closed");
        Ok(())
    }
}
