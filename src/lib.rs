pub mod app;
pub mod attachments;
pub mod config;
pub mod email;
pub mod recipients;
pub mod send;
pub mod ui;

#[cfg(test)]
mod test_smtp;

// Re-export commonly used types
pub use app::App;
pub use attachments::ImageSource;
pub use config::SmtpSettings;
pub use email::{EmailError, MailSession, Mailer, SmtpMailer, SmtpSecurity};
pub use send::{deliver, prepare, send, DeliveryOptions, SendError, SendOutcome, SendReport, SendRequest};
