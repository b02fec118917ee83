//! The bulk send workflow.
//!
//! A send runs in two halves: [`prepare`] validates the form input and
//! resolves attachments without touching the network, and [`deliver`] opens
//! one SMTP session and submits a message per recipient. [`send`] chains the
//! two with a confirmation step in between.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::attachments::{attachment_filename, build_image_list, ImageSource};
use crate::config::SmtpSettings;
use crate::email::{build_message, EmailError, MailSession, Mailer};
use crate::recipients::{invalid_addresses, parse_recipients};

pub const DEFAULT_SUBJECT: &str = "(no subject)";

/// How many invalid addresses an error message lists.
const MAX_LISTED_INVALID: usize = 10;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Alıcı listesi boş")]
    EmptyInput,

    #[error("Geçersiz e-posta adresleri:\n{}", list_invalid(.0))]
    InvalidAddresses(Vec<String>),

    #[error("Resim kaynağı seçilmedi (klasör veya tek resim seçin).")]
    NoAttachmentSource,

    #[error("Resimlerden bir veya daha fazlası eksik: {}", .0.display())]
    MissingAttachment(PathBuf),

    #[error("SMTP bağlantı/oturum açma hatası:\n{0}")]
    Transport(EmailError),
}

impl SendError {
    /// Errors raised before any network contact.
    pub fn is_preflight(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

fn list_invalid(addresses: &[String]) -> String {
    let shown: Vec<String> = addresses
        .iter()
        .take(MAX_LISTED_INVALID)
        .map(|address| format!("'{}'", address))
        .collect();
    let mut text = format!("[{}]", shown.join(", "));
    if addresses.len() > MAX_LISTED_INVALID {
        text.push_str(&format!(" (+{} more)", addresses.len() - MAX_LISTED_INVALID));
    }
    text
}

/// Raw form input for one send.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub recipients_raw: String,
    pub subject: String,
    pub body: String,
    pub images: ImageSource,
}

/// Validated input: one attachment path per recipient, in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl SendPlan {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn confirmation_prompt(&self) -> String {
        format!("{} kişiye mail gönderilecek. Göndermek istiyor musunuz?", self.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub connect_timeout: Duration,
    /// Pause after each successful message, to stay under provider throttling.
    pub message_delay: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            message_delay: Duration::from_millis(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    Idle,
    Validating,
    Confirming,
    Connecting,
    Sending { index: usize, total: usize },
    Closing,
    Reported,
}

impl fmt::Display for SendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Hazır"),
            Self::Validating => write!(f, "Doğrulanıyor"),
            Self::Confirming => write!(f, "Onay bekleniyor"),
            Self::Connecting => write!(f, "Bağlanıyor"),
            Self::Sending { index, total } => write!(f, "Gönderiliyor {}/{}", index, total),
            Self::Closing => write!(f, "Bağlantı kapatılıyor"),
            Self::Reported => write!(f, "Bitti"),
        }
    }
}

/// Receives progress from a running send.
pub trait SendObserver {
    fn stage(&mut self, _stage: SendStage) {}

    fn log(&mut self, line: &str);
}

impl SendObserver for Vec<String> {
    fn log(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub address: String,
    pub attachment: String,
    pub error: Option<String>,
}

impl SendResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub results: Vec<SendResult>,
}

impl SendReport {
    /// `(address, error)` for every recipient that failed, in send order.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| r.error.as_deref().map(|e| (r.address.as_str(), e)))
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn success_count(&self) -> usize {
        self.results.len() - self.failure_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            "Tüm mailler gönderildi!".to_string()
        } else {
            format!(
                "Gönderim tamamlandı fakat {} hata oldu. Log'u kontrol et.",
                self.failure_count()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The confirmation was declined; nothing was contacted.
    Declined,
    Completed(SendReport),
}

/// Validates the request and resolves one attachment per recipient.
pub fn prepare(request: &SendRequest) -> Result<SendPlan, SendError> {
    let recipients = parse_recipients(&request.recipients_raw);
    if recipients.is_empty() {
        return Err(SendError::EmptyInput);
    }

    let invalid = invalid_addresses(&recipients);
    if !invalid.is_empty() {
        return Err(SendError::InvalidAddresses(invalid));
    }

    let subject = match request.subject.trim() {
        "" => DEFAULT_SUBJECT.to_string(),
        subject => subject.to_string(),
    };

    let attachments = build_image_list(&request.images, recipients.len())?;

    Ok(SendPlan {
        recipients,
        subject,
        body: request.body.trim().to_string(),
        attachments,
    })
}

/// Opens one session, sends every message in order and closes the session.
///
/// A failed connection or login aborts before anything is sent. A failure
/// for a single recipient is logged and recorded, and the batch continues.
pub fn deliver<M, O>(
    plan: &SendPlan,
    settings: &SmtpSettings,
    mailer: &M,
    options: &DeliveryOptions,
    observer: &mut O,
) -> Result<SendReport, SendError>
where
    M: Mailer,
    O: SendObserver + ?Sized,
{
    observer.log(&format!(
        "SMTP: {} {} Kullanıcı: {}",
        settings.smtp_server, settings.smtp_port, settings.username
    ));

    observer.stage(SendStage::Connecting);
    let mut session = mailer
        .open(settings, options.connect_timeout)
        .map_err(SendError::Transport)?;

    let total = plan.len();
    let mut report = SendReport::default();

    for (index, (address, path)) in plan.recipients.iter().zip(&plan.attachments).enumerate() {
        let index = index + 1;
        observer.stage(SendStage::Sending { index, total });

        let attachment = attachment_filename(path);
        let sent = build_message(&settings.username, address, &plan.subject, &plan.body, path)
            .and_then(|message| session.submit(&message));

        match sent {
            Ok(()) => {
                observer.log(&format!("[{}/{}] Gönderildi -> {} ({})", index, total, address, attachment));
                report.results.push(SendResult {
                    address: address.clone(),
                    attachment,
                    error: None,
                });
                if !options.message_delay.is_zero() {
                    thread::sleep(options.message_delay);
                }
            }
            Err(e) => {
                log::debug!("Delivery to {} failed: {}", address, e);
                observer.log(&format!("[{}/{}] Hata -> {} {}", index, total, address, e));
                report.results.push(SendResult {
                    address: address.clone(),
                    attachment,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    observer.stage(SendStage::Closing);
    if let Err(e) = session.close() {
        log::warn!("Error while closing SMTP session: {}", e);
    }

    observer.stage(SendStage::Reported);
    Ok(report)
}

/// The whole workflow: validate, confirm, deliver.
///
/// `confirm` receives the recipient count and the prompt text. Declining
/// returns [`SendOutcome::Declined`] without logging anything.
pub fn send<M, O, C>(
    request: &SendRequest,
    settings: &SmtpSettings,
    mailer: &M,
    options: &DeliveryOptions,
    confirm: C,
    observer: &mut O,
) -> Result<SendOutcome, SendError>
where
    M: Mailer,
    O: SendObserver + ?Sized,
    C: FnOnce(usize, &str) -> bool,
{
    observer.stage(SendStage::Validating);
    let plan = match prepare(request) {
        Ok(plan) => plan,
        Err(e) => {
            observer.stage(SendStage::Idle);
            return Err(e);
        }
    };

    observer.stage(SendStage::Confirming);
    if !confirm(plan.len(), &plan.confirmation_prompt()) {
        observer.stage(SendStage::Idle);
        return Ok(SendOutcome::Declined);
    }

    match deliver(&plan, settings, mailer, options, observer) {
        Ok(report) => Ok(SendOutcome::Completed(report)),
        Err(e) => {
            observer.stage(SendStage::Idle);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    use lettre::Message;
    use tempfile::TempDir;

    use crate::email::{SmtpMailer, SmtpSecurity};
    use crate::test_smtp::TestSmtpServer;

    #[derive(Default)]
    struct Journal {
        opened: usize,
        closed: usize,
        submitted: Vec<String>,
    }

    /// Records traffic instead of talking to a server.
    #[derive(Default)]
    struct FakeMailer {
        journal: Rc<RefCell<Journal>>,
        refuse_login: bool,
        reject: HashSet<String>,
    }

    struct FakeSession {
        journal: Rc<RefCell<Journal>>,
        reject: HashSet<String>,
    }

    impl Mailer for FakeMailer {
        type Session = FakeSession;

        fn open(&self, _settings: &SmtpSettings, _timeout: Duration) -> Result<FakeSession, EmailError> {
            if self.refuse_login {
                return Err(EmailError::SmtpError("535 authentication failed".to_string()));
            }
            self.journal.borrow_mut().opened += 1;
            Ok(FakeSession {
                journal: Rc::clone(&self.journal),
                reject: self.reject.clone(),
            })
        }
    }

    impl MailSession for FakeSession {
        fn submit(&mut self, message: &Message) -> Result<(), EmailError> {
            let to = message.envelope().to()[0].to_string();
            if self.reject.contains(&to) {
                return Err(EmailError::SmtpError("550 mailbox unavailable".to_string()));
            }
            self.journal.borrow_mut().submitted.push(to);
            Ok(())
        }

        fn close(self) -> Result<(), EmailError> {
            self.journal.borrow_mut().closed += 1;
            Ok(())
        }
    }

    fn settings() -> SmtpSettings {
        SmtpSettings {
            username: "sender@example.com".to_string(),
            ..SmtpSettings::default()
        }
    }

    fn no_delay() -> DeliveryOptions {
        DeliveryOptions {
            message_delay: Duration::ZERO,
            ..DeliveryOptions::default()
        }
    }

    fn image_folder(count: usize) -> TempDir {
        let dir = TempDir::new().unwrap();
        for i in 1..=count {
            fs::write(dir.path().join(format!("{}.png", i)), b"png").unwrap();
        }
        dir
    }

    fn request(recipients: &str, images: ImageSource) -> SendRequest {
        SendRequest {
            recipients_raw: recipients.to_string(),
            subject: "Hi".to_string(),
            body: "  Body text \n".to_string(),
            images,
        }
    }

    const THREE: &str = "a@example.com\nb@example.com, c@example.com";

    #[test]
    fn test_prepare_resolves_everything() {
        let dir = image_folder(3);
        let mut req = request(THREE, ImageSource::Folder(dir.path().to_path_buf()));
        req.subject = "   ".to_string();

        let plan = prepare(&req).unwrap();
        assert_eq!(plan.recipients, vec!["a@example.com", "b@example.com", "c@example.com"]);
        assert_eq!(plan.subject, DEFAULT_SUBJECT);
        assert_eq!(plan.body, "Body text");
        assert_eq!(plan.attachments[2], dir.path().join("3.png"));
        assert_eq!(
            plan.confirmation_prompt(),
            "3 kişiye mail gönderilecek. Göndermek istiyor musunuz?"
        );
    }

    #[test]
    fn test_prepare_preflight_errors() {
        let single = ImageSource::Single(PathBuf::from("/x.png"));

        assert!(matches!(prepare(&request(" \n, ", single.clone())), Err(SendError::EmptyInput)));
        assert!(matches!(
            prepare(&request("ok@example.com", ImageSource::None)),
            Err(SendError::NoAttachmentSource)
        ));

        match prepare(&request("ok@example.com, user@@bad, no-at-sign", single)) {
            Err(SendError::InvalidAddresses(list)) => {
                assert_eq!(list, vec!["user@@bad", "no-at-sign"]);
            }
            other => panic!("expected InvalidAddresses, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_address_message_lists_at_most_ten() {
        let raw: Vec<String> = (0..12).map(|i| format!("bad{}", i)).collect();
        let err = prepare(&request(&raw.join(","), ImageSource::None)).unwrap_err();
        let text = err.to_string();

        assert!(text.contains("'bad9'"));
        assert!(!text.contains("'bad10'"));
        assert!(text.contains("(+2 more)"));
        assert!(err.is_preflight());
    }

    #[test]
    fn test_missing_folder_image_sends_nothing() {
        let dir = image_folder(3);
        fs::remove_file(dir.path().join("2.png")).unwrap();
        let mailer = FakeMailer::default();
        let mut log = Vec::new();

        let result = send(
            &request(THREE, ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &mailer,
            &no_delay(),
            |_, _| true,
            &mut log,
        );

        assert!(matches!(result, Err(SendError::MissingAttachment(_))));
        let journal = mailer.journal.borrow();
        assert_eq!(journal.opened, 0);
        assert!(journal.submitted.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_full_success() {
        let dir = image_folder(3);
        let mailer = FakeMailer::default();
        let mut log = Vec::new();

        let outcome = send(
            &request(THREE, ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &mailer,
            &no_delay(),
            |count, _| count == 3,
            &mut log,
        )
        .unwrap();

        let SendOutcome::Completed(report) = outcome else {
            panic!("expected a completed send");
        };
        assert!(report.all_succeeded());
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.summary(), "Tüm mailler gönderildi!");

        assert_eq!(log[0], "SMTP: smtp.gmail.com 587 Kullanıcı: sender@example.com");
        assert_eq!(log[1], "[1/3] Gönderildi -> a@example.com (1.png)");
        assert_eq!(log[3], "[3/3] Gönderildi -> c@example.com (3.png)");

        let journal = mailer.journal.borrow();
        assert_eq!(journal.submitted, vec!["a@example.com", "b@example.com", "c@example.com"]);
        assert_eq!(journal.opened, 1);
        assert_eq!(journal.closed, 1);
    }

    #[test]
    fn test_unreadable_attachment_is_partial_success() {
        let dir = image_folder(3);
        // Exists, so it passes resolution, but cannot be read as a file.
        fs::remove_file(dir.path().join("2.png")).unwrap();
        fs::create_dir(dir.path().join("2.png")).unwrap();
        let mailer = FakeMailer::default();
        let mut log = Vec::new();

        let outcome = send(
            &request(THREE, ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &mailer,
            &no_delay(),
            |_, _| true,
            &mut log,
        )
        .unwrap();

        let SendOutcome::Completed(report) = outcome else {
            panic!("expected a completed send");
        };
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures()[0].0, "b@example.com");
        assert_eq!(
            report.summary(),
            "Gönderim tamamlandı fakat 1 hata oldu. Log'u kontrol et."
        );
        assert!(log[2].starts_with("[2/3] Hata -> b@example.com IO error"));

        let journal = mailer.journal.borrow();
        assert_eq!(journal.submitted, vec!["a@example.com", "c@example.com"]);
        assert_eq!(journal.closed, 1);
    }

    #[test]
    fn test_rejected_message_continues_batch() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("shared.png");
        fs::write(&image, b"png").unwrap();
        let mailer = FakeMailer {
            reject: HashSet::from(["a@example.com".to_string()]),
            ..FakeMailer::default()
        };
        let mut log = Vec::new();

        let plan = prepare(&request(THREE, ImageSource::Single(image))).unwrap();
        let report = deliver(&plan, &settings(), &mailer, &no_delay(), &mut log).unwrap();

        assert_eq!(report.failure_count(), 1);
        assert_eq!(log[1], "[1/3] Hata -> a@example.com SMTP error: 550 mailbox unavailable");
        assert_eq!(log[2], "[2/3] Gönderildi -> b@example.com (shared.png)");
        assert_eq!(mailer.journal.borrow().submitted.len(), 2);
    }

    #[test]
    fn test_declined_confirmation_touches_nothing() {
        let dir = image_folder(3);
        let mailer = FakeMailer::default();
        let mut log = Vec::new();

        let outcome = send(
            &request(THREE, ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &mailer,
            &no_delay(),
            |_, _| false,
            &mut log,
        )
        .unwrap();

        assert_eq!(outcome, SendOutcome::Declined);
        assert!(log.is_empty());
        assert_eq!(mailer.journal.borrow().opened, 0);
    }

    #[test]
    fn test_login_failure_sends_nothing() {
        let dir = image_folder(3);
        let mailer = FakeMailer {
            refuse_login: true,
            ..FakeMailer::default()
        };
        let mut log = Vec::new();

        let result = send(
            &request(THREE, ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &mailer,
            &no_delay(),
            |_, _| true,
            &mut log,
        );

        let err = result.unwrap_err();
        assert!(!err.is_preflight());
        assert!(err.to_string().contains("535 authentication failed"));
        assert_eq!(log.len(), 1);
        assert!(mailer.journal.borrow().submitted.is_empty());
    }

    struct StageLog(Vec<SendStage>);

    impl SendObserver for StageLog {
        fn stage(&mut self, stage: SendStage) {
            self.0.push(stage);
        }

        fn log(&mut self, _line: &str) {}
    }

    #[test]
    fn test_stage_sequence() {
        let dir = image_folder(2);
        let mut stages = StageLog(Vec::new());

        send(
            &request("a@example.com,b@example.com", ImageSource::Folder(dir.path().to_path_buf())),
            &settings(),
            &FakeMailer::default(),
            &no_delay(),
            |_, _| true,
            &mut stages,
        )
        .unwrap();

        assert_eq!(
            stages.0,
            vec![
                SendStage::Validating,
                SendStage::Confirming,
                SendStage::Connecting,
                SendStage::Sending { index: 1, total: 2 },
                SendStage::Sending { index: 2, total: 2 },
                SendStage::Closing,
                SendStage::Reported,
            ]
        );
        assert_eq!(SendStage::Sending { index: 1, total: 2 }.to_string(), "Gönderiliyor 1/2");
    }

    #[test]
    fn test_single_image_reaches_every_recipient() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("poster.png");
        fs::write(&image, b"png").unwrap();

        let plan = prepare(&request(THREE, ImageSource::Single(image.clone()))).unwrap();
        assert_eq!(plan.attachments.len(), 3);
        assert!(plan.attachments.iter().all(|p| p.as_path() == Path::new(&image)));
    }

    const PLAINTEXT: SmtpMailer = SmtpMailer { security: SmtpSecurity::None };

    fn loopback_options() -> DeliveryOptions {
        DeliveryOptions {
            connect_timeout: Duration::from_secs(5),
            message_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_smtp_rejection_mid_batch_continues() {
        let dir = image_folder(3);
        let server = TestSmtpServer::rejecting("b@example.com").start();
        let mut log = Vec::new();

        let plan = prepare(&request(THREE, ImageSource::Folder(dir.path().to_path_buf()))).unwrap();
        let report = deliver(&plan, &server.settings(), &PLAINTEXT, &loopback_options(), &mut log).unwrap();

        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures()[0].0, "b@example.com");
        assert!(log[2].starts_with("[2/3] Hata -> b@example.com SMTP error"));
        assert_eq!(log[3], "[3/3] Gönderildi -> c@example.com (3.png)");
        assert_eq!(server.delivered(), vec!["a@example.com", "c@example.com"]);
        assert_eq!(server.events().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn test_smtp_rejection_of_last_recipient_still_reports() {
        let dir = image_folder(3);
        let server = TestSmtpServer::rejecting("c@example.com").start();
        let mut log = Vec::new();

        // The session is broken when it is closed; that only warns.
        let plan = prepare(&request(THREE, ImageSource::Folder(dir.path().to_path_buf()))).unwrap();
        let report = deliver(&plan, &server.settings(), &PLAINTEXT, &loopback_options(), &mut log).unwrap();

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failures()[0].0, "c@example.com");
        assert_eq!(server.delivered(), vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_smtp_refused_login_is_transport_error() {
        let dir = image_folder(3);
        let server = TestSmtpServer {
            reject_auth: true,
            ..TestSmtpServer::default()
        }
        .start();
        let mut log = Vec::new();

        let plan = prepare(&request(THREE, ImageSource::Folder(dir.path().to_path_buf()))).unwrap();
        let result = deliver(&plan, &server.settings(), &PLAINTEXT, &loopback_options(), &mut log);

        assert!(matches!(result, Err(SendError::Transport(_))));
        assert_eq!(log.len(), 1);
        assert!(server.delivered().is_empty());
    }
}
