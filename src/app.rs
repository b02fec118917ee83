use std::path::PathBuf;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use thiserror::Error;

use crate::attachments::ImageSource;
use crate::config::SmtpSettings;
use crate::email::{Mailer, SmtpMailer};
use crate::send::{
    deliver, prepare, DeliveryOptions, SendError, SendObserver, SendPlan, SendReport, SendRequest,
    SendStage,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    SmtpServer,
    Port,
    Username,
    Password,
    Recipients,
    Subject,
    Body,
}

impl FormField {
    pub const ALL: [FormField; 7] = [
        FormField::SmtpServer,
        FormField::Port,
        FormField::Username,
        FormField::Password,
        FormField::Recipients,
        FormField::Subject,
        FormField::Body,
    ];

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn is_multiline(self) -> bool {
        matches!(self, FormField::Recipients | FormField::Body)
    }

    pub fn label(self) -> &'static str {
        match self {
            FormField::SmtpServer => "SMTP Server",
            FormField::Port => "Port",
            FormField::Username => "E-posta",
            FormField::Password => "Şifre",
            FormField::Recipients => "Alıcılar",
            FormField::Subject => "Başlık",
            FormField::Body => "Mesaj",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
    Folder,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Form,
    ImagePrompt(PickKind),
    Confirm,
    Sending,
    Dialog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

/// Messages from the background send thread. `Finished` is sent exactly once.
#[derive(Debug)]
pub enum SendEvent {
    Stage(SendStage),
    Log(String),
    Finished(Result<SendReport, SendError>),
}

struct ChannelObserver(mpsc::Sender<SendEvent>);

impl SendObserver for ChannelObserver {
    fn stage(&mut self, stage: SendStage) {
        let _ = self.0.send(SendEvent::Stage(stage));
    }

    fn log(&mut self, line: &str) {
        let _ = self.0.send(SendEvent::Log(line.to_string()));
    }
}

pub struct App {
    pub settings: SmtpSettings,
    pub settings_path: PathBuf,
    pub options: DeliveryOptions,
    pub should_quit: bool,
    pub mode: AppMode,
    pub focus: FormField,

    // Form fields, as typed
    pub smtp_server: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub recipients: String,
    pub subject: String,
    pub body: String,

    pub images: ImageSource,
    pub prompt_input: String,

    pub log: Vec<String>,
    pub stage: SendStage,
    pub dialog: Option<Dialog>,
    pub pending: Option<(SendPlan, SmtpSettings)>,

    pub error_message: Option<String>,
    pub info_message: Option<String>,
    pub message_timeout: Option<Instant>,

    send_events: Option<mpsc::Receiver<SendEvent>>,
    send_thread: Option<thread::JoinHandle<()>>,
}

impl App {
    pub fn new(settings: SmtpSettings, settings_path: PathBuf) -> Self {
        Self {
            smtp_server: settings.smtp_server.clone(),
            port: settings.smtp_port.to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            settings,
            settings_path,
            options: DeliveryOptions::default(),
            should_quit: false,
            mode: AppMode::Form,
            focus: FormField::Recipients,
            recipients: String::new(),
            subject: String::new(),
            body: String::new(),
            images: ImageSource::None,
            prompt_input: String::new(),
            log: Vec::new(),
            stage: SendStage::Idle,
            dialog: None,
            pending: None,
            error_message: None,
            info_message: None,
            message_timeout: None,
            send_events: None,
            send_thread: None,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.send_thread.is_some()
    }

    pub fn field(&self, field: FormField) -> &str {
        match field {
            FormField::SmtpServer => &self.smtp_server,
            FormField::Port => &self.port,
            FormField::Username => &self.username,
            FormField::Password => &self.password,
            FormField::Recipients => &self.recipients,
            FormField::Subject => &self.subject,
            FormField::Body => &self.body,
        }
    }

    fn field_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::SmtpServer => &mut self.smtp_server,
            FormField::Port => &mut self.port,
            FormField::Username => &mut self.username,
            FormField::Password => &mut self.password,
            FormField::Recipients => &mut self.recipients,
            FormField::Subject => &mut self.subject,
            FormField::Body => &mut self.body,
        }
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) -> AppResult<()> {
        match self.mode {
            AppMode::Form => self.handle_form_mode(key),
            AppMode::ImagePrompt(kind) => self.handle_image_prompt(kind, key),
            AppMode::Confirm => self.handle_confirm_mode(key),
            AppMode::Sending => {
                self.show_info("Gönderim sürüyor, lütfen bekleyin");
                Ok(())
            }
            AppMode::Dialog => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                    self.dialog = None;
                    self.mode = AppMode::Form;
                }
                Ok(())
            }
        }
    }

    fn handle_form_mode(&mut self, key: KeyEvent) -> AppResult<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('q') if ctrl => {
                self.should_quit = true;
                Ok(())
            }
            KeyCode::Esc => {
                self.should_quit = true;
                Ok(())
            }
            KeyCode::Char('s') if ctrl => self.save_settings(),
            KeyCode::Char('f') if ctrl => {
                self.open_image_prompt(PickKind::Folder);
                Ok(())
            }
            KeyCode::Char('o') if ctrl => {
                self.open_image_prompt(PickKind::Single);
                Ok(())
            }
            KeyCode::Char('x') if ctrl => {
                self.clear_image_selection();
                Ok(())
            }
            KeyCode::Char('l') if ctrl => {
                self.log.clear();
                Ok(())
            }
            KeyCode::Char('g') if ctrl => {
                self.request_send();
                Ok(())
            }
            KeyCode::F(5) => {
                self.request_send();
                Ok(())
            }
            KeyCode::Tab | KeyCode::Down if !(key.code == KeyCode::Down && self.focus.is_multiline()) => {
                self.focus = self.focus.next();
                Ok(())
            }
            KeyCode::BackTab | KeyCode::Up if !(key.code == KeyCode::Up && self.focus.is_multiline()) => {
                self.focus = self.focus.prev();
                Ok(())
            }
            KeyCode::Enter => {
                if self.focus.is_multiline() {
                    self.field_mut(self.focus).push('\n');
                } else {
                    self.focus = self.focus.next();
                }
                Ok(())
            }
            KeyCode::Backspace => {
                self.field_mut(self.focus).pop();
                Ok(())
            }
            KeyCode::Char(c) if !ctrl => {
                self.field_mut(self.focus).push(c);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_image_prompt(&mut self, kind: PickKind, key: KeyEvent) -> AppResult<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = AppMode::Form;
                self.prompt_input.clear();
                Ok(())
            }
            KeyCode::Enter => {
                let input = self.prompt_input.trim().to_string();
                self.mode = AppMode::Form;
                self.prompt_input.clear();
                if !input.is_empty() {
                    self.pick_image(kind, &input);
                }
                Ok(())
            }
            KeyCode::Tab => {
                if self.prompt_input.is_empty() || self.prompt_input == "~" {
                    if let Some(home) = dirs::home_dir() {
                        self.prompt_input = format!("{}/", home.display());
                    }
                }
                Ok(())
            }
            KeyCode::Backspace => {
                self.prompt_input.pop();
                Ok(())
            }
            KeyCode::Char(c) => {
                self.prompt_input.push(c);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_confirm_mode(&mut self, key: KeyEvent) -> AppResult<()> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.confirm_send_with(SmtpMailer::default());
                Ok(())
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.decline_send();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn open_image_prompt(&mut self, kind: PickKind) {
        self.prompt_input.clear();
        self.mode = AppMode::ImagePrompt(kind);
    }

    /// Selecting one image mode replaces the other.
    pub fn pick_image(&mut self, kind: PickKind, input: &str) {
        let picked = match kind {
            PickKind::Folder => ImageSource::folder(input),
            PickKind::Single => ImageSource::single(input),
        };

        match picked {
            Ok(source) => {
                self.images = source;
                let label = self.images.to_string();
                self.show_info(&label);
            }
            Err(e) => self.show_error(&e.to_string()),
        }
    }

    pub fn clear_image_selection(&mut self) {
        self.images = ImageSource::None;
    }

    pub fn save_settings(&mut self) -> AppResult<()> {
        let smtp_port = match SmtpSettings::parse_port(&self.port) {
            Ok(port) => port,
            Err(e) => {
                self.open_dialog(DialogKind::Error, "Hata", &e.to_string());
                return Ok(());
            }
        };

        let settings = SmtpSettings {
            smtp_server: self.smtp_server.trim().to_string(),
            smtp_port,
            username: self.username.trim().to_string(),
            password: self.password.trim().to_string(),
        };

        match settings.save(&self.settings_path) {
            Ok(()) => {
                self.settings = settings;
                let message = format!("Ayarlar kaydedildi: {}", self.settings_path.display());
                self.open_dialog(DialogKind::Info, "Bilgi", &message);
            }
            Err(e) => {
                log::error!("Saving settings failed: {}", e);
                self.open_dialog(DialogKind::Error, "Hata", &format!("Ayarlar kaydedilemedi: {}", e));
            }
        }
        Ok(())
    }

    pub fn send_request(&self) -> SendRequest {
        SendRequest {
            recipients_raw: self.recipients.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            images: self.images.clone(),
        }
    }

    /// Validates the form and asks for confirmation. Nothing is contacted yet.
    pub fn request_send(&mut self) {
        if self.is_sending() {
            self.show_info("Gönderim sürüyor, lütfen bekleyin");
            return;
        }

        self.stage = SendStage::Validating;

        let settings = match self
            .settings
            .resolve_form(&self.smtp_server, &self.port, &self.username, &self.password)
        {
            Ok(settings) => settings,
            Err(e) => {
                self.stage = SendStage::Idle;
                self.open_dialog(DialogKind::Error, "Hata", &e.to_string());
                return;
            }
        };

        match prepare(&self.send_request()) {
            Ok(plan) => {
                self.pending = Some((plan, settings));
                self.stage = SendStage::Confirming;
                self.mode = AppMode::Confirm;
            }
            Err(e) => {
                self.stage = SendStage::Idle;
                self.open_dialog(DialogKind::Error, "Hata", &e.to_string());
            }
        }
    }

    pub fn confirmation_prompt(&self) -> Option<String> {
        self.pending.as_ref().map(|(plan, _)| plan.confirmation_prompt())
    }

    pub fn decline_send(&mut self) {
        self.pending = None;
        self.stage = SendStage::Idle;
        self.mode = AppMode::Form;
    }

    /// Runs the confirmed send on one background thread. Progress comes back
    /// through [`App::tick`].
    pub fn confirm_send_with<M>(&mut self, mailer: M)
    where
        M: Mailer + Send + 'static,
    {
        let Some((plan, settings)) = self.pending.take() else {
            self.mode = AppMode::Form;
            return;
        };

        let options = self.options;
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let mut observer = ChannelObserver(tx.clone());
            let result = deliver(&plan, &settings, &mailer, &options, &mut observer);
            let _ = tx.send(SendEvent::Finished(result));
        });

        self.send_events = Some(rx);
        self.send_thread = Some(handle);
        self.stage = SendStage::Connecting;
        self.mode = AppMode::Sending;
    }

    fn drain_send_events(&mut self) {
        let mut finished = None;
        let mut worker_gone = false;

        if let Some(rx) = &self.send_events {
            loop {
                match rx.try_recv() {
                    Ok(SendEvent::Stage(stage)) => self.stage = stage,
                    Ok(SendEvent::Log(line)) => {
                        log::info!("{}", line);
                        self.log.push(line);
                    }
                    Ok(SendEvent::Finished(result)) => {
                        finished = Some(result);
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        worker_gone = true;
                        break;
                    }
                }
            }
        }

        if let Some(result) = finished {
            self.finish_send(result);
        } else if worker_gone {
            self.abandon_send();
        }
    }

    fn join_send_thread(&mut self) {
        self.send_events = None;
        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                log::error!("Send thread panicked");
            }
        }
    }

    /// The worker hung up without a final report.
    fn abandon_send(&mut self) {
        self.join_send_thread();
        log::error!("Send thread ended without reporting a result");
        self.stage = SendStage::Idle;
        self.open_dialog(
            DialogKind::Error,
            "Hata",
            "Gönderim beklenmedik şekilde sonlandı. Log'u kontrol et.",
        );
    }

    fn finish_send(&mut self, result: Result<SendReport, SendError>) {
        self.join_send_thread();

        match result {
            Ok(report) if report.all_succeeded() => {
                self.stage = SendStage::Reported;
                self.open_dialog(DialogKind::Info, "Bitti", &report.summary());
            }
            Ok(report) => {
                self.stage = SendStage::Reported;
                self.open_dialog(DialogKind::Warning, "Bitti - Hatalar Var", &report.summary());
            }
            Err(e) => {
                log::error!("Send aborted: {}", e);
                self.stage = SendStage::Idle;
                self.open_dialog(DialogKind::Error, "Hata", &e.to_string());
            }
        }
    }

    pub fn open_dialog(&mut self, kind: DialogKind, title: &str, message: &str) {
        self.dialog = Some(Dialog {
            kind,
            title: title.to_string(),
            message: message.to_string(),
        });
        self.mode = AppMode::Dialog;
    }

    pub fn show_error(&mut self, message: &str) {
        self.error_message = Some(message.to_string());
        self.info_message = None;
        self.message_timeout = Some(Instant::now() + Duration::from_secs(5));
    }

    pub fn show_info(&mut self, message: &str) {
        self.info_message = Some(message.to_string());
        self.error_message = None;
        self.message_timeout = Some(Instant::now() + Duration::from_secs(3));
    }

    pub fn tick(&mut self) -> AppResult<()> {
        if let Some(timeout) = self.message_timeout {
            if Instant::now() > timeout {
                self.error_message = None;
                self.info_message = None;
                self.message_timeout = None;
            }
        }

        self.drain_send_events();
        Ok(())
    }
}
