use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use bulkmail::app::{App, AppError, AppResult};
use bulkmail::send::{SendObserver, SendStage};
use bulkmail::ui::ui;
use bulkmail::{send, DeliveryOptions, ImageSource, SendOutcome, SendRequest, SmtpMailer, SmtpSecurity, SmtpSettings};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use log::error;
use ratatui::prelude::*;

/// Send one email per recipient, each with its own image attachment
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the settings file (defaults to ~/.mail_gui_config.json)
    #[clap(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Write log output to this file (the form is otherwise silent)
    #[clap(long)]
    log_file: Option<String>,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save SMTP settings
    Configure {
        /// SMTP server address
        #[clap(long)]
        smtp_server: Option<String>,

        /// SMTP server port
        #[clap(long)]
        smtp_port: Option<u16>,

        /// Login, also used as the From address
        #[clap(long)]
        username: Option<String>,

        /// Password (stored in clear text)
        #[clap(long)]
        password: Option<String>,
    },

    /// Print the saved SMTP settings
    ShowConfig,

    /// Send without the form
    Send(SendArgs),
}

#[derive(ClapArgs, Debug)]
struct SendArgs {
    /// File with recipients, separated by commas or newlines ("-" for stdin)
    #[clap(short, long)]
    recipients: String,

    /// Subject line
    #[clap(short, long, default_value = "")]
    subject: String,

    /// File holding the plain-text body
    #[clap(short, long)]
    body_file: Option<String>,

    /// One image attached for every recipient
    #[clap(long, conflicts_with = "folder")]
    image: Option<String>,

    /// Folder with 1.png, 2.png, ... matched to recipients in order
    #[clap(long)]
    folder: Option<String>,

    /// Skip the confirmation prompt
    #[clap(short, long)]
    yes: bool,

    /// Pause after each sent message, in milliseconds
    #[clap(long, default_value = "600")]
    delay_ms: u64,

    /// Connection security (none, starttls, ssl)
    #[clap(long, default_value = "starttls")]
    security: String,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logger(&args)?;

    let config_path = match &args.config {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => SmtpSettings::default_path().context("Cannot determine the home directory")?,
    };
    let settings = SmtpSettings::load(&config_path);

    match args.command {
        Some(Commands::Configure {
            smtp_server,
            smtp_port,
            username,
            password,
        }) => {
            let mut settings = settings;
            if let Some(server) = smtp_server {
                settings.smtp_server = server;
            }
            if let Some(port) = smtp_port {
                settings.smtp_port = port;
            }
            if let Some(username) = username {
                settings.username = username;
            }
            if let Some(password) = password {
                settings.password = password;
            }

            settings
                .save(&config_path)
                .with_context(|| format!("Failed to save settings to {}", config_path.display()))?;
            println!("Ayarlar kaydedildi: {}", config_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::ShowConfig) => {
            println!("Settings file: {}", config_path.display());
            println!("SMTP Server:   {}", settings.smtp_server);
            println!("Port:          {}", settings.smtp_port);
            println!("E-posta:       {}", settings.username);
            println!("Şifre:         {}", settings.masked_password());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Send(send_args)) => run_headless(&settings, send_args),
        None => {
            run_form(settings, config_path)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logger(args: &Args) -> Result<()> {
    let level = if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if let Some(path) = &args.log_file {
        let path = shellexpand::tilde(path).into_owned();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    } else if args.command.is_none() {
        // Log output would draw over the form.
        builder.filter_level(log::LevelFilter::Off);
    }

    builder.init();
    Ok(())
}

struct ConsoleObserver;

impl SendObserver for ConsoleObserver {
    fn stage(&mut self, stage: SendStage) {
        log::debug!("Stage: {}", stage);
    }

    fn log(&mut self, line: &str) {
        println!("{}", line);
    }
}

fn read_text(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("Failed to read stdin")?;
        return Ok(text);
    }
    let path = shellexpand::tilde(path).into_owned();
    fs::read_to_string(Path::new(&path)).with_context(|| format!("Failed to read {}", path))
}

fn ask_confirmation(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes" | "e" | "E" | "evet"),
        Err(_) => false,
    }
}

fn run_headless(settings: &SmtpSettings, args: SendArgs) -> Result<ExitCode> {
    let images = match (&args.image, &args.folder) {
        (Some(image), _) => ImageSource::single(image)?,
        (None, Some(folder)) => ImageSource::folder(folder)?,
        (None, None) => ImageSource::None,
    };

    let request = SendRequest {
        recipients_raw: read_text(&args.recipients)?,
        subject: args.subject,
        body: match &args.body_file {
            Some(path) => read_text(path)?,
            None => String::new(),
        },
        images,
    };

    let options = DeliveryOptions {
        message_delay: Duration::from_millis(args.delay_ms),
        ..DeliveryOptions::default()
    };

    let security = match SmtpSecurity::parse(&args.security) {
        Some(security) => security,
        None => {
            println!("Invalid SMTP security setting. Using StartTLS.");
            SmtpSecurity::StartTLS
        }
    };

    let yes = args.yes;
    let outcome = send(
        &request,
        settings,
        &SmtpMailer::new(security),
        &options,
        |_, prompt| yes || ask_confirmation(prompt),
        &mut ConsoleObserver,
    );

    match outcome {
        Ok(SendOutcome::Declined) => Ok(ExitCode::SUCCESS),
        Ok(SendOutcome::Completed(report)) => {
            println!("{}", report.summary());
            for (address, reason) in report.failures() {
                eprintln!("  {}: {}", address, reason);
            }
            Ok(if report.all_succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Err(e) => {
            error!("Send failed: {}", e);
            eprintln!("Hata: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_form(settings: SmtpSettings, config_path: PathBuf) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    io::stdout()
        .execute(EnterAlternateScreen)
        .context("Failed to enter alternate screen")?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("Failed to create terminal")?;

    let mut app = App::new(settings, config_path);

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode().context("Failed to disable raw mode")?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;

    if let Err(err) = result {
        error!("Error: {:?}", err);
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> AppResult<()> {
    let mut consecutive_errors = 0;
    const MAX_CONSECUTIVE_ERRORS: u32 = 10;

    loop {
        if let Err(e) = terminal.draw(|frame| ui(frame, app)) {
            consecutive_errors += 1;
            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                return Err(AppError::IoError(e));
            }
            continue;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Err(e) = app.handle_key_event(key) {
                        app.show_error(&format!("Error: {}", e));
                        consecutive_errors += 1;

                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            return Err(e);
                        }
                    } else {
                        consecutive_errors = 0;
                    }

                    if app.should_quit {
                        return Ok(());
                    }
                }
            }
        }

        if let Err(e) = app.tick() {
            app.show_error(&format!("Update error: {}", e));
            consecutive_errors += 1;

            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                return Err(e);
            }
        }
    }
}
