//! Plaintext SMTP responder on 127.0.0.1 for driving the real session code
//! in tests.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::SmtpSettings;

#[derive(Debug, Clone, Default)]
pub struct TestSmtpServer {
    /// Recipients answered with 550 at RCPT.
    pub reject_rcpt: Vec<String>,
    pub reject_auth: bool,
}

/// Handle to a server running on its own thread. Connections are served one
/// after another for the life of the test process.
pub struct RunningServer {
    pub port: u16,
    events: Arc<Mutex<Vec<String>>>,
}

impl TestSmtpServer {
    pub fn rejecting(recipient: &str) -> Self {
        Self {
            reject_rcpt: vec![recipient.to_string()],
            ..Self::default()
        }
    }

    pub fn start(self) -> RunningServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let events = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&events);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = self.serve(stream, &recorded);
            }
        });

        RunningServer { port, events }
    }

    fn serve(&self, stream: TcpStream, events: &Mutex<Vec<String>>) -> io::Result<()> {
        let record = |event: String| events.lock().unwrap().push(event);

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        record("connect".to_string());
        writer.write_all(b"220 localhost ESMTP ready\r\n")?;

        let mut accepted = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let command = line.trim_end().to_string();
            let upper = command.to_ascii_uppercase();

            if upper.starts_with("EHLO") || upper.starts_with("HELO") {
                writer.write_all(b"250-localhost\r\n250 AUTH PLAIN LOGIN\r\n")?;
            } else if upper == "STARTTLS" {
                record("starttls".to_string());
                writer.write_all(b"454 4.7.0 TLS not available\r\n")?;
            } else if upper.starts_with("AUTH") {
                if self.reject_auth {
                    record("auth rejected".to_string());
                    writer.write_all(b"535 5.7.8 Authentication credentials invalid\r\n")?;
                } else {
                    record("auth".to_string());
                    writer.write_all(b"235 2.7.0 Authentication successful\r\n")?;
                }
            } else if upper.starts_with("MAIL FROM") {
                accepted.clear();
                writer.write_all(b"250 2.1.0 Ok\r\n")?;
            } else if upper.starts_with("RCPT TO") {
                let address = command
                    .split_once('<')
                    .and_then(|(_, rest)| rest.split_once('>'))
                    .map(|(address, _)| address.to_string())
                    .unwrap_or_default();
                if self.reject_rcpt.contains(&address) {
                    record(format!("rejected {}", address));
                    writer.write_all(b"550 5.1.1 no such user\r\n")?;
                } else {
                    accepted.push(address);
                    writer.write_all(b"250 2.1.5 Ok\r\n")?;
                }
            } else if upper == "DATA" {
                writer.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")?;
                loop {
                    line.clear();
                    if reader.read_line(&mut line)? == 0 {
                        return Ok(());
                    }
                    if line.trim_end() == "." {
                        break;
                    }
                }
                for address in accepted.drain(..) {
                    record(format!("delivered {}", address));
                }
                writer.write_all(b"250 2.0.0 Ok: queued\r\n")?;
            } else if upper == "QUIT" {
                record("quit".to_string());
                writer.write_all(b"221 2.0.0 Bye\r\n")?;
                return Ok(());
            } else {
                writer.write_all(b"250 Ok\r\n")?;
            }
        }
    }
}

impl RunningServer {
    pub fn settings(&self) -> SmtpSettings {
        SmtpSettings {
            smtp_server: "127.0.0.1".to_string(),
            smtp_port: self.port,
            username: "sender@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| event.strip_prefix("delivered "))
            .map(str::to_string)
            .collect()
    }
}
