use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};
use tracing::{debug, info, warn};

pub const NOTIFICATION_TITLE: &str = "Tasklet";
pub const DESKTOP_PROGRAM: &str = "notify-send";

/// Fire-and-forget messages to the user.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

/// Blocking dialogs: a message the user must see, and a yes/no question.
pub trait Prompter {
    fn alert(&mut self, message: &str);
    fn confirm(&mut self, message: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
    Unsupported,
}

impl Permission {
    /// Resolved once at startup from config and the presence of the desktop
    /// helper on `PATH`.
    pub fn detect(enabled: Option<bool>, program: &str) -> Self {
        let permission = match enabled {
            None => Permission::Default,
            Some(false) => Permission::Denied,
            Some(true) if program_on_path(program) => Permission::Granted,
            Some(true) => Permission::Unsupported,
        };
        debug!(?permission, program, "resolved desktop notification permission");
        permission
    }
}

fn program_on_path(program: &str) -> bool {
    if Path::new(program).is_absolute() {
        return Path::new(program).is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Terminal dialogs, with desktop notifications when permission was granted.
///
/// Notifications fall back to a plain alert line whenever the desktop path is
/// unavailable or fails.
#[derive(Debug)]
pub struct ConsoleUi<R, W> {
    input: R,
    output: W,
    assume_yes: bool,
    permission: Permission,
    program: String,
}

impl ConsoleUi<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(assume_yes: bool, permission: Permission) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), assume_yes, permission)
    }
}

impl<R: BufRead, W: Write> ConsoleUi<R, W> {
    pub fn new(input: R, output: W, assume_yes: bool, permission: Permission) -> Self {
        Self {
            input,
            output,
            assume_yes,
            permission,
            program: DESKTOP_PROGRAM.to_string(),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn send_desktop(&self, message: &str) -> anyhow::Result<()> {
        let output = Command::new(&self.program)
            .arg(NOTIFICATION_TITLE)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(anyhow!(
                "{} exited with status {}: {}",
                self.program,
                output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                stderr
            ));
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Prompter for ConsoleUi<R, W> {
    fn alert(&mut self, message: &str) {
        if let Err(err) = writeln!(self.output, "{message}") {
            warn!(error = %err, "failed to write alert");
        }
    }

    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            debug!(message, "confirmation assumed");
            return true;
        }

        if write!(self.output, "{message} [y/N] ")
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(err) => {
                warn!(error = %err, "failed to read confirmation");
                false
            }
        }
    }
}

impl<R: BufRead, W: Write> Notifier for ConsoleUi<R, W> {
    fn notify(&mut self, message: &str) {
        if self.permission == Permission::Granted {
            match self.send_desktop(message) {
                Ok(()) => {
                    info!(message, "emitted desktop notification");
                    return;
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "desktop notification failed; using alert");
                }
            }
        }
        self.alert(message);
    }
}

/// Captures every dialog and notification; answers confirmations with a
/// fixed reply.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub alerts: Vec<String>,
    pub confirms: Vec<String>,
    pub notifications: Vec<String>,
    pub answer: bool,
}

impl Recorder {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }
}

impl Prompter for Recorder {
    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn confirm(&mut self, message: &str) -> bool {
        self.confirms.push(message.to_string());
        self.answer
    }
}

impl Notifier for Recorder {
    fn notify(&mut self, message: &str) {
        self.notifications.push(message.to_string());
    }
}
