//! User-facing notification rendering. The session controller emits
//! semantic events only; every notice shown to the user is worded by the
//! shell and styled here, degrading to plain labeled text when stdout is
//! not a terminal.

use std::{
    io::{self, IsTerminal},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Correct-answer verdict.
    Success,
    /// Incorrect-answer verdict; not an error.
    Failure,
    /// Progress and recovery messages.
    Info,
    /// Network or server trouble.
    Error,
}

/// One notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Failure,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

/// Prints a notice. Verdicts get ✅/❌ marks and color on a terminal and
/// ASCII labels when piped; errors go to stderr either way.
pub fn notify(notice: &Notice) {
    let styled = io::stdout().is_terminal();
    match notice.kind {
        NoticeKind::Success => {
            if styled {
                println!("✅ {}", notice.text.green());
            } else {
                println!("[OK] {}", notice.text);
            }
        }
        NoticeKind::Failure => {
            if styled {
                println!("❌ {}", notice.text.red());
            } else {
                println!("[X] {}", notice.text);
            }
        }
        NoticeKind::Info => {
            if styled {
                println!("{}", notice.text.dimmed());
            } else {
                println!("[INFO] {}", notice.text);
            }
        }
        NoticeKind::Error => {
            if styled {
                eprintln!("{}", notice.text.red().bold());
            } else {
                eprintln!("[ERROR] {}", notice.text);
            }
        }
    }
}

/// Renders the live problem as its own block under a section label.
pub fn print_problem(prompt: &str) {
    println!();
    if io::stdout().is_terminal() {
        println!("{}", "Problem".bold());
        println!("  {prompt}");
    } else {
        println!("Problem: {prompt}");
    }
}

/// Animated activity indicator shown while a fetch or submission is in
/// flight. Disabled off-terminal so piped output carries no control
/// sequences; dropping it clears the line.
pub struct ActivitySpinner {
    bar: Option<ProgressBar>,
}

impl ActivitySpinner {
    pub fn start(message: &str) -> Self {
        if !io::stdout().is_terminal() {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner} {msg}");
        if let Ok(style) = style {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Self { bar: Some(bar) }
    }
}

impl Drop for ActivitySpinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
