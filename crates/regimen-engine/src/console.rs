//! Console presentation over stdin/stdout.
//!
//! A reader thread forwards stdin lines into a channel. The tick loop
//! polls it for commands without blocking; prompts block on it until the
//! user answers.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use chrono::{NaiveDate, NaiveTime};
use regimen_core::Presentation;
use regimen_types::{format_interval, parse_date, parse_interval, parse_time_of_day};
use tracing::{debug, info, warn};

/// Terminator line for multi-line input.
const END_OF_TEXT: &str = ".";

/// Console-backed [`Presentation`].
pub struct ConsolePresentation {
    lines: Receiver<String>,
    closed: bool,
}

impl ConsolePresentation {
    /// Start the stdin reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "stdin read failed");
                        break;
                    }
                }
            }
            debug!("stdin closed");
        });
        Self {
            lines: rx,
            closed: false,
        }
    }

    /// The next pending command line, if one was typed.
    pub fn poll_command(&mut self) -> Option<String> {
        match self.lines.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// Whether stdin has been closed.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn ask(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt} ");
        if let Err(err) = std::io::stdout().flush() {
            debug!(%err, "stdout flush failed");
        }
        match self.lines.recv() {
            Ok(line) => Some(line.trim().to_owned()),
            Err(_disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// Ask with a default shown in brackets. Empty input takes the default;
    /// empty input without a default cancels.
    fn ask_with_default(&mut self, prompt: &str, default: Option<String>) -> Option<String> {
        let shown = match &default {
            Some(value) => format!("{prompt} [{value}]"),
            None => prompt.to_owned(),
        };
        let answer = self.ask(&shown)?;
        if answer.is_empty() { default } else { Some(answer) }
    }

    fn ask_parsed<T>(
        &mut self,
        prompt: &str,
        default: Option<String>,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        loop {
            let answer = self.ask_with_default(prompt, default.clone())?;
            match parse(&answer) {
                Some(value) => return Some(value),
                None => println!("Could not read '{answer}', try again."),
            }
        }
    }
}

impl Presentation for ConsolePresentation {
    fn show_message(&mut self, text: &str) {
        println!("{text}");
    }

    fn confirm(&mut self, text: &str) -> bool {
        loop {
            let Some(answer) = self.ask(&format!("{text} [y/n]")) else {
                return false;
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => println!("Please answer y or n."),
            }
        }
    }

    fn prompt_text(&mut self, prompt: &str, default: Option<&str>) -> Option<String> {
        self.ask_with_default(prompt, default.map(str::to_owned))
    }

    fn prompt_long_text(&mut self, prompt: &str, default: Option<&str>) -> Option<String> {
        println!("{prompt} (end with a line containing only '{END_OF_TEXT}')");
        if let Some(default) = default {
            println!("Currently: {default}");
        }
        let mut text = Vec::new();
        loop {
            let line = self.ask(">")?;
            if line == END_OF_TEXT {
                break;
            }
            text.push(line);
        }
        if text.is_empty() {
            default.map(str::to_owned)
        } else {
            Some(text.join("\n"))
        }
    }

    fn prompt_int(&mut self, prompt: &str, default: Option<i64>) -> Option<i64> {
        self.ask_parsed(prompt, default.map(|d| d.to_string()), |s| s.parse().ok())
    }

    fn prompt_date(&mut self, prompt: &str, default: Option<NaiveDate>) -> Option<NaiveDate> {
        self.ask_parsed(
            &format!("{prompt} (YYYY-MM-DD)"),
            default.map(|d| d.format("%Y-%m-%d").to_string()),
            parse_date,
        )
    }

    fn prompt_time(&mut self, prompt: &str, default: Option<NaiveTime>) -> Option<NaiveTime> {
        self.ask_parsed(
            &format!("{prompt} (HH:MM)"),
            default.map(|t| t.format("%H:%M").to_string()),
            parse_time_of_day,
        )
    }

    fn prompt_interval(&mut self, prompt: &str, default: Option<i64>) -> Option<i64> {
        self.ask_parsed(
            &format!("{prompt} ([D ]HH:MM)"),
            default.map(format_interval),
            parse_interval,
        )
    }

    fn present_choice(&mut self, prompt: &str, options: &[String]) -> Option<usize> {
        println!("{prompt}");
        for (n, option) in options.iter().enumerate() {
            println!("  {}) {option}", n.saturating_add(1));
        }
        self.ask_parsed("Choice:", None, |s| {
            s.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .filter(|index| *index < options.len())
        })
    }

    fn play_sound(&mut self, file: &str) {
        info!(file, "Sound");
        println!("[sound: {file}]");
    }

    fn capture_photo(&mut self, prompt: &str) {
        info!(prompt, "Photo requested");
        println!("[camera] {prompt}");
    }
}
