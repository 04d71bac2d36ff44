//! The interaction boundary between the engine and the user.
//!
//! The engine never draws a dialog itself. Whenever an action needs to tell
//! the user something or ask them for a value, it calls a [`Presentation`]
//! method and blocks on the answer. A `None` answer means the user
//! cancelled.
//!
//! [`ScriptedPresentation`] replays canned answers and records everything
//! shown, so the engine can be exercised end-to-end without a terminal.

use std::collections::VecDeque;

use chrono::{NaiveDate, NaiveTime};

/// A blocking source of user interaction.
pub trait Presentation {
    /// Show an informational message.
    fn show_message(&mut self, text: &str);

    /// Ask a yes/no question.
    fn confirm(&mut self, text: &str) -> bool;

    /// Ask for a single line of text.
    fn prompt_text(&mut self, prompt: &str, default: Option<&str>) -> Option<String>;

    /// Ask for multi-line text.
    fn prompt_long_text(&mut self, prompt: &str, default: Option<&str>) -> Option<String>;

    /// Ask for an integer.
    fn prompt_int(&mut self, prompt: &str, default: Option<i64>) -> Option<i64>;

    /// Ask for a date.
    fn prompt_date(&mut self, prompt: &str, default: Option<NaiveDate>) -> Option<NaiveDate>;

    /// Ask for a time of day.
    fn prompt_time(&mut self, prompt: &str, default: Option<NaiveTime>) -> Option<NaiveTime>;

    /// Ask for an interval, in seconds.
    fn prompt_interval(&mut self, prompt: &str, default: Option<i64>) -> Option<i64>;

    /// Ask the user to pick one of `options`. Returns the chosen index.
    fn present_choice(&mut self, prompt: &str, options: &[String]) -> Option<usize>;

    /// Play a sound file.
    fn play_sound(&mut self, file: &str);

    /// Capture a photo, after showing `prompt`.
    fn capture_photo(&mut self, prompt: &str);
}

/// One canned answer for [`ScriptedPresentation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Answer to [`Presentation::confirm`].
    Confirm(bool),
    /// Answer to a text prompt.
    Text(String),
    /// Answer to [`Presentation::prompt_int`].
    Int(i64),
    /// Answer to [`Presentation::prompt_date`].
    Date(NaiveDate),
    /// Answer to [`Presentation::prompt_time`].
    Time(NaiveTime),
    /// Answer to [`Presentation::prompt_interval`].
    Interval(i64),
    /// Answer to [`Presentation::present_choice`].
    Choice(usize),
    /// Cancel whatever is asked.
    Cancel,
}

/// A presentation that replays canned answers.
///
/// Answers are consumed in order. When the queue is empty, `confirm`
/// returns `confirm_default` and every prompt is cancelled. An answer of
/// the wrong shape for the prompt counts as a cancel.
#[derive(Debug, Clone)]
pub struct ScriptedPresentation {
    answers: VecDeque<Answer>,
    /// Returned by `confirm` once the queue is exhausted.
    pub confirm_default: bool,
    /// Every message shown, in order.
    pub messages: Vec<String>,
    /// Every question or prompt asked, in order.
    pub prompts: Vec<String>,
    /// Every sound played.
    pub sounds: Vec<String>,
    /// Every photo prompt.
    pub photos: Vec<String>,
}

impl Default for ScriptedPresentation {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPresentation {
    /// Create a presentation with no canned answers that accepts every
    /// confirmation.
    pub const fn new() -> Self {
        Self {
            answers: VecDeque::new(),
            confirm_default: true,
            messages: Vec::new(),
            prompts: Vec::new(),
            sounds: Vec::new(),
            photos: Vec::new(),
        }
    }

    /// Create a presentation that replays `answers` in order.
    pub fn with_answers(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Queue another answer.
    pub fn push(&mut self, answer: Answer) {
        self.answers.push_back(answer);
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    /// Whether any shown message contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }

    fn next_answer(&mut self, prompt: &str) -> Option<Answer> {
        self.prompts.push(prompt.to_owned());
        self.answers.pop_front()
    }
}

impl Presentation for ScriptedPresentation {
    fn show_message(&mut self, text: &str) {
        self.messages.push(text.to_owned());
    }

    fn confirm(&mut self, text: &str) -> bool {
        match self.next_answer(text) {
            Some(Answer::Confirm(yes)) => yes,
            Some(_) => false,
            None => self.confirm_default,
        }
    }

    fn prompt_text(&mut self, prompt: &str, _default: Option<&str>) -> Option<String> {
        match self.next_answer(prompt)? {
            Answer::Text(text) => Some(text),
            _ => None,
        }
    }

    fn prompt_long_text(&mut self, prompt: &str, default: Option<&str>) -> Option<String> {
        self.prompt_text(prompt, default)
    }

    fn prompt_int(&mut self, prompt: &str, _default: Option<i64>) -> Option<i64> {
        match self.next_answer(prompt)? {
            Answer::Int(value) => Some(value),
            _ => None,
        }
    }

    fn prompt_date(&mut self, prompt: &str, _default: Option<NaiveDate>) -> Option<NaiveDate> {
        match self.next_answer(prompt)? {
            Answer::Date(date) => Some(date),
            _ => None,
        }
    }

    fn prompt_time(&mut self, prompt: &str, _default: Option<NaiveTime>) -> Option<NaiveTime> {
        match self.next_answer(prompt)? {
            Answer::Time(time) => Some(time),
            _ => None,
        }
    }

    fn prompt_interval(&mut self, prompt: &str, _default: Option<i64>) -> Option<i64> {
        match self.next_answer(prompt)? {
            Answer::Interval(secs) => Some(secs),
            _ => None,
        }
    }

    fn present_choice(&mut self, prompt: &str, options: &[String]) -> Option<usize> {
        match self.next_answer(prompt)? {
            Answer::Choice(index) if index < options.len() => Some(index),
            _ => None,
        }
    }

    fn play_sound(&mut self, file: &str) {
        self.sounds.push(file.to_owned());
    }

    fn capture_photo(&mut self, prompt: &str) {
        self.photos.push(prompt.to_owned());
    }
}
