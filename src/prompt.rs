use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Operator interaction, injected wherever a run may need an answer.
pub trait Prompter {
    /// Yes/no question. Empty input takes `default`; end of input is "no".
    fn confirm(&mut self, question: &str, default: bool) -> bool;

    /// Free-form answer, `None` at end of input.
    fn ask(&mut self, question: &str) -> Option<String>;
}

/// Interprets a typed answer to a yes/no question.
pub fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

fn hint(default: bool) -> &'static str {
    if default { "(Y/n)" } else { "(y/N)" }
}

/// Reads answers from stdin; questions go to stderr so `--quiet` never
/// hides a prompt that is waiting for input.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line(&self, prompt: &str) -> Option<String> {
        let mut err = io::stderr();
        let _ = write!(err, "{}", prompt);
        let _ = err.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                let _ = writeln!(err);
                None
            }
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        match self.read_line(&format!("{} {}: ", question, hint(default))) {
            Some(answer) => parse_answer(&answer, default),
            None => false,
        }
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        self.read_line(&format!("{} ", question))
    }
}

/// Replays canned answers in order; once they run out it behaves like a
/// closed stdin.
#[derive(Debug, Default)]
pub struct Scripted {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scripted {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompter for Scripted {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        self.asked.push(question.to_string());
        match self.answers.pop_front() {
            Some(answer) => parse_answer(&answer, default),
            None => false,
        }
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        self.asked.push(question.to_string());
        self.answers.pop_front()
    }
}
