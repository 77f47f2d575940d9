// src/executor/confirm.rs

use crate::agent::CancelToken;
use crate::protocol::Action;
use colored::Colorize;
use std::io::{self, BufRead, Stdout, Write};

const AFFIRMATIVE: [&str; 4] = ["j", "ja", "y", "yes"];

type LineReader = Box<dyn FnMut(&mut String) -> io::Result<usize>>;

/// Human sign-off for critical actions.
pub trait Confirmer {
    fn confirm(&mut self, action: &Action) -> bool;
}

/// Blocking console prompt. Anything but an explicit yes, including EOF or a
/// read error, counts as no.
pub struct PromptConfirmer<W> {
    read_line: LineReader,
    output: W,
    cancel: Option<CancelToken>,
}

impl PromptConfirmer<Stdout> {
    /// Locks stdin per answer only, so the task prompt can share it.
    pub fn stdin(cancel: CancelToken) -> Self {
        Self {
            read_line: Box::new(|buf: &mut String| io::stdin().read_line(buf)),
            output: io::stdout(),
            cancel: Some(cancel),
        }
    }
}

impl<W: Write> PromptConfirmer<W> {
    pub fn new<R: BufRead + 'static>(mut input: R, output: W) -> Self {
        Self {
            read_line: Box::new(move |buf: &mut String| input.read_line(buf)),
            output,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn render(&mut self, action: &Action) -> io::Result<()> {
        let rule = "=".repeat(60);
        writeln!(self.output)?;
        writeln!(self.output, "{}", rule)?;
        writeln!(
            self.output,
            "{}",
            "⚠️  CRITICAL ACTION - CONFIRMATION REQUIRED".yellow().bold()
        )?;
        writeln!(self.output, "{}", rule)?;
        writeln!(self.output, "Action: {}", action.kind())?;
        writeln!(self.output, "Parameters: {}", action.command())?;
        writeln!(self.output, "Reasoning: {}", action.reasoning())?;
        writeln!(self.output, "{}", "-".repeat(60))?;
        write!(self.output, "Execute action? (y/n): ")?;
        self.output.flush()
    }
}

impl<W: Write> Confirmer for PromptConfirmer<W> {
    fn confirm(&mut self, action: &Action) -> bool {
        if self.render(action).is_err() {
            return false;
        }

        let mut line = String::new();
        let answered = match (self.read_line)(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => AFFIRMATIVE.contains(&line.trim().to_lowercase().as_str()),
        };

        let cancelled = self.cancel.as_ref().is_some_and(|c| c.is_cancelled());
        answered && !cancelled
    }
}
