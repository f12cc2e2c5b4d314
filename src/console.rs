// Terminal front-end: styled stage output for `run` and the stdin-driven
// confirmations of `wizard`.

use std::io::{self, BufRead, Write};

use colored::Colorize;

use crate::workflow::{extract_function, Presenter, Stage, WorkflowEvent};

/// Prints stage progress to any writer, stdout by default.
pub struct ConsolePresenter<W: Write = io::Stdout> {
    out: W,
}

impl ConsolePresenter {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_event(&mut self, event: WorkflowEvent<'_>) -> io::Result<()> {
        match event {
            WorkflowEvent::Started(stage) => {
                writeln!(self.out, "{}", stage.running_label().dimmed())?;
            }
            WorkflowEvent::Finished { stage, output } => {
                writeln!(self.out, "{}", stage.done_label().green().bold())?;
                match (stage, output) {
                    (_, None) => {}
                    (Stage::CodeGeneration, Some(text)) => {
                        writeln!(self.out, "{}\n{}", "Generated Output:".yellow(), text.yellow())?;
                        if let Some(code) = extract_function(text) {
                            writeln!(self.out, "\n{}\n{}", "Extracted function:".cyan().bold(), code)?;
                        }
                    }
                    (_, Some(text)) => writeln!(self.out, "{}", text.green())?,
                }
            }
            WorkflowEvent::Failed { stage, error } => {
                writeln!(
                    self.out,
                    "{}",
                    format!("{} failed: {}", stage.title(), error).red().bold()
                )?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn on_event(&mut self, event: WorkflowEvent<'_>) {
        if let Err(e) = self.write_event(event) {
            tracing::warn!("Failed to write stage output: {}", e);
        }
    }
}

/// Asks a yes/no question; an empty answer counts as yes, end of input as no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<bool> {
    write!(out, "{} {} ", question.bold(), "[Y/n]".dimmed())?;
    out.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        writeln!(out)?;
        return Ok(false);
    }
    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn error_message(error: &anyhow::Error) -> String {
    format!("An error occurred: {:#}", error)
}

pub fn print_error(error: &anyhow::Error) {
    eprintln!("{}", error_message(error).red().bold());
}
