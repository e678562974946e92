use console::style;
use std::io::{BufRead, Write};

use super::{Decision, SelectionPolicy};
use crate::catalog::CatalogItem;
use crate::Result;

/// Includes every offered item without asking
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeAll;

impl SelectionPolicy for IncludeAll {
    fn decide(&mut self, _item: &CatalogItem) -> Result<Decision> {
        Ok(Decision::IncludeAll)
    }
}

/// Asks the operator about each item on a line-oriented terminal
///
/// End of input excludes the item, so a closed stdin never loops.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl LinePrompt<std::io::StdinLock<'static>, std::io::Stderr> {
    /// Prompt on stderr, read answers from stdin
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SelectionPolicy for LinePrompt<R, W> {
    fn decide(&mut self, item: &CatalogItem) -> Result<Decision> {
        loop {
            write!(
                self.output,
                "Transcribe {} ({}) [{}]? [y]es/[n]o/[a]ll: ",
                style(&item.title).bold(),
                item.id,
                item.status()
            )?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                writeln!(self.output)?;
                return Ok(Decision::Exclude);
            }

            match parse_answer(&answer) {
                Some(decision) => return Ok(decision),
                None => writeln!(
                    self.output,
                    "{}",
                    style("Please answer yes, no or all.").yellow()
                )?,
            }
        }
    }
}

/// Map a typed answer to a decision
pub fn parse_answer(answer: &str) -> Option<Decision> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(Decision::Include),
        "n" | "no" => Some(Decision::Exclude),
        "a" | "all" => Some(Decision::IncludeAll),
        _ => None,
    }
}
