use colored::Colorize;
use rt_core::prompt::{Prompter, Tone};
use rt_core::{Result, RtError};

/// Questions on the terminal, progress lines on stdout.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        TerminalPrompter
    }
}

fn prompt_error(e: dialoguer::Error) -> RtError {
    RtError::Usage(format!("unable to read the answer: {e}"))
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, note: &str, sensitive: bool) -> Result<bool> {
        if sensitive {
            println!("{}", note.red().bold());
        } else {
            println!("{}", note.bold());
        }
        dialoguer::Confirm::new()
            .with_prompt("Do you want to continue?")
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn ask(&self, question: &str, default: &str) -> Result<String> {
        let mut input = dialoguer::Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn say(&self, tone: Tone, message: &str) {
        match tone {
            Tone::Plain => println!("{message}"),
            Tone::Emphasis => println!("{}", message.bold()),
            Tone::Success => println!("{}", message.green()),
            Tone::Warning => println!("{}", message.yellow()),
            Tone::Danger => println!("{}", message.red().bold()),
        }
    }
}
