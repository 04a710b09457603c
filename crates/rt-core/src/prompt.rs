use crate::error::Result;

/// How a line addressed to the operator should stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Emphasis,
    Success,
    Warning,
    Danger,
}

/// Operator interaction. Only the command layer asks questions; everything
/// below it is non-interactive.
pub trait Prompter {
    /// Show `note` and ask whether to continue. `sensitive` marks changes to
    /// production-like environments, rendered more prominently.
    fn confirm(&self, note: &str, sensitive: bool) -> Result<bool>;

    /// Ask a free-form question; an empty answer yields `default`.
    fn ask(&self, question: &str, default: &str) -> Result<String>;

    /// Progress line.
    fn say(&self, tone: Tone, message: &str);
}
