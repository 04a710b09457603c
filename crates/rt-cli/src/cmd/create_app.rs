use crate::context::Settings;
use crate::prompter::TerminalPrompter;
use anyhow::Context;
use rt_core::commands::create_app::create_app;
use rt_core::paths;
use std::path::Path;

pub fn run(settings: &Settings, skeleton: &str, path: &Path) -> anyhow::Result<()> {
    let app = settings.app()?;
    if !path.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }
    let skeletons = paths::skeletons_dir(&settings.rt_home);
    create_app(&TerminalPrompter::new(), &skeletons, skeleton, app, path)
        .with_context(|| format!("failed to create application {app:?}"))?;
    Ok(())
}
