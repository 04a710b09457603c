//! `create-app`: start a new application from a skeleton directory.

use crate::error::{Result, RtError};
use crate::io;
use crate::paths;
use crate::prompt::{Prompter, Tone};
use crate::template;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `<skeleton>.variables.json`, next to the skeleton directory.
#[derive(Debug, Default, Deserialize)]
struct SkeletonVariables {
    #[serde(default)]
    variables: BTreeMap<String, Variable>,
}

#[derive(Debug, Default, Deserialize)]
struct Variable {
    #[serde(default)]
    description: String,
    #[serde(default)]
    default: Option<String>,
}

fn load_variables(path: &Path) -> Result<BTreeMap<String, Variable>> {
    let data = std::fs::read(path)?;
    let parsed: SkeletonVariables = serde_json::from_slice(&data).map_err(|e| {
        RtError::Config(format!("Error unmarshalling {:?}: {e}", path.display().to_string()))
    })?;
    Ok(parsed.variables)
}

/// Ask until answered; an empty answer takes the default when there is one.
fn ask_for(prompter: &dyn Prompter, var: &Variable) -> Result<String> {
    let default = var.default.as_deref().unwrap_or_default();
    loop {
        let answer = prompter.ask(&var.description, default)?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        if let Some(default) = &var.default {
            return Ok(default.clone());
        }
    }
}

/// Copy `<skeletons>/<skeleton>` to `<target>/<app>`, ask for the skeleton's
/// variables in name order and render its templates in place.
pub fn create_app(
    prompter: &dyn Prompter,
    skeletons: &Path,
    skeleton: &str,
    app: &str,
    target: &Path,
) -> Result<PathBuf> {
    let source = skeletons.join(skeleton);
    if !source.is_dir() {
        return Err(RtError::Usage(format!(
            "Skeleton {skeleton:?} not found in {:?}",
            skeletons.display().to_string()
        )));
    }
    let dest = target.join(app);
    tracing::debug!(from = %source.display(), to = %dest.display(), "copying skeleton");
    io::copy_tree(&source, &dest)?;

    let declared = load_variables(&skeletons.join(format!("{skeleton}.variables.json")))?;
    let mut vars = BTreeMap::new();
    for (name, var) in &declared {
        vars.insert(name.clone(), ask_for(prompter, var)?);
    }
    vars.insert("AppName".to_string(), app.to_string());

    template::process_templates_and_delete(&dest, paths::TEMPLATE_SUFFIX, &vars)?;
    prompter.say(
        Tone::Success,
        &format!("Application {app:?} created in {:?}", dest.display().to_string()),
    );
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPrompter;
    use tempfile::TempDir;

    fn skeleton(dir: &Path) {
        let web = dir.join("web");
        std::fs::create_dir_all(web.join("modules")).unwrap();
        std::fs::write(
            web.join("main.tf.tpl"),
            "app = \"{{ .AppName }}\"\nteam = \"{{ .Team }}\"\nsize = \"{{ .Size }}\"\n",
        )
        .unwrap();
        std::fs::write(web.join("modules/readme.md"), "static").unwrap();
        std::fs::write(
            dir.join("web.variables.json"),
            r#"{"variables": {
                "Team": {"description": "Owning team"},
                "Size": {"description": "Instance size", "default": "t2.micro"}
            }}"#,
        )
        .unwrap();
    }

    #[test]
    fn renders_skeleton_with_answers() {
        let skeletons = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        skeleton(skeletons.path());
        let prompter = ScriptedPrompter::default().answers(&["", "", "payments"]);

        let dest = create_app(&prompter, skeletons.path(), "web", "hello", target.path()).unwrap();
        assert_eq!(dest, target.path().join("hello"));
        let main = std::fs::read_to_string(dest.join("main.tf")).unwrap();
        assert_eq!(
            main,
            "app = \"hello\"\nteam = \"payments\"\nsize = \"t2.micro\"\n"
        );
        assert!(!dest.join("main.tf.tpl").exists());
        assert!(dest.join("modules/readme.md").exists());
        // Sorted by name: Size first, then Team asked twice.
        assert_eq!(
            prompter.questions(),
            vec!["Instance size", "Owning team", "Owning team"]
        );
    }

    #[test]
    fn unknown_skeleton_fails() {
        let skeletons = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let prompter = ScriptedPrompter::default();
        let err = create_app(&prompter, skeletons.path(), "nope", "hello", target.path())
            .unwrap_err();
        assert!(err.to_string().contains("Skeleton \"nope\" not found"));
    }
}
