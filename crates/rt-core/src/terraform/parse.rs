//! Scraping structured results out of Terraform's human-readable output.

use super::PlanResourceDiff;
use crate::schema::ResourceDiff;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn plan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `[^ ]{0,6}` swallows the colour reset that follows "Plan:".
    RE.get_or_init(|| {
        Regex::new(r"Plan:[^ ]{0,6} ([0-9]+) to add, ([0-9]+) to change, ([0-9]+) to destroy")
            .expect("valid regex")
    })
}

fn apply_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:Apply|Destroy) complete! Resources: (([0-9]+) added, )?(([0-9]+) changed, )?([0-9]+) destroyed",
        )
        .expect("valid regex")
    })
}

fn warnings_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Warnings:\n\x1b\[0m\x1b\[0m\n(.+?)\n\n").expect("valid regex")
    })
}

fn outputs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Outputs:\n\n(.+)").expect("valid regex"))
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid regex"))
}

fn empty_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Outputs:\n").expect("valid regex"))
}

fn number(caps: &regex::Captures<'_>, idx: usize) -> u64 {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Counts from the `Plan: N to add, ...` summary; all zeros when absent.
pub fn plan_diff(stdout: &str) -> PlanResourceDiff {
    match plan_re().captures(stdout) {
        Some(caps) => PlanResourceDiff {
            to_create: number(&caps, 1),
            to_change: number(&caps, 2),
            to_remove: number(&caps, 3),
        },
        None => PlanResourceDiff::default(),
    }
}

/// Counts from `Apply complete!` or `Destroy complete!`; all zeros when absent.
pub fn apply_diff(stdout: &str) -> ResourceDiff {
    match apply_re().captures(stdout) {
        Some(caps) => ResourceDiff {
            created: number(&caps, 2),
            changed: number(&caps, 4),
            removed: number(&caps, 5),
        },
        None => ResourceDiff::default(),
    }
}

/// Bulleted warnings block, stripped of colour codes.
pub fn warnings(stdout: &str) -> Vec<String> {
    const PREFIX: &str = "\x1b[33m  * ";
    const SUFFIX: &str = "\x1b[0m\x1b[0m";
    let Some(caps) = warnings_re().captures(stdout) else {
        return Vec::new();
    };
    caps[1]
        .split('\n')
        .map(|w| {
            let w = w.strip_prefix(PREFIX).unwrap_or(w);
            w.strip_suffix(SUFFIX).unwrap_or(w).to_string()
        })
        .collect()
}

/// Top-level `key = value` pairs of the `Outputs:` section of apply output.
///
/// Lists and maps span several lines and are skipped, as are their indented
/// members.
pub fn apply_outputs(stdout: &str) -> BTreeMap<String, String> {
    let mut outputs = BTreeMap::new();
    let Some(caps) = outputs_re().captures(stdout) else {
        return outputs;
    };
    let section = ansi_re().replace_all(&caps[1], "");
    for line in section.lines() {
        let parts: Vec<&str> = line.split(" = ").collect();
        if parts.len() != 2 {
            continue;
        }
        let key = parts[0].trim();
        if key != parts[0] {
            continue;
        }
        let value = parts[1].trim();
        if value == "{" || value == "[" {
            tracing::warn!(output = key, "skipping output that looks like a list or map");
            continue;
        }
        outputs.insert(key.to_string(), value.to_string());
    }
    outputs
}

/// Flat `key = value` lines of `terraform output -no-color`.
pub fn output_command(stdout: &str) -> BTreeMap<String, String> {
    let mut outputs = BTreeMap::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split(" = ").collect();
        if parts.len() != 2 {
            continue;
        }
        let value = parts[1].trim();
        if value.starts_with('{') || value.starts_with('[') {
            tracing::warn!(output = parts[0], "skipping output that looks like a list or map");
            continue;
        }
        outputs.insert(parts[0].to_string(), value.to_string());
    }
    outputs
}

/// `terraform show` output of a state holding no resources.
pub fn is_empty_state(show: &str) -> bool {
    show.is_empty() || empty_state_re().is_match(show)
}

/// `Terraform v0.7.13` → `0.7.13`.
pub fn engine_version(stdout: &str) -> Option<String> {
    let first = stdout.lines().next()?.trim();
    let version = first.strip_prefix("Terraform v")?;
    Some(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_summary_is_parsed() {
        let d = plan_diff("Plan: 11 to add, 23 to change, 9 to destroy.");
        assert_eq!(
            d,
            PlanResourceDiff {
                to_create: 11,
                to_change: 23,
                to_remove: 9
            }
        );
    }

    #[test]
    fn coloured_plan_summary_is_parsed() {
        let out = "\x1b[0m\n\x1b[0m\x1b[1mPlan:\x1b[0m 1 to add, 0 to change, 0 to destroy.\x1b[0m\n";
        assert_eq!(plan_diff(out).to_create, 1);
    }

    #[test]
    fn missing_plan_summary_is_zero() {
        let d = plan_diff("No changes. Infrastructure is up-to-date.");
        assert_eq!(d, PlanResourceDiff::default());
        assert!(d.is_empty());
    }

    #[test]
    fn plan_diff_round_trips_through_summary_line() {
        for (a, c, r) in [(0, 0, 0), (1, 0, 0), (0, 7, 0), (3, 2, 1), (120, 45, 999)] {
            let line = format!("Plan: {a} to add, {c} to change, {r} to destroy.");
            let d = plan_diff(&line);
            assert_eq!((d.to_create, d.to_change, d.to_remove), (a, c, r));
        }
    }

    #[test]
    fn apply_and_destroy_summaries_are_parsed() {
        let apply = "\x1b[0m\x1b[1m\x1b[32m\nApply complete! Resources: 0 added, 0 changed, 1 destroyed.\x1b[0m\n";
        assert_eq!(
            apply_diff(apply),
            ResourceDiff {
                created: 0,
                removed: 1,
                changed: 0
            }
        );
        let destroy = "\x1b[0m\x1b[1m\x1b[32m\nDestroy complete! Resources: 1 destroyed.\x1b[0m\n";
        assert_eq!(apply_diff(destroy).removed, 1);
        assert_eq!(
            apply_diff("Apply complete! Resources: 1 added, 2 changed, 0 destroyed."),
            ResourceDiff {
                created: 1,
                removed: 0,
                changed: 2
            }
        );
    }

    #[test]
    fn warnings_are_stripped_of_colour() {
        let out = "There are warnings and/or errors related to your configuration. Please\nfix these before continuing.\n\n\x1b[33mWarnings:\n\x1b[0m\x1b[0m\n\x1b[33m  * template_file.blah: deprecated\x1b[0m\x1b[0m\n\x1b[33m  * template_file.current: deprecated\x1b[0m\x1b[0m\n\n";
        assert_eq!(
            warnings(out),
            vec![
                "template_file.blah: deprecated".to_string(),
                "template_file.current: deprecated".to_string()
            ]
        );
        assert!(warnings("Plan: 1 to add, 0 to change, 0 to destroy.").is_empty());
    }

    #[test]
    fn apply_outputs_are_parsed() {
        let out = "\nState path: terraform.tfstate\x1b[0m\n\x1b[0m\x1b[1m\x1b[32m\nOutputs:\n\nid = vpc-6cc7f308\nyada = yololo\x1b[0m\n";
        let outputs = apply_outputs(out);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["id"], "vpc-6cc7f308");
        assert_eq!(outputs["yada"], "yololo");

        let single = "State path: terraform.tfstate\x1b[0m\n\x1b[0m\x1b[1m\x1b[32m\nOutputs:\n\nyololo = yada\x1b[0m\n";
        assert_eq!(apply_outputs(single)["yololo"], "yada");
    }

    #[test]
    fn structured_apply_outputs_are_skipped() {
        let out = "Outputs:\n\nmylist = [\n    us-east-1a,\n    us-east-1c\n]\nmymap = {\n  one = 111\n  two = 222\n}\nmystring = sdfasdfasdf\x1b[0m\n";
        let outputs = apply_outputs(out);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["mystring"], "sdfasdfasdf");
    }

    #[test]
    fn output_command_skips_structured_values() {
        let out = "app = hello\nlb_fqdn = hello.example.com\nzones = [a, b]\nnested = {x = 1}\n";
        let outputs = output_command(out);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["lb_fqdn"], "hello.example.com");
    }

    #[test]
    fn empty_state_detection() {
        assert!(is_empty_state(""));
        assert!(is_empty_state("Outputs:\n\napp = hello"));
        assert!(!is_empty_state("aws_sns_topic.s:\n  id = arn:aws:sns"));
    }

    #[test]
    fn engine_version_strips_prefix() {
        assert_eq!(
            engine_version("Terraform v0.7.13\n\nYour version is out of date").as_deref(),
            Some("0.7.13")
        );
        assert_eq!(engine_version("OpenTofu v1.6.0"), None);
    }
}
