use crate::context::{self, Needs, Settings};
use crate::output::{print_json, print_table, time};
use rt_core::commands::listing::{self, AppSummary, SlotDeployments, SlotSummary, LISTED_OUTPUTS};

pub fn apps(settings: &Settings) -> anyhow::Result<()> {
    let store = context::open_store_only(settings)?;
    let apps = listing::list_apps(&store)?;
    if settings.json {
        return print_json(&apps);
    }
    let mut headers = vec!["APP", "ACTIVE", "LAST DEPLOYED"];
    headers.extend(LISTED_OUTPUTS.iter().copied());
    print_table(&headers, app_rows(&apps));
    Ok(())
}

fn app_rows(apps: &[AppSummary]) -> Vec<Vec<String>> {
    apps.iter()
        .map(|a| {
            let mut row = vec![
                a.name.clone(),
                if a.is_active { "yes" } else { "no" }.to_string(),
                time(a.last_deployment_time),
            ];
            row.extend(
                LISTED_OUTPUTS
                    .iter()
                    .map(|k| a.outputs.get(*k).cloned().unwrap_or_default()),
            );
            row
        })
        .collect()
}

pub fn slots(settings: &Settings) -> anyhow::Result<()> {
    let session = context::open(settings, Needs::default())?;
    let slots = listing::list_slots(&session)?;
    if settings.json {
        return print_json(&slots);
    }
    if slots.is_empty() {
        println!("No slots found for {:?} in {:?}.", session.app, session.env);
        return Ok(());
    }
    print_table(&["SLOT", "STATE", "SINCE", "BY"], slot_rows(&slots));
    Ok(())
}

fn slot_rows(slots: &[SlotSummary]) -> Vec<Vec<String>> {
    slots
        .iter()
        .map(|s| {
            vec![
                s.slot_id.clone(),
                s.state.label().to_string(),
                time(s.since),
                s.pilot
                    .as_ref()
                    .map(|p| p.aws_api_caller.clone())
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

pub fn deployments(settings: &Settings, slot_id: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let session = context::open(settings, Needs::default())?;
    let found = listing::list_deployments(&session, slot_id, limit)?;
    if settings.json {
        return print_json(&found);
    }
    print_table(
        &["SLOT", "STARTED", "FINISHED", "EXIT", "CHANGES", "BY"],
        deployment_rows(&found),
    );
    Ok(())
}

fn deployment_rows(found: &[SlotDeployments]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for slot in found {
        for d in &slot.deployments {
            let run = d.terraform.as_ref();
            rows.push(vec![
                slot.slot_id.clone(),
                time(Some(d.start_time)),
                time(run.and_then(|r| r.finish_time)),
                run.filter(|r| r.finish_time.is_some())
                    .map(|r| r.exit_code.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                run.and_then(|r| r.resource_diff)
                    .map(|d| format!("+{} ~{} -{}", d.created, d.changed, d.removed))
                    .unwrap_or_default(),
                d.deploy_pilot
                    .as_ref()
                    .map(|p| p.aws_api_caller.clone())
                    .unwrap_or_default(),
            ]);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::commands::listing::SlotState;
    use rt_core::schema::DeployPilot;
    use std::collections::BTreeMap;

    #[test]
    fn app_rows_fill_missing_outputs() {
        let apps = vec![AppSummary {
            name: "hello".into(),
            is_active: true,
            last_deployment_time: None,
            outputs: BTreeMap::from([("app".to_string(), "hello".to_string())]),
        }];
        assert_eq!(
            app_rows(&apps),
            vec![vec!["hello", "yes", "-", "hello", ""]]
        );
    }

    #[test]
    fn slot_rows_name_the_pilot() {
        let slots = vec![SlotSummary {
            slot_id: "stable13".into(),
            state: SlotState::LastDeployed,
            since: None,
            pilot: Some(DeployPilot {
                aws_api_caller: "arn:aws:iam::1:user/op".into(),
                ip_address: "8.8.8.8".into(),
            }),
        }];
        assert_eq!(
            slot_rows(&slots),
            vec![vec!["stable13", "last deployed", "-", "arn:aws:iam::1:user/op"]]
        );
    }
}
