use crate::context::Settings;
use crate::output::print_json;
use rt_core::schema::RT_VERSION;
use rt_core::terraform::{Driver, DriverOptions};
use serde::Serialize;

#[derive(Serialize)]
struct Versions {
    rt: &'static str,
    terraform: Option<String>,
}

pub fn run(settings: &Settings) -> anyhow::Result<()> {
    let terraform = Driver::from_options(&DriverOptions {
        log_path: None,
        echo: false,
    })
    .and_then(|driver| driver.version());
    let terraform = match terraform {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("terraform version unavailable: {e}");
            None
        }
    };

    if settings.json {
        return print_json(&Versions {
            rt: RT_VERSION,
            terraform,
        });
    }
    println!("rt {RT_VERSION}");
    println!(
        "terraform {}",
        terraform.as_deref().unwrap_or("unavailable")
    );
    Ok(())
}
