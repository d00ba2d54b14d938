//! Doctor command - Check the tools a profile needs.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use launchpad_core::{Launcher, LauncherOptions, ProfileKind, ToolReport};
use launchpad_runner::ProcessRunner;

use crate::render::StatusPrinter;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Profile whose requirements are checked
    #[arg(short, long, default_value = "js-full-stack")]
    profile: ProfileKind,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: DoctorArgs, quiet: bool) -> Result<()> {
    let launcher = Launcher::new(Arc::new(ProcessRunner::default()), LauncherOptions::default());

    let printer = Arc::new(StatusPrinter::new(quiet || args.json));
    let _updates = launcher.on_status_update({
        let printer = printer.clone();
        move |status| printer.print(&status)
    });

    if !args.json {
        println!("🩺 Checking tools for {}", args.profile);
    }
    let report = launcher.check_tools(args.profile).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report_lines(&report) {
            println!("{}", line);
        }
        println!();
        println!("✅ All required tools are available");
    }
    Ok(())
}

fn report_lines(report: &ToolReport) -> Vec<String> {
    let mut lines = vec![
        format!("   git      {}", report.git),
        format!("   node     {}", report.node),
    ];
    if let Some(pm) = report.package_manager {
        lines.push(format!("   scripts  {}", pm));
    }
    if let Some(java) = &report.java {
        lines.push(format!("   java     {}", java));
    }
    if let Some(home) = &report.java_home {
        lines.push(format!("   JAVA_HOME {}", home.display()));
    }
    match &report.maven {
        Some(maven) => lines.push(format!("   maven    {}", maven)),
        None if report.java.is_some() => lines.push("   ⚠️  maven not found".to_string()),
        None => {}
    }
    lines
}
