//! daokit deploys governance templates: a network of contracts created in
//! dependency order with their permissions wired in between.

mod cli;
mod config;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, OutputFormat};
use daokit_deploy::{
    DeployConfig, DeploymentReport, DeploymentResult, Registry, Step, TemplateDeployer,
    TemplateSpec, cancel_pair, plan_for_target,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Deploy {
            ref template,
            ref contract,
        } => {
            let config = config::load(cli.config.as_deref(), &cli.overrides)?;
            deploy(&config, template, contract).await
        }
        Command::Plan {
            ref template,
            ref contract,
            format,
        } => {
            let config = config::load(cli.config.as_deref(), &cli.overrides)?;
            print_plan(&config, template, contract.as_deref(), format)
        }
        Command::Report { ref path, format } => print_report(path, format),
    }
}

async fn deploy(config: &DeployConfig, template: &str, contract: &str) -> Result<()> {
    tracing::info!(
        template = %template,
        contract = %contract,
        network = %config.network,
        "Deploying template..."
    );

    let deployer = TemplateDeployer::from_config(config).await?;

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, stopping after the in-flight step");
            cancel.cancel();
        }
    });

    let outcome = deployer.deploy_template(template, contract, &signal).await?;
    let address = outcome.into_result()?;

    println!("{address}");
    Ok(())
}

fn print_plan(
    config: &DeployConfig,
    template: &str,
    contract: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let spec = TemplateSpec::load(&config.templates, template)?;
    let plan = plan_for_target(&spec, contract)
        .with_context(|| format!("Failed to plan template {template}"))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let registry = Registry::load_or_empty(&config.registry)?;
    let known = |role: &str| {
        registry
            .resolve(&config.network, role)
            .map(|address| address.to_string())
            .unwrap_or_default()
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Kind", "Step", "Registry"]);
    for (index, step) in plan.steps.iter().enumerate() {
        let registry_entry = match step {
            Step::Create { role, .. } => known(role),
            Step::Wire(_) => String::new(),
        };
        table.add_row(vec![
            index.to_string(),
            step.kind().to_string(),
            step.to_string(),
            registry_entry,
        ]);
    }

    println!("Template: {} (primary: {})", plan.template, plan.primary);
    println!("{table}");

    if !plan.external_roles.is_empty() {
        let mut external = Table::new();
        external
            .load_preset(UTF8_FULL)
            .set_header(vec!["External role", "Registry"]);
        for role in &plan.external_roles {
            let entry = known(role);
            external.add_row(vec![
                role.clone(),
                if entry.is_empty() {
                    "missing".to_string()
                } else {
                    entry
                },
            ]);
        }
        println!("{external}");
    }

    Ok(())
}

fn print_report(path: &Path, format: OutputFormat) -> Result<()> {
    let report = DeploymentReport::load_from_file(path)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Template: {} ({}) on {}",
        report.template, report.template_fingerprint, report.network
    );
    println!("Started: {}  Finished: {}", report.started_at, report.finished_at);

    let mut steps = Table::new();
    steps
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Step", "Status", "Transaction"]);
    for (index, record) in report.steps.iter().enumerate() {
        let status = if record.reused {
            format!("{} (registry)", record.status)
        } else {
            record.status.to_string()
        };
        steps.add_row(vec![
            index.to_string(),
            record.step.to_string(),
            status,
            record.tx_hash.map(|hash| hash.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{steps}");

    let mut addresses = Table::new();
    addresses
        .load_preset(UTF8_FULL)
        .set_header(vec!["Role", "Address"]);
    for (role, entry) in report.addresses.iter() {
        addresses.add_row(vec![role.clone(), entry.address.to_string()]);
    }
    println!("{addresses}");

    match &report.result {
        DeploymentResult::Success { primary_address } => {
            println!("Success: {} at {primary_address}", report.primary);
        }
        DeploymentResult::Failure { step_index, reason } => {
            println!("Failed at step {step_index}: {reason}");
        }
    }

    Ok(())
}
