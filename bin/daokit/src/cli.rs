use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use url::Url;

/// How `plan` and `report` print their result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "daokit")]
#[command(
    author,
    version,
    about = "Deploy governance templates: contracts in dependency order, permissions wired once both ends exist"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DAOKIT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Daokit.toml configuration file, or a directory holding one.
    ///
    /// Defaults to ./Daokit.toml, then <config dir>/daokit/Daokit.toml.
    /// Every setting can also be set with a DAOKIT_<SETTING> environment variable.
    #[arg(short, long, alias = "conf", env = "DAOKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings given on the command line. They take precedence over the
/// configuration file and the environment.
#[derive(Debug, Clone, Default, Parser, Serialize)]
pub struct ConfigOverrides {
    /// Network name used for registry lookups.
    #[arg(short, long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// JSON-RPC endpoint of the node.
    #[arg(long, alias = "rpc", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,

    /// Sender account, unlocked on the node.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    /// JSON file of known deployments.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,

    /// Directory of compiled contract artifacts.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,

    /// Directory of template files.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,

    /// Where deployment reports are written.
    #[arg(long, alias = "outdata", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdata: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy a template and print the address of the target contract.
    Deploy {
        /// Template identifier, e.g. reputation-template-oracle.
        template: String,
        /// Contract (or role) whose address is reported, e.g. ReputationOracleTemplate.
        contract: String,
    },
    /// Print the deployment plan of a template without touching the network.
    Plan {
        template: String,
        /// Contract (or role) reported as primary.
        #[arg(long)]
        contract: Option<String>,
        #[arg(long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Print a saved deployment report.
    Report {
        path: PathBuf,
        #[arg(long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}
