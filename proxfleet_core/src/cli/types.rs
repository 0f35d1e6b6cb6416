use crate::action::Action;
use crate::config::CredentialArgs;

use clap::{Parser, ValueHint};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;

/// Bulk virtual machine management on Proxmox hosts, driven by a csv file.
#[derive(Debug, Parser)]
#[command(name = "proxfleet", version, about, long_about = None)]
pub struct Cli {
    /// The csv file describing the vms, updated in place.
    #[arg(short, long, value_name = "CSV", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// The operation to run on every row.
    #[arg(short, long, value_enum)]
    pub action: Action,

    /// Configuration file (default: /etc/proxfleet/config.toml).
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Print validation reports as json.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,
}
