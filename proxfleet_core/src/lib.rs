#![allow(unused_imports)]
#![allow(unused_variables)]

/*
* Proxfleet core: bulk virtual machine operations
* on clusterless Proxmox hosts, driven by a csv table.
*/
pub mod action;
pub mod cli;
pub mod config;
pub mod display;
pub mod executor;
pub mod hypervisor;
pub mod orchestrator;
pub mod outcome;
pub mod table;
pub mod validate;

// Reexport
pub use action::Action;
pub use config::ProxfleetConfig;
pub use orchestrator::{ActionRequest, Orchestrator};
pub use outcome::{OperationOutcome, Reason};
pub use table::{Field, Table, VmRecord, VmStatus};
