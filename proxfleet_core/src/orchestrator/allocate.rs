/*
* Vm id reservation.
*
* Runs once, single threaded, before any clone is dispatched:
* concurrent jobs never allocate ids themselves.
*/
use crate::hypervisor::CloneParams;
use crate::table::{Field, Table, VmRecord};
use crate::validate::HostRegistry;

use std::collections::{BTreeSet, HashMap};

// Error Handling
use log::debug;
use proxfleet_error::{LibError, ProxfleetError};

pub struct IdAllocator<'a> {
    registry: &'a HostRegistry,
    /// Ids written in the table or reserved during this batch.
    taken: BTreeSet<u64>,
    /// Next candidate per host.
    cursors: HashMap<String, u64>,
}

impl<'a> IdAllocator<'a> {
    pub fn new(registry: &'a HostRegistry, table: &Table) -> Self {
        let taken = table
            .rows
            .iter()
            .filter_map(|e| e.newid())
            .filter_map(|e| e.ok())
            .collect();
        Self {
            registry,
            taken,
            cursors: HashMap::new(),
        }
    }

    /// Reserve the lowest id free on the host and in the batch.
    pub fn reserve(&mut self, host: &str) -> Result<u64, ProxfleetError> {
        let inventory = match self.registry.inventory(host) {
            Some(v) => v,
            None => {
                let message = format!("No inventory for host {}", host);
                return Err(LibError::builder()
                    .msg(&message)
                    .help("Ids can only be reserved on reachable hosts.")
                    .build()
                    .into());
            }
        };
        let cursor = self
            .cursors
            .entry(host.to_owned())
            .or_insert(inventory.next_id.max(100));
        let mut id = *cursor;
        while self.taken.contains(&id) || inventory.vm_ids.contains(&id) {
            id += 1;
        }
        self.taken.insert(id);
        *cursor = id + 1;
        debug!("[{}] reserved vm id {}", host, id);
        Ok(id)
    }

    /// Everything a clone needs: template id, vm id and name.
    /// Supplied values are kept, missing ones generated.
    pub fn plan(&mut self, record: &VmRecord) -> Result<CloneParams, ProxfleetError> {
        let host = record.value(Field::TargetHost).unwrap_or_default();
        let template_name = record.value(Field::TemplateName).unwrap_or_default();
        let template = self
            .registry
            .inventory(host)
            .and_then(|e| e.templates.get(template_name))
            .copied();
        let template = match template {
            Some(v) => v,
            None => {
                let message = format!("Unknown template {:?} on host {}", template_name, host);
                return Err(LibError::builder().msg(&message).help("").build().into());
            }
        };
        let name = match record.value(Field::VmName) {
            Some(v) => v.to_owned(),
            None => match record.derived_vm_name() {
                Some(v) => v,
                None => {
                    return Err(LibError::builder()
                        .msg("Can't name the vm")
                        .help("Set student_login, or student_name and student_firstname.")
                        .build()
                        .into())
                }
            },
        };
        let newid = match record.newid() {
            Some(id) => id?,
            None => self.reserve(host)?,
        };
        Ok(CloneParams {
            template,
            newid,
            name,
            pool: record.value(Field::Pool).unwrap_or_default().to_owned(),
            storage: record.value(Field::Storage).unwrap_or_default().to_owned(),
        })
    }
}
