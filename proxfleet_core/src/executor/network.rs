/*
* Bridge assignment of vm network interfaces.
*
* A Proxmox interface is a comma separated option list,
* ex: "virtio=BC:24:11:2E:07:AA,bridge=vmbr0,firewall=1".
* Only the bridge option is rewritten, in place.
*/
use std::collections::BTreeMap;

/// Set the bridge of an interface definition, keeping its other options.
/// An absent interface is created as a virtio nic.
pub fn rebuild(current: Option<&str>, bridge: &str) -> String {
    let current = match current {
        Some(v) if !v.trim().is_empty() => v,
        _ => return format!("model=virtio,bridge={}", bridge),
    };
    let mut replaced = false;
    let mut options: Vec<String> = vec![];
    for option in current.split(',').map(|e| e.trim()).filter(|e| !e.is_empty()) {
        if option.starts_with("bridge=") {
            if !replaced {
                options.push(format!("bridge={}", bridge));
                replaced = true;
            }
        } else {
            options.push(option.to_owned());
        }
    }
    if !replaced {
        options.push(format!("bridge={}", bridge));
    }
    options.join(",")
}

/// The interface definitions to submit, empty when the vm
/// already uses the wanted bridges.
pub fn plan(
    current: &BTreeMap<String, String>,
    wanted: &[(&str, &str)],
) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();
    for (iface, bridge) in wanted {
        let existing = current.get(*iface).map(|e| e.as_str());
        let rebuilt = rebuild(existing, bridge);
        if existing != Some(rebuilt.as_str()) {
            changes.insert(iface.to_string(), rebuilt);
        }
    }
    changes
}
