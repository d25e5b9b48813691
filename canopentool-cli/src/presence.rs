//! Node presence configuration
//!
//! The monitor de-emphasizes silent nodes that are not expected on the bus.
//! Expectations come from two optional files: `/etc/canopen/managers.conf`
//! maps the interface to a network name, and the network's `nodelist.cpj`
//! marks individual nodes present. Everything here is best-effort: a missing
//! or unparseable file means every node is treated as present.

use std::fs;
use std::path::Path;

use configparser::ini::Ini;

use canopentool_client::monitor::NODE_SLOTS;

use crate::num;

const CONFIG_DIR: &str = "/etc/canopen";

/// Load the presence table for an interface
///
/// The lookup uses the interface name as the operator supplied it, before any
/// numeric rewriting.
pub fn load_presence(interface: &str) -> [bool; NODE_SLOTS] {
    load_presence_from(Path::new(CONFIG_DIR), interface)
}

fn load_presence_from(config_dir: &Path, interface: &str) -> [bool; NODE_SLOTS] {
    let all_present = [true; NODE_SLOTS];

    let managers = match fs::read_to_string(config_dir.join("managers.conf")) {
        Ok(content) => content,
        Err(_) => return all_present,
    };
    let network = match find_network(&managers, interface) {
        Some(network) => network,
        None => return all_present,
    };
    let nodelist = match fs::read_to_string(config_dir.join(&network).join("nodelist.cpj")) {
        Ok(content) => content,
        Err(_) => return all_present,
    };
    parse_nodelist(&nodelist).unwrap_or(all_present)
}

/// Find the network name for an interface in managers.conf content
///
/// Records are whitespace-separated lines:
/// `<interface> <baudrate> <node-id> <network-name>`. The first matching
/// line wins; short or malformed lines are skipped.
fn find_network(managers: &str, interface: &str) -> Option<String> {
    for line in managers.lines() {
        let mut fields = line.split_whitespace();
        let (Some(entry_interface), Some(_baudrate), Some(_node_id), Some(network)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        if entry_interface == interface {
            return Some(network.to_string());
        }
    }
    None
}

/// Parse a nodelist.cpj into a presence table
///
/// The file is INI-like; a key `Node<N>Present` (any case, any section) with
/// value 0x01 marks node N present. Returns None if the content is not
/// parseable at all.
fn parse_nodelist(content: &str) -> Option<[bool; NODE_SLOTS]> {
    let mut ini = Ini::new();
    let sections = ini.read(content.to_string()).ok()?;

    let mut present = [false; NODE_SLOTS];
    for keys in sections.values() {
        for (key, value) in keys {
            let Some(rest) = key.strip_prefix("node") else {
                continue;
            };
            let Some(number) = rest.strip_suffix("present") else {
                continue;
            };
            let Ok(node) = number.parse::<usize>() else {
                continue;
            };
            if node == 0 || node >= NODE_SLOTS {
                continue;
            }
            let marked = value
                .as_deref()
                .and_then(|v| num::parse_base0(v).ok())
                .is_some_and(|v| v == 1);
            if marked {
                present[node] = true;
            }
        }
    }
    Some(present)
}
