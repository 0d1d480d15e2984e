//! Turns discrepancies into minimal nsupdate command sequences, one script
//! per (server, zone) pair. The tool never talks to a server itself; the
//! scripts are handed to nsupdate separately.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::model::{Discrepancy, RecordData, values_equal_unordered};

pub fn write_scripts(
    discrepancies: &[Discrepancy],
    dir: &Path,
) -> Result<Vec<PathBuf>, std::io::Error> {
    if discrepancies.is_empty() {
        info!("no discrepancies found; update scripts not generated");
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir)?;

    let mut paths = Vec::new();
    for ((server, zone), group) in group_by_server_zone(discrepancies) {
        let Some(script) = render_script(&server, &zone, &group) else {
            continue;
        };
        let path = dir.join(format!(
            "nsupdate_{}_{}",
            sanitize(&server),
            sanitize(zone.trim_end_matches('.'))
        ));
        fs::write(&path, script)?;
        info!("generated update script {}", path.display());
        paths.push(path);
    }
    Ok(paths)
}

fn group_by_server_zone(
    discrepancies: &[Discrepancy],
) -> BTreeMap<(String, String), Vec<&Discrepancy>> {
    let mut groups: BTreeMap<(String, String), Vec<&Discrepancy>> = BTreeMap::new();
    for d in discrepancies {
        if d.server.is_empty() {
            // Not attributable to a server (unparseable inventory data).
            continue;
        }
        if !belongs_to_zone(&d.fqdn, &d.zone_name) {
            // nsupdate answers NOTZONE for names outside the zone block.
            // Reverse records surfaced through a forward zone's check stay
            // in the report but get no corrective command.
            warn!(
                "{} is outside zone {}; skipping script generation for it",
                d.fqdn, d.zone_name
            );
            continue;
        }
        groups
            .entry((d.server.clone(), d.zone_name.clone()))
            .or_default()
            .push(d);
    }
    groups
}

/// Renders one zone block: `server`/`zone` preamble, the minimal
/// delete/add sequence, and a closing `send`. Returns `None` when every
/// discrepancy in the group was skipped.
pub fn render_script(server: &str, zone: &str, discrepancies: &[&Discrepancy]) -> Option<String> {
    let mut commands = Vec::new();
    for d in discrepancies {
        // Discrepancies without an expected payload (unknown record type,
        // failed queries) have nothing to correct.
        let Some(expected) = &d.expected else {
            continue;
        };
        match expected {
            RecordData::Values(expected_values) => {
                let actual_values: &[String] = match &d.actual {
                    Some(RecordData::Values(values)) => values,
                    _ => &[],
                };

                if values_equal_unordered(expected_values, actual_values)
                    && d.expected_ttl != d.actual_ttl
                {
                    // Pure TTL drift: rewrite every value at the corrected
                    // TTL instead of emitting a no-op.
                    for value in expected_values {
                        commands.push(format!(
                            "update delete {} {} {}",
                            d.fqdn, d.record_type, value
                        ));
                        commands.push(format!(
                            "update add {} {} {} {}",
                            d.fqdn, d.expected_ttl, d.record_type, value
                        ));
                    }
                    continue;
                }

                for value in actual_values {
                    if !value_in_set(value, expected_values) {
                        commands.push(format!(
                            "update delete {} {} {}",
                            d.fqdn, d.record_type, value
                        ));
                    }
                }
                for value in expected_values {
                    if !value_in_set(value, actual_values) {
                        commands.push(format!(
                            "update add {} {} {} {}",
                            d.fqdn, d.expected_ttl, d.record_type, value
                        ));
                    }
                }
            }
            RecordData::Soa(soa) => {
                commands.push(format!("update delete {} SOA", d.fqdn));
                commands.push(format!("update add {} {} SOA {soa}", d.fqdn, d.expected_ttl));
            }
        }
    }
    if commands.is_empty() {
        return None;
    }

    let mut script = format!("server {server}\nzone {zone}\n");
    for command in commands {
        script.push_str(&command);
        script.push('\n');
    }
    script.push_str("send\n");
    Some(script)
}

fn belongs_to_zone(fqdn: &str, zone: &str) -> bool {
    let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();
    fqdn == zone || fqdn.ends_with(&format!(".{zone}"))
}

fn value_in_set(needle: &str, values: &[String]) -> bool {
    values
        .iter()
        .any(|value| value.trim().eq_ignore_ascii_case(needle.trim()))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
