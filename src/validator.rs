use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use hickory_client::rr::{Name, RecordType};
use log::{debug, error, warn};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::answer;
use crate::authority::AuthorityMap;
use crate::dns::{DnsError, DnsGateway};
use crate::model::{
    Discrepancy, FALLBACK_TTL, InventoryRecord, RecordData, RecordKey, ValidationRecord, Zone,
    values_equal_unordered,
};

/// Caller knobs shared by the per-record and bulk validation paths.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub record_successful: bool,
    pub ignore_serial: bool,
    pub zone_filter: Option<String>,
    pub view_filter: Option<String>,
}

pub type Outcome = (Vec<Discrepancy>, Vec<ValidationRecord>);

/// Partitions inventory records into comparison units. SOA records are
/// excluded here; they run through their own validation path.
pub fn group_records(
    records: &[InventoryRecord],
    zone_filter: Option<&str>,
    view_filter: Option<&str>,
) -> HashMap<RecordKey, Vec<InventoryRecord>> {
    let mut groups: HashMap<RecordKey, Vec<InventoryRecord>> = HashMap::new();
    for record in records {
        if record.rtype.eq_ignore_ascii_case("SOA") {
            continue;
        }
        if zone_filter.is_some_and(|zone| record.zone_name != zone) {
            continue;
        }
        if view_filter.is_some_and(|view| record.view_name != view) {
            continue;
        }
        let key = RecordKey {
            fqdn: record.fqdn.clone(),
            record_type: record.rtype.to_uppercase(),
            zone_name: record.zone_name.clone(),
            view_name: record.view_name.clone(),
        };
        groups.entry(key).or_default().push(record.clone());
    }
    groups
}

/// Expected values and TTL for one comparison unit. Unqualified CNAME targets
/// are made absolute with the owning zone; conflicting TTLs within the group
/// keep the first value and warn.
pub fn expected_state(
    key: &RecordKey,
    records: &[InventoryRecord],
    zones_by_name: &HashMap<String, Zone>,
) -> (Vec<String>, u32) {
    let mut values = Vec::with_capacity(records.len());
    let mut ttl = 0u32;
    for record in records {
        let mut value = record.value.clone();
        if key.record_type == "CNAME" && !value.ends_with('.') {
            let zone = record.zone_name.trim_end_matches('.');
            if zone.is_empty() {
                value.push('.');
            } else {
                value = format!("{value}.{zone}.");
            }
        }
        values.push(value);

        let record_ttl = resolve_ttl(key, record, zones_by_name);
        if ttl == 0 {
            ttl = record_ttl;
        } else if ttl != record_ttl {
            warn!(
                "multiple TTLs for {} {} records; keeping {ttl}",
                key.fqdn, key.record_type
            );
        }
    }
    (values, ttl)
}

fn resolve_ttl(
    key: &RecordKey,
    record: &InventoryRecord,
    zones_by_name: &HashMap<String, Zone>,
) -> u32 {
    if let Some(ttl) = record.ttl.filter(|ttl| *ttl > 0) {
        return ttl;
    }
    // NS records at the zone apex inherit the zone's SOA TTL.
    if key.record_type == "NS" && record.name == "@" {
        match zones_by_name.get(&key.zone_name) {
            Some(zone) => {
                if let Some(soa_ttl) = zone.soa_ttl.filter(|ttl| *ttl > 0) {
                    return soa_ttl;
                }
            }
            None => warn!(
                "zone {} not found while resolving apex NS TTL for {}",
                key.zone_name, key.fqdn
            ),
        }
    }
    record
        .zone_default_ttl
        .filter(|ttl| *ttl > 0)
        .unwrap_or(FALLBACK_TTL)
}

/// Validates every non-SOA comparison unit against its authoritative servers,
/// one concurrent task per unit, joining before returning.
pub async fn validate_all(
    gateway: Arc<dyn DnsGateway>,
    records: &[InventoryRecord],
    nameservers: &[crate::model::Nameserver],
    zones_by_name: &HashMap<String, Zone>,
    opts: &RunOptions,
) -> Outcome {
    let authority = Arc::new(AuthorityMap::build(nameservers));
    let zones = Arc::new(zones_by_name.clone());
    let groups = group_records(
        records,
        opts.zone_filter.as_deref(),
        opts.view_filter.as_deref(),
    );
    // Reverse names already validated this run; tasks race to claim them.
    let claimed_ptrs = Arc::new(Mutex::new(HashSet::new()));
    let record_successful = opts.record_successful;

    let mut tasks: JoinSet<Outcome> = JoinSet::new();
    for (key, group) in groups {
        let gateway = Arc::clone(&gateway);
        let authority = Arc::clone(&authority);
        let zones = Arc::clone(&zones);
        let claimed_ptrs = Arc::clone(&claimed_ptrs);
        tasks.spawn(async move {
            let Some(servers) = authority.lookup(&key.zone_name, &key.view_name) else {
                warn!(
                    "no nameservers for zone {:?} in view {:?}; skipping {}",
                    key.zone_name, key.view_name, key.fqdn
                );
                return (Vec::new(), Vec::new());
            };
            let servers = servers.to_vec();
            validate_unit(
                gateway.as_ref(),
                &key,
                &group,
                &servers,
                &zones,
                record_successful,
                &claimed_ptrs,
            )
            .await
        });
    }

    let mut discrepancies = Vec::new();
    let mut successes = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((d, s)) => {
                discrepancies.extend(d);
                successes.extend(s);
            }
            Err(err) => error!("validation task failed: {err}"),
        }
    }
    (discrepancies, successes)
}

async fn validate_unit(
    gateway: &dyn DnsGateway,
    key: &RecordKey,
    group: &[InventoryRecord],
    servers: &[String],
    zones_by_name: &HashMap<String, Zone>,
    record_successful: bool,
    claimed_ptrs: &Mutex<HashSet<String>>,
) -> Outcome {
    let (expected_values, expected_ttl) = expected_state(key, group, zones_by_name);

    let Ok(rtype) = key.record_type.parse::<RecordType>() else {
        error!("unknown record type {} for {}", key.record_type, key.fqdn);
        let discrepancy = Discrepancy {
            fqdn: key.fqdn.clone(),
            record_type: key.record_type.clone(),
            zone_name: key.zone_name.clone(),
            expected: None,
            actual: None,
            expected_ttl: 0,
            actual_ttl: 0,
            server: String::new(),
            message: "Unknown record type".to_string(),
        };
        return (vec![discrepancy], Vec::new());
    };

    let (mut discrepancies, mut successes) = check_unit(
        gateway,
        key,
        &key.fqdn,
        rtype,
        &key.record_type,
        &expected_values,
        expected_ttl,
        servers,
        record_successful,
    )
    .await;

    // Forward address records imply a reverse mapping unless disabled; each
    // derived reverse name is validated at most once per run.
    if rtype == RecordType::A || rtype == RecordType::AAAA {
        for record in group {
            if record.disable_ptr {
                continue;
            }
            let Ok(ip) = record.value.parse::<IpAddr>() else {
                warn!("unparseable address {} on {}", record.value, record.fqdn);
                continue;
            };
            let reverse = reverse_name(ip);
            {
                let mut claimed = claimed_ptrs.lock().await;
                if !claimed.insert(reverse.to_string()) {
                    continue;
                }
            }
            let mut target = record.fqdn.clone();
            if !target.ends_with('.') {
                target.push('.');
            }
            let (d, s) = check_unit(
                gateway,
                key,
                &reverse.to_string(),
                RecordType::PTR,
                "PTR",
                &[target],
                expected_ttl,
                servers,
                record_successful,
            )
            .await;
            discrepancies.extend(d);
            successes.extend(s);
        }
    }

    (discrepancies, successes)
}

fn reverse_name(ip: IpAddr) -> Name {
    match ip {
        IpAddr::V4(addr) => Name::from(addr),
        IpAddr::V6(addr) => Name::from(addr),
    }
}

/// Queries every authoritative server for one (name, type) and classifies the
/// outcome per server.
#[allow(clippy::too_many_arguments)]
async fn check_unit(
    gateway: &dyn DnsGateway,
    key: &RecordKey,
    fqdn: &str,
    rtype: RecordType,
    rtype_label: &str,
    expected_values: &[String],
    expected_ttl: u32,
    servers: &[String],
    record_successful: bool,
) -> Outcome {
    let mut discrepancies = Vec::new();
    let mut successes = Vec::new();

    let discrepancy = |server: &str, actual: Option<RecordData>, actual_ttl: u32, message: &str| {
        Discrepancy {
            fqdn: fqdn.to_string(),
            record_type: rtype_label.to_string(),
            zone_name: key.zone_name.clone(),
            expected: Some(RecordData::Values(expected_values.to_vec())),
            actual,
            expected_ttl,
            actual_ttl,
            server: server.to_string(),
            message: message.to_string(),
        }
    };

    let name = match Name::from_utf8(fqdn) {
        Ok(name) => name,
        Err(err) => {
            warn!("invalid name {fqdn}: {err}");
            return (
                vec![discrepancy("", None, 0, &format!("DNS query error: {err}"))],
                successes,
            );
        }
    };

    for server in servers {
        debug!(
            "validating {fqdn} {rtype_label} against {server}, expecting {:?}",
            expected_values
        );
        match gateway.query(&name, rtype, server).await {
            Err(DnsError::NxDomain) => {
                warn!("NXDOMAIN for {fqdn} from {server}");
                discrepancies.push(discrepancy(
                    server,
                    Some(RecordData::Values(Vec::new())),
                    0,
                    "Record missing (NXDOMAIN)",
                ));
            }
            Err(err) => {
                warn!("DNS query error for {fqdn} from {server}: {err}");
                discrepancies.push(discrepancy(
                    server,
                    None,
                    0,
                    &format!("DNS query error: {err}"),
                ));
            }
            Ok(answers) if answers.is_empty() => {
                warn!("no DNS answer for {fqdn} from {server}");
                discrepancies.push(discrepancy(
                    server,
                    Some(RecordData::Values(Vec::new())),
                    0,
                    "Record missing",
                ));
            }
            Ok(answers) => {
                let (actual_values, actual_ttl) = answer::reduce(fqdn, &answers);
                if !values_equal_unordered(expected_values, &actual_values)
                    || expected_ttl != actual_ttl
                {
                    warn!("record values or TTL mismatch for {fqdn} on {server}");
                    discrepancies.push(discrepancy(
                        server,
                        Some(RecordData::Values(actual_values)),
                        actual_ttl,
                        "",
                    ));
                } else if record_successful {
                    debug!("{fqdn} {rtype_label} validated successfully on {server}");
                    successes.push(ValidationRecord {
                        fqdn: fqdn.to_string(),
                        record_type: rtype_label.to_string(),
                        zone_name: key.zone_name.clone(),
                        expected: RecordData::Values(expected_values.to_vec()),
                        actual: RecordData::Values(actual_values),
                        expected_ttl,
                        actual_ttl,
                        server: server.clone(),
                        message: "Record validated successfully".to_string(),
                    });
                }
            }
        }
    }

    (discrepancies, successes)
}
