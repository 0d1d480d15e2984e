//! SOA validation runs apart from the generic engine: the inventory value is
//! a structured 7-field tuple and serial comparison is caller-controlled.

use std::collections::HashMap;
use std::sync::Arc;

use hickory_client::rr::{Name, RData, RecordType};
use log::{debug, error, warn};
use tokio::task::JoinSet;

use crate::authority::AuthorityMap;
use crate::dns::{DnsError, DnsGateway};
use crate::model::{
    Discrepancy, FALLBACK_TTL, InventoryRecord, Nameserver, RecordData, SoaRecord,
    ValidationRecord, Zone,
};
use crate::validator::{Outcome, RunOptions};

pub async fn validate_soa_records(
    gateway: Arc<dyn DnsGateway>,
    records: &[InventoryRecord],
    nameservers: &[Nameserver],
    zones_by_name: &HashMap<String, Zone>,
    opts: &RunOptions,
) -> Outcome {
    let authority = Arc::new(AuthorityMap::build(nameservers));
    let zones = Arc::new(zones_by_name.clone());
    let ignore_serial = opts.ignore_serial;
    let record_successful = opts.record_successful;

    let mut tasks: JoinSet<Outcome> = JoinSet::new();
    for record in records {
        if !record.rtype.eq_ignore_ascii_case("SOA") {
            continue;
        }
        if opts
            .zone_filter
            .as_deref()
            .is_some_and(|zone| record.zone_name != zone)
        {
            continue;
        }
        if opts
            .view_filter
            .as_deref()
            .is_some_and(|view| record.view_name != view)
        {
            continue;
        }
        let record = record.clone();
        let gateway = Arc::clone(&gateway);
        let authority = Arc::clone(&authority);
        let zones = Arc::clone(&zones);
        tasks.spawn(async move {
            let Some(servers) = authority.lookup(&record.zone_name, &record.view_name) else {
                warn!(
                    "no nameservers for zone {:?} in view {:?}; skipping SOA of {}",
                    record.zone_name, record.view_name, record.fqdn
                );
                return (Vec::new(), Vec::new());
            };
            let servers = servers.to_vec();
            validate_soa(
                gateway.as_ref(),
                &record,
                &servers,
                &zones,
                ignore_serial,
                record_successful,
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
            Err(err) => error!("SOA validation task failed: {err}"),
        }
    }
    (discrepancies, successes)
}

pub(crate) fn soa_ttl(record: &InventoryRecord, zones_by_name: &HashMap<String, Zone>) -> u32 {
    if let Some(ttl) = record.ttl.filter(|ttl| *ttl > 0) {
        return ttl;
    }
    if let Some(zone) = zones_by_name.get(&record.zone_name) {
        if let Some(ttl) = zone.soa_ttl.filter(|ttl| *ttl > 0) {
            return ttl;
        }
    }
    record
        .zone_default_ttl
        .filter(|ttl| *ttl > 0)
        .unwrap_or(FALLBACK_TTL)
}

async fn validate_soa(
    gateway: &dyn DnsGateway,
    record: &InventoryRecord,
    servers: &[String],
    zones_by_name: &HashMap<String, Zone>,
    ignore_serial: bool,
    record_successful: bool,
) -> Outcome {
    let discrepancy = |server: &str,
                       expected: Option<RecordData>,
                       actual: Option<RecordData>,
                       expected_ttl: u32,
                       actual_ttl: u32,
                       message: &str| Discrepancy {
        fqdn: record.fqdn.clone(),
        record_type: "SOA".to_string(),
        zone_name: record.zone_name.clone(),
        expected,
        actual,
        expected_ttl,
        actual_ttl,
        server: server.to_string(),
        message: message.to_string(),
    };

    let Some(expected) = SoaRecord::parse(&record.value) else {
        warn!("invalid SOA record format for {}", record.fqdn);
        return (
            vec![discrepancy("", None, None, 0, 0, "Invalid SOA record format")],
            Vec::new(),
        );
    };
    let expected_ttl = soa_ttl(record, zones_by_name);

    let name = match Name::from_utf8(&record.fqdn) {
        Ok(name) => name,
        Err(err) => {
            warn!("invalid SOA name {}: {err}", record.fqdn);
            return (
                vec![discrepancy(
                    "",
                    Some(RecordData::Soa(expected)),
                    None,
                    expected_ttl,
                    0,
                    &format!("DNS query error: {err}"),
                )],
                Vec::new(),
            );
        }
    };

    let mut discrepancies = Vec::new();
    let mut successes = Vec::new();
    for server in servers {
        debug!("validating SOA of {} against {server}", record.fqdn);
        match gateway.query(&name, RecordType::SOA, server).await {
            Err(DnsError::NxDomain) => {
                warn!("NXDOMAIN for SOA of {} from {server}", record.fqdn);
                discrepancies.push(discrepancy(
                    server,
                    Some(RecordData::Soa(expected.clone())),
                    None,
                    expected_ttl,
                    0,
                    "Record missing (NXDOMAIN)",
                ));
            }
            Err(err) => {
                warn!("DNS query error for SOA of {} from {server}: {err}", record.fqdn);
                discrepancies.push(discrepancy(
                    server,
                    Some(RecordData::Soa(expected.clone())),
                    None,
                    expected_ttl,
                    0,
                    &format!("DNS query error: {err}"),
                ));
            }
            Ok(answers) => {
                let found = answers.iter().find_map(|rec| match rec.data() {
                    Some(RData::SOA(soa)) => Some((soa, rec.ttl())),
                    _ => None,
                });
                let Some((soa, actual_ttl)) = found else {
                    warn!("no SOA answer for {} from {server}", record.fqdn);
                    discrepancies.push(discrepancy(
                        server,
                        Some(RecordData::Soa(expected.clone())),
                        None,
                        expected_ttl,
                        0,
                        "SOA record missing",
                    ));
                    continue;
                };
                let actual = SoaRecord {
                    mname: soa.mname().to_string(),
                    rname: soa.rname().to_string(),
                    serial: soa.serial(),
                    refresh: soa.refresh() as u32,
                    retry: soa.retry() as u32,
                    expire: soa.expire() as u32,
                    minimum: soa.minimum(),
                };
                if !expected.matches(&actual, ignore_serial) || expected_ttl != actual_ttl {
                    warn!("SOA mismatch for {} on {server}", record.fqdn);
                    discrepancies.push(discrepancy(
                        server,
                        Some(RecordData::Soa(expected.clone())),
                        Some(RecordData::Soa(actual)),
                        expected_ttl,
                        actual_ttl,
                        "",
                    ));
                } else if record_successful {
                    debug!("SOA of {} validated successfully on {server}", record.fqdn);
                    successes.push(ValidationRecord {
                        fqdn: record.fqdn.clone(),
                        record_type: "SOA".to_string(),
                        zone_name: record.zone_name.clone(),
                        expected: RecordData::Soa(expected.clone()),
                        actual: RecordData::Soa(actual),
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
