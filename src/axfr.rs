//! Bulk reconciliation: one zone transfer per zone instead of per-record
//! queries. The only path that can see orphan records, since per-record
//! validation never queries names it does not already expect.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hickory_client::rr::Name;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;

use crate::answer::RecordValue;
use crate::authority::AuthorityMap;
use crate::dns::DnsGateway;
use crate::model::{
    Discrepancy, InventoryRecord, MissingRecord, Nameserver, RecordData, RecordKey, SoaRecord,
    ValidationRecord, Zone, values_equal_unordered,
};
use crate::soa::soa_ttl;
use crate::validator::{RunOptions, expected_state};

pub type BulkOutcome = (Vec<Discrepancy>, Vec<ValidationRecord>, Vec<MissingRecord>);

pub async fn reconcile_zones(
    gateway: Arc<dyn DnsGateway>,
    records: &[InventoryRecord],
    nameservers: &[Nameserver],
    zones_by_name: &HashMap<String, Zone>,
    opts: &RunOptions,
) -> BulkOutcome {
    let authority = AuthorityMap::build(nameservers);
    let zones = Arc::new(zones_by_name.clone());
    let record_successful = opts.record_successful;
    let ignore_serial = opts.ignore_serial;

    let mut tasks: JoinSet<BulkOutcome> = JoinSet::new();
    for zone in zones_by_name.values() {
        let Some(view) = &zone.view else {
            warn!("zone {} has no associated view; skipping transfer", zone.name);
            continue;
        };
        if opts.zone_filter.as_deref().is_some_and(|z| zone.name != z) {
            continue;
        }
        if opts.view_filter.as_deref().is_some_and(|v| view.name != v) {
            continue;
        }
        let Some(servers) = authority.lookup(&zone.name, &view.name) else {
            warn!(
                "no nameservers for zone {} in view {}; skipping transfer",
                zone.name, view.name
            );
            continue;
        };
        // One authoritative server is enough for a transfer.
        let server = servers[0].clone();
        let groups = group_zone_records(records, &zone.name, &view.name);
        let zone = zone.clone();
        let gateway = Arc::clone(&gateway);
        let zones = Arc::clone(&zones);
        tasks.spawn(async move {
            reconcile_zone(
                gateway.as_ref(),
                &zone,
                &server,
                groups,
                &zones,
                record_successful,
                ignore_serial,
            )
            .await
        });
    }

    let mut discrepancies = Vec::new();
    let mut successes = Vec::new();
    let mut missing = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((d, s, m)) => {
                discrepancies.extend(d);
                successes.extend(s);
                missing.extend(m);
            }
            Err(err) => error!("zone reconciliation task failed: {err}"),
        }
    }
    (discrepancies, successes, missing)
}

/// Grouping for the bulk path: same comparison key as the query path, but SOA
/// records stay in since the transfer carries them too.
fn group_zone_records(
    records: &[InventoryRecord],
    zone_name: &str,
    view_name: &str,
) -> HashMap<RecordKey, Vec<InventoryRecord>> {
    let mut groups: HashMap<RecordKey, Vec<InventoryRecord>> = HashMap::new();
    for record in records {
        if record.zone_name != zone_name || record.view_name != view_name {
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

fn canonical(fqdn: &str) -> String {
    let mut name = fqdn.trim().to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

async fn reconcile_zone(
    gateway: &dyn DnsGateway,
    zone: &Zone,
    server: &str,
    groups: HashMap<RecordKey, Vec<InventoryRecord>>,
    zones_by_name: &HashMap<String, Zone>,
    record_successful: bool,
    ignore_serial: bool,
) -> BulkOutcome {
    let transfer_failure = |message: String| {
        warn!("{message}");
        let discrepancy = Discrepancy {
            fqdn: canonical(&zone.name),
            record_type: "AXFR".to_string(),
            zone_name: zone.name.clone(),
            expected: None,
            actual: None,
            expected_ttl: 0,
            actual_ttl: 0,
            server: server.to_string(),
            message,
        };
        (vec![discrepancy], Vec::new(), Vec::new())
    };

    let name = match Name::from_utf8(&zone.name) {
        Ok(name) => name,
        Err(err) => return transfer_failure(format!("invalid zone name {}: {err}", zone.name)),
    };
    let transferred = match gateway.transfer(&name, server).await {
        Ok(transferred) => transferred,
        Err(err) => {
            return transfer_failure(format!(
                "Zone transfer failed for {} from {server}: {err}",
                zone.name
            ));
        }
    };
    info!(
        "transferred {} records for zone {} from {server}",
        transferred.len(),
        zone.name
    );

    // Index the transferred set by (name, type).
    let mut index: HashMap<(String, String), (Vec<String>, u32)> = HashMap::new();
    for record in &transferred {
        let Some(rdata) = record.data() else {
            continue;
        };
        let key = (
            canonical(&record.name().to_string()),
            record.record_type().to_string(),
        );
        let entry = index.entry(key).or_insert_with(|| (Vec::new(), 0));
        entry.0.push(RecordValue::extract(rdata).into_text());
        if entry.1 == 0 {
            entry.1 = record.ttl();
        } else if entry.1 != record.ttl() {
            warn!(
                "multiple TTLs in transferred rrset {} {}; keeping {}",
                record.name(),
                record.record_type(),
                entry.1
            );
        }
    }

    let mut discrepancies = Vec::new();
    let mut successes = Vec::new();
    let mut matched: HashSet<(String, String)> = HashSet::new();

    for (key, group) in &groups {
        let (expected_values, mut expected_ttl) = expected_state(key, group, zones_by_name);
        // SOA TTLs inherit the zone's soa_ttl before the zone default.
        if key.record_type == "SOA" {
            if let Some(record) = group.first() {
                expected_ttl = soa_ttl(record, zones_by_name);
            }
        }
        let lookup = (canonical(&key.fqdn), key.record_type.clone());
        debug!(
            "reconciling {} {} against transfer of {}",
            key.fqdn, key.record_type, zone.name
        );
        match index.get(&lookup) {
            None => {
                discrepancies.push(Discrepancy {
                    fqdn: key.fqdn.clone(),
                    record_type: key.record_type.clone(),
                    zone_name: key.zone_name.clone(),
                    expected: Some(RecordData::Values(expected_values)),
                    actual: Some(RecordData::Values(Vec::new())),
                    expected_ttl,
                    actual_ttl: 0,
                    server: server.to_string(),
                    message: "Record missing in DNS".to_string(),
                });
            }
            Some((actual_values, actual_ttl)) => {
                matched.insert(lookup);
                let equal = if key.record_type == "SOA" {
                    soa_values_equal(&expected_values, actual_values, ignore_serial)
                } else {
                    values_equal_unordered(&expected_values, actual_values)
                };
                if !equal || expected_ttl != *actual_ttl {
                    discrepancies.push(Discrepancy {
                        fqdn: key.fqdn.clone(),
                        record_type: key.record_type.clone(),
                        zone_name: key.zone_name.clone(),
                        expected: Some(RecordData::Values(expected_values)),
                        actual: Some(RecordData::Values(actual_values.clone())),
                        expected_ttl,
                        actual_ttl: *actual_ttl,
                        server: server.to_string(),
                        message: "Record mismatch".to_string(),
                    });
                } else if record_successful {
                    successes.push(ValidationRecord {
                        fqdn: key.fqdn.clone(),
                        record_type: key.record_type.clone(),
                        zone_name: key.zone_name.clone(),
                        expected: RecordData::Values(expected_values),
                        actual: RecordData::Values(actual_values.clone()),
                        expected_ttl,
                        actual_ttl: *actual_ttl,
                        server: server.to_string(),
                        message: "Record validated successfully".to_string(),
                    });
                }
            }
        }
    }

    // Whatever the transfer carried and inventory did not claim is an orphan.
    let mut missing: Vec<MissingRecord> = index
        .into_iter()
        .filter(|(key, _)| !matched.contains(key))
        .map(|((fqdn, record_type), (values, ttl))| MissingRecord {
            fqdn,
            record_type,
            zone_name: zone.name.clone(),
            values,
            ttl,
            server: server.to_string(),
        })
        .collect();
    missing.sort_by(|a, b| (&a.fqdn, &a.record_type).cmp(&(&b.fqdn, &b.record_type)));

    (discrepancies, successes, missing)
}

/// SOA rrsets compare field-aware so the serial-ignore flag keeps working in
/// the bulk path; anything unparseable falls back to plain value equality.
fn soa_values_equal(expected: &[String], actual: &[String], ignore_serial: bool) -> bool {
    match (expected, actual) {
        ([e], [a]) => match (SoaRecord::parse(e), SoaRecord::parse(a)) {
            (Some(e), Some(a)) => e.matches(&a, ignore_serial),
            _ => values_equal_unordered(expected, actual),
        },
        _ => values_equal_unordered(expected, actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsError, MockDnsGateway};
    use crate::model::View;
    use hickory_client::rr::rdata::{A, SOA};
    use hickory_client::rr::{RData, Record};
    use std::str::FromStr;

    fn zone() -> Zone {
        Zone {
            id: 1,
            name: "example.com".to_string(),
            view: Some(View {
                id: 1,
                name: "internal".to_string(),
                default_view: false,
            }),
            default_ttl: Some(3600),
            soa_ttl: Some(172800),
        }
    }

    fn zones_by_name() -> HashMap<String, Zone> {
        HashMap::from([("example.com".to_string(), zone())])
    }

    fn nameserver() -> Nameserver {
        Nameserver {
            id: 1,
            name: "ns1".to_string(),
            zones: vec![zone()],
        }
    }

    fn record(fqdn: &str, rtype: &str, value: &str, ttl: u32) -> InventoryRecord {
        InventoryRecord {
            id: 1,
            rtype: rtype.to_string(),
            name: fqdn.split('.').next().unwrap().to_string(),
            fqdn: fqdn.to_string(),
            value: value.to_string(),
            zone: None,
            disable_ptr: true,
            ttl: Some(ttl),
            zone_name: "example.com".to_string(),
            view_name: "internal".to_string(),
            zone_default_ttl: Some(3600),
        }
    }

    fn a_rr(fqdn: &str, ttl: u32, addr: &str) -> Record {
        Record::from_rdata(
            Name::from_str(fqdn).unwrap(),
            ttl,
            RData::A(A::from_str(addr).unwrap()),
        )
    }

    fn soa_rr(serial: u32) -> Record {
        Record::from_rdata(
            Name::from_str("example.com.").unwrap(),
            172800,
            RData::SOA(SOA::new(
                Name::from_str("ns1.example.com.").unwrap(),
                Name::from_str("admin.example.com.").unwrap(),
                serial,
                3600,
                600,
                864000,
                300,
            )),
        )
    }

    #[tokio::test]
    async fn test_transfer_reconciliation_classifies_records() {
        let mut gateway = MockDnsGateway::new();
        gateway.expect_transfer().times(1).returning(|_, _| {
            Ok(vec![
                a_rr("www.example.com.", 300, "192.0.2.1"),
                a_rr("stale.example.com.", 300, "192.0.2.9"),
                a_rr("orphan.example.com.", 600, "192.0.2.50"),
            ])
        });

        let records = vec![
            record("www.example.com.", "A", "192.0.2.1", 300),
            record("stale.example.com.", "A", "192.0.2.2", 300),
            record("gone.example.com.", "A", "192.0.2.3", 300),
        ];
        let opts = RunOptions {
            record_successful: true,
            ..Default::default()
        };
        let (discrepancies, successes, missing) = reconcile_zones(
            Arc::new(gateway),
            &records,
            &[nameserver()],
            &zones_by_name(),
            &opts,
        )
        .await;

        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].fqdn, "www.example.com.");

        let mut messages: Vec<(&str, &str)> = discrepancies
            .iter()
            .map(|d| (d.fqdn.as_str(), d.message.as_str()))
            .collect();
        messages.sort();
        assert_eq!(
            messages,
            vec![
                ("gone.example.com.", "Record missing in DNS"),
                ("stale.example.com.", "Record mismatch"),
            ]
        );

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].fqdn, "orphan.example.com.");
        assert_eq!(missing[0].record_type, "A");
        assert_eq!(missing[0].values, vec!["192.0.2.50"]);
        assert_eq!(missing[0].server, "ns1");
    }

    #[tokio::test]
    async fn test_orphan_reported_once_not_as_discrepancy() {
        let mut gateway = MockDnsGateway::new();
        gateway.expect_transfer().times(1).returning(|_, _| {
            Ok(vec![
                a_rr("orphan.example.com.", 600, "192.0.2.50"),
                a_rr("orphan.example.com.", 600, "192.0.2.51"),
            ])
        });

        let (discrepancies, _, missing) = reconcile_zones(
            Arc::new(gateway),
            &[],
            &[nameserver()],
            &zones_by_name(),
            &RunOptions::default(),
        )
        .await;
        assert!(discrepancies.is_empty());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].values.len(), 2);
    }

    #[tokio::test]
    async fn test_soa_serial_ignored_in_bulk_compare() {
        let mut gateway = MockDnsGateway::new();
        gateway
            .expect_transfer()
            .times(1)
            .returning(|_, _| Ok(vec![soa_rr(999)]));

        let records = vec![record(
            "example.com.",
            "SOA",
            "ns1.example.com. admin.example.com. 100 3600 600 864000 300",
            172800,
        )];
        let opts = RunOptions {
            ignore_serial: true,
            ..Default::default()
        };
        let (discrepancies, _, missing) = reconcile_zones(
            Arc::new(gateway),
            &records,
            &[nameserver()],
            &zones_by_name(),
            &opts,
        )
        .await;
        assert!(discrepancies.is_empty(), "got {discrepancies:?}");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_soa_without_explicit_ttl_inherits_zone_soa_ttl() {
        let mut gateway = MockDnsGateway::new();
        gateway
            .expect_transfer()
            .times(1)
            .returning(|_, _| Ok(vec![soa_rr(100)]));

        // Zone default is 3600 but the served SOA sits at the zone's
        // soa_ttl of 172800; a clean record must not be flagged.
        let mut soa = record(
            "example.com.",
            "SOA",
            "ns1.example.com. admin.example.com. 100 3600 600 864000 300",
            0,
        );
        soa.ttl = None;
        let (discrepancies, _, missing) = reconcile_zones(
            Arc::new(gateway),
            &[soa],
            &[nameserver()],
            &zones_by_name(),
            &RunOptions::default(),
        )
        .await;
        assert!(discrepancies.is_empty(), "got {discrepancies:?}");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_failure_surfaces_as_discrepancy() {
        let mut gateway = MockDnsGateway::new();
        gateway
            .expect_transfer()
            .times(1)
            .returning(|_, _| Err(DnsError::Transfer("connection refused".to_string())));

        let (discrepancies, _, missing) = reconcile_zones(
            Arc::new(gateway),
            &[],
            &[nameserver()],
            &zones_by_name(),
            &RunOptions::default(),
        )
        .await;
        assert!(missing.is_empty());
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].record_type, "AXFR");
        assert!(discrepancies[0].message.contains("Zone transfer failed"));
    }
}
