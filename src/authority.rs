use std::collections::HashMap;

use log::warn;

use crate::model::Nameserver;

/// Lookup from (zone, view) to the authoritative server set, built once per
/// run from the nameserver inventory.
pub struct AuthorityMap {
    servers: HashMap<String, Vec<String>>,
}

impl AuthorityMap {
    pub fn build(nameservers: &[Nameserver]) -> Self {
        let mut servers: HashMap<String, Vec<String>> = HashMap::new();
        for ns in nameservers {
            for zone in &ns.zones {
                match &zone.view {
                    Some(view) => servers
                        .entry(Self::key(&zone.name, &view.name))
                        .or_default()
                        .push(ns.name.clone()),
                    None => warn!("zone {} on {} has no associated view", zone.name, ns.name),
                }
            }
        }
        Self { servers }
    }

    /// Authoritative servers for a comparison unit. `None` when the unit has
    /// no zone/view information or no nameserver serves the pair; callers
    /// skip such units with a warning, never fall back to all servers.
    pub fn lookup(&self, zone: &str, view: &str) -> Option<&[String]> {
        if zone.is_empty() || view.is_empty() {
            return None;
        }
        self.servers
            .get(&Self::key(zone, view))
            .map(Vec::as_slice)
    }

    fn key(zone: &str, view: &str) -> String {
        format!("{zone}|{view}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{View, Zone};

    fn zone(name: &str, view: &str) -> Zone {
        Zone {
            id: 1,
            name: name.to_string(),
            view: Some(View {
                id: 1,
                name: view.to_string(),
                default_view: false,
            }),
            default_ttl: None,
            soa_ttl: None,
        }
    }

    #[test]
    fn test_lookup_groups_servers_by_zone_and_view() {
        let nameservers = vec![
            Nameserver {
                id: 1,
                name: "ns1.example.com".to_string(),
                zones: vec![zone("example.com", "internal"), zone("example.org", "internal")],
            },
            Nameserver {
                id: 2,
                name: "ns2.example.com".to_string(),
                zones: vec![zone("example.com", "internal")],
            },
        ];
        let map = AuthorityMap::build(&nameservers);
        assert_eq!(
            map.lookup("example.com", "internal").unwrap(),
            &["ns1.example.com".to_string(), "ns2.example.com".to_string()]
        );
        assert_eq!(
            map.lookup("example.org", "internal").unwrap(),
            &["ns1.example.com".to_string()]
        );
    }

    #[test]
    fn test_lookup_miss_and_missing_info() {
        let nameservers = vec![Nameserver {
            id: 1,
            name: "ns1.example.com".to_string(),
            zones: vec![zone("example.com", "internal")],
        }];
        let map = AuthorityMap::build(&nameservers);
        assert!(map.lookup("example.com", "external").is_none());
        assert!(map.lookup("", "internal").is_none());
        assert!(map.lookup("example.com", "").is_none());
    }

    #[test]
    fn test_zone_without_view_is_ignored() {
        let mut z = zone("example.com", "internal");
        z.view = None;
        let nameservers = vec![Nameserver {
            id: 1,
            name: "ns1.example.com".to_string(),
            zones: vec![z],
        }];
        let map = AuthorityMap::build(&nameservers);
        assert!(map.lookup("example.com", "internal").is_none());
    }
}
