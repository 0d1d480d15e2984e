use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// TTL applied when neither the record nor its zone carries one.
pub const FALLBACK_TTL: u32 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct View {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub default_view: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub view: Option<View>,
    #[serde(default)]
    pub default_ttl: Option<u32>,
    #[serde(default)]
    pub soa_ttl: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nameserver {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// One inventory entry as served by the source-of-truth API. The zone and
/// view names are denormalized onto the record after fetching so the
/// comparison engine never chases the nested zone object.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub rtype: String,
    pub name: String,
    pub fqdn: String,
    pub value: String,
    #[serde(default)]
    pub zone: Option<Zone>,
    #[serde(default)]
    pub disable_ptr: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(skip)]
    pub zone_name: String,
    #[serde(skip)]
    pub view_name: String,
    #[serde(skip)]
    pub zone_default_ttl: Option<u32>,
}

/// The unit of comparison: all inventory records sharing this key must match
/// one DNS answer set per authoritative server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub fqdn: String,
    pub record_type: String,
    pub zone_name: String,
    pub view_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoaRecord {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SoaRecord {
    /// Parses the inventory SOA value, which must hold exactly seven
    /// space-separated fields.
    pub fn parse(value: &str) -> Option<Self> {
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() != 7 {
            return None;
        }
        Some(Self {
            mname: fields[0].to_string(),
            rname: fields[1].to_string(),
            serial: fields[2].parse().unwrap_or(0),
            refresh: fields[3].parse().unwrap_or(0),
            retry: fields[4].parse().unwrap_or(0),
            expire: fields[5].parse().unwrap_or(0),
            minimum: fields[6].parse().unwrap_or(0),
        })
    }

    pub fn matches(&self, other: &Self, ignore_serial: bool) -> bool {
        if self.mname != other.mname
            || self.rname != other.rname
            || self.refresh != other.refresh
            || self.retry != other.retry
            || self.expire != other.expire
            || self.minimum != other.minimum
        {
            return false;
        }
        ignore_serial || self.serial == other.serial
    }
}

impl fmt::Display for SoaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname, self.rname, self.serial, self.refresh, self.retry, self.expire, self.minimum
        )
    }
}

/// Expected or observed payload of a comparison. Everything except SOA is a
/// plain value set; SOA keeps its structured form so serial handling stays
/// field-aware.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordData {
    Values(Vec<String>),
    Soa(SoaRecord),
}

impl RecordData {
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Values(a), Self::Values(b)) => values_equal_unordered(a, b),
            (Self::Soa(a), Self::Soa(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Values(values) => write!(f, "{}", values.join(", ")),
            Self::Soa(soa) => write!(f, "{soa}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub fqdn: String,
    pub record_type: String,
    pub zone_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<RecordData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<RecordData>,
    pub expected_ttl: u32,
    pub actual_ttl: u32,
    pub server: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Dual of [`Discrepancy`], only produced when success recording is enabled.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRecord {
    pub fqdn: String,
    pub record_type: String,
    pub zone_name: String,
    pub expected: RecordData,
    pub actual: RecordData,
    pub expected_ttl: u32,
    pub actual_ttl: u32,
    pub server: String,
    pub message: String,
}

/// A record present in a zone transfer with no inventory counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct MissingRecord {
    pub fqdn: String,
    pub record_type: String,
    pub zone_name: String,
    pub values: Vec<String>,
    pub ttl: u32,
    pub server: String,
}

/// Order-independent multiset equality over value lists.
pub fn values_equal_unordered(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for value in a {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    for value in b {
        match counts.get_mut(value.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }
    counts.values().all(|count| *count == 0)
}
