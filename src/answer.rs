use hickory_client::rr::{RData, Record};
use log::warn;

/// Comparable value extracted from one answer record. A closed set of
/// supported kinds; anything else is carried as opaque presentation text so
/// unsupported data still surfaces in reports instead of vanishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Address(String),
    Canonical(String),
    NameServer(String),
    Pointer(String),
    Opaque(String),
}

impl RecordValue {
    pub fn extract(rdata: &RData) -> Self {
        match rdata {
            RData::A(addr) => Self::Address(addr.to_string()),
            RData::AAAA(addr) => Self::Address(addr.to_string()),
            RData::CNAME(target) => Self::Canonical(target.to_string()),
            RData::NS(target) => Self::NameServer(target.to_string()),
            RData::PTR(target) => Self::Pointer(target.to_string()),
            other => Self::Opaque(other.to_string()),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Address(text)
            | Self::Canonical(text)
            | Self::NameServer(text)
            | Self::Pointer(text)
            | Self::Opaque(text) => text,
        }
    }
}

/// Reduces an answer set to its comparable values and a single TTL. The first
/// TTL seen wins; divergent TTLs inside one answer only warn.
pub fn reduce(fqdn: &str, answers: &[Record]) -> (Vec<String>, u32) {
    let mut values = Vec::with_capacity(answers.len());
    let mut ttl = 0u32;
    for record in answers {
        let Some(rdata) = record.data() else {
            continue;
        };
        values.push(RecordValue::extract(rdata).into_text());
        if ttl == 0 {
            ttl = record.ttl();
        } else if ttl != record.ttl() {
            warn!("multiple TTLs in DNS answer for {fqdn}; keeping {ttl}");
        }
    }
    (values, ttl)
}
