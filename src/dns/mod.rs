//! Query and zone-transfer gateway. The engine only depends on the
//! [`DnsGateway`] trait; the wire implementation lives in [`client`].

pub mod client;
pub mod tsig;

pub use client::WireGateway;

use async_trait::async_trait;
use hickory_client::rr::{Name, Record, RecordType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("name does not exist (NXDOMAIN)")]
    NxDomain,

    #[error("query failed: {0}")]
    Query(String),

    #[error("zone transfer failed: {0}")]
    Transfer(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsGateway: Send + Sync {
    /// Queries one authoritative server for a single name and type. Transient
    /// failures are retried internally with bounded backoff; a definitive
    /// NXDOMAIN is returned immediately as [`DnsError::NxDomain`].
    async fn query(
        &self,
        fqdn: &Name,
        rtype: RecordType,
        server: &str,
    ) -> Result<Vec<Record>, DnsError>;

    /// Transfers a whole zone from one authoritative server, using the
    /// gateway's TSIG signer when one was configured.
    async fn transfer(&self, zone: &Name, server: &str) -> Result<Vec<Record>, DnsError>;
}
