use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_client::client::{AsyncClient, ClientConnection, ClientHandle, Signer};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{DNSClass, Name, Record, RecordType};
use hickory_client::tcp::TcpClientConnection;
use hickory_client::udp::UdpClientConnection;
use log::{debug, warn};
use tokio::net::lookup_host;
use tokio::time::sleep;

use super::{DnsError, DnsGateway};

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPTS: u32 = 3;

/// Hickory-backed gateway: UDP for queries, TCP for zone transfers, each
/// attempt on a fresh connection with a fixed timeout. Retries back off
/// linearly with the attempt number.
pub struct WireGateway {
    signer: Option<Arc<Signer>>,
}

impl WireGateway {
    pub fn new(signer: Option<Signer>) -> Self {
        Self {
            signer: signer.map(Arc::new),
        }
    }

    async fn resolve(server: &str) -> Result<SocketAddr, DnsError> {
        let target = if server.parse::<SocketAddr>().is_ok() {
            server.to_string()
        } else {
            format!("{server}:53")
        };
        lookup_host(&target)
            .await
            .map_err(|e| DnsError::Query(format!("cannot resolve {server}: {e}")))?
            .next()
            .ok_or_else(|| DnsError::Query(format!("no address for {server}")))
    }

    async fn connect_udp(&self, addr: SocketAddr) -> Result<AsyncClient, DnsError> {
        let conn = UdpClientConnection::with_timeout(addr, ATTEMPT_TIMEOUT)
            .map_err(|e| DnsError::Query(e.to_string()))?;
        let (client, bg) = AsyncClient::connect(conn.new_stream(self.signer.clone()))
            .await
            .map_err(|e| DnsError::Query(e.to_string()))?;
        tokio::spawn(bg);
        Ok(client)
    }

    async fn connect_tcp(&self, addr: SocketAddr) -> Result<AsyncClient, DnsError> {
        let conn = TcpClientConnection::with_timeout(addr, ATTEMPT_TIMEOUT)
            .map_err(|e| DnsError::Transfer(e.to_string()))?;
        let (client, bg) = AsyncClient::connect(conn.new_stream(self.signer.clone()))
            .await
            .map_err(|e| DnsError::Transfer(e.to_string()))?;
        tokio::spawn(bg);
        Ok(client)
    }

    async fn query_once(
        &self,
        fqdn: &Name,
        rtype: RecordType,
        addr: SocketAddr,
    ) -> Result<Vec<Record>, DnsError> {
        let mut client = self.connect_udp(addr).await?;
        let response = client
            .query(fqdn.clone(), DNSClass::IN, rtype)
            .await
            .map_err(|e| DnsError::Query(e.to_string()))?;
        if response.response_code() == ResponseCode::NXDomain {
            return Err(DnsError::NxDomain);
        }
        Ok(response.answers().to_vec())
    }

    async fn transfer_once(&self, zone: &Name, addr: SocketAddr) -> Result<Vec<Record>, DnsError> {
        let mut client = self.connect_tcp(addr).await?;
        let response = client
            .query(zone.clone(), DNSClass::IN, RecordType::AXFR)
            .await
            .map_err(|e| DnsError::Transfer(e.to_string()))?;
        if response.response_code() != ResponseCode::NoError {
            return Err(DnsError::Transfer(format!(
                "server answered {}",
                response.response_code()
            )));
        }
        finish_transfer(response.answers().to_vec())
    }
}

/// An AXFR stream closes with a repeat of the opening SOA; a non-empty
/// answer set that does not end in one is a truncated transfer and must
/// not reach reconciliation.
fn finish_transfer(mut records: Vec<Record>) -> Result<Vec<Record>, DnsError> {
    match records.last().map(Record::record_type) {
        None | Some(RecordType::SOA) => {}
        Some(_) => return Err(DnsError::Transfer("incomplete zone transfer".to_string())),
    }
    if records.len() > 1 && records.first().map(Record::record_type) == Some(RecordType::SOA) {
        records.pop();
    }
    Ok(records)
}


#[async_trait]
impl DnsGateway for WireGateway {
    async fn query(
        &self,
        fqdn: &Name,
        rtype: RecordType,
        server: &str,
    ) -> Result<Vec<Record>, DnsError> {
        let addr = Self::resolve(server).await?;
        let mut last = None;
        for attempt in 1..=ATTEMPTS {
            debug!("querying {server} for {fqdn} {rtype} (attempt {attempt})");
            match self.query_once(fqdn, rtype, addr).await {
                Ok(answers) => return Ok(answers),
                Err(DnsError::NxDomain) => return Err(DnsError::NxDomain),
                Err(err) => {
                    warn!("query to {server} for {fqdn} failed on attempt {attempt}: {err}");
                    last = Some(err);
                    sleep(Duration::from_secs(u64::from(attempt))).await;
                }
            }
        }
        Err(DnsError::Query(format!(
            "no response after {ATTEMPTS} attempts: {}",
            last.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn transfer(&self, zone: &Name, server: &str) -> Result<Vec<Record>, DnsError> {
        let addr = Self::resolve(server).await?;
        let mut last = None;
        for attempt in 1..=ATTEMPTS {
            debug!("transferring zone {zone} from {server} (attempt {attempt})");
            match self.transfer_once(zone, addr).await {
                Ok(records) => return Ok(records),
                Err(err) => {
                    warn!("transfer of {zone} from {server} failed on attempt {attempt}: {err}");
                    last = Some(err);
                    sleep(Duration::from_secs(u64::from(attempt))).await;
                }
            }
        }
        Err(DnsError::Transfer(format!(
            "no transfer after {ATTEMPTS} attempts: {}",
            last.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
