use std::sync::Arc;

use clap::Parser;
use log::info;
use tracing_subscriber::filter::LevelFilter;

mod answer;
mod authority;
mod axfr;
mod config;
mod dns;
mod error;
mod model;
mod netbox;
mod nsupdate;
mod report;
mod soa;
mod validator;

use config::{Config, RunMode};
use dns::tsig::TsigKey;
use dns::{DnsGateway, WireGateway};
use error::Error;
use netbox::NetboxClient;
use validator::RunOptions;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();
    init_logging(&config.log_level);

    info!("starting DNS drift detection");

    let netbox = NetboxClient::new(&config.api_url, &config.api_token)?;
    let records = netbox
        .records(config.zone.as_deref(), config.view.as_deref())
        .await?;
    let nameservers = netbox.nameservers(config.nameserver.as_deref()).await?;
    let zones_by_name = netbox.zones().await?;
    info!(
        "fetched {} records, {} nameservers, {} zones",
        records.len(),
        nameservers.len(),
        zones_by_name.len()
    );

    // TSIG problems are fatal before any transfer is attempted.
    let signer = match (config.mode, &config.tsig_key_file) {
        (RunMode::Transfer, Some(path)) => {
            let key = TsigKey::from_file(path)?;
            Some(key.signer()?)
        }
        _ => None,
    };
    let gateway: Arc<dyn DnsGateway> = Arc::new(WireGateway::new(signer));

    let opts = RunOptions {
        record_successful: config.record_successful,
        ignore_serial: config.ignore_serial_numbers,
        zone_filter: config.zone.clone(),
        view_filter: config.view.clone(),
    };

    let (discrepancies, successes, missing) = match config.mode {
        RunMode::Query => {
            let (mut discrepancies, mut successes) = validator::validate_all(
                Arc::clone(&gateway),
                &records,
                &nameservers,
                &zones_by_name,
                &opts,
            )
            .await;
            let (soa_discrepancies, soa_successes) = soa::validate_soa_records(
                Arc::clone(&gateway),
                &records,
                &nameservers,
                &zones_by_name,
                &opts,
            )
            .await;
            discrepancies.extend(soa_discrepancies);
            successes.extend(soa_successes);
            (discrepancies, successes, Vec::new())
        }
        RunMode::Transfer => {
            axfr::reconcile_zones(
                Arc::clone(&gateway),
                &records,
                &nameservers,
                &zones_by_name,
                &opts,
            )
            .await
        }
    };

    info!(
        "validation finished: {} discrepancies, {} successes, {} orphans",
        discrepancies.len(),
        successes.len(),
        missing.len()
    );

    report::write_discrepancies(&discrepancies, &config.report_file, config.report_format)?;
    report::write_missing(&missing, &config.missing_file, config.report_format)?;
    if config.record_successful {
        if let Some(path) = &config.success_file {
            report::write_successes(&successes, path)?;
        }
    }
    nsupdate::write_scripts(&discrepancies, &config.nsupdate_dir)?;

    info!("DNS drift detection completed");
    Ok(())
}

fn init_logging(level: &str) {
    let level = match level.to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}
