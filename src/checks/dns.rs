use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType, rdata::caa::Value as CaaValue};
use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;
use crate::db::services::monitor_service;

/// Query the monitor's configured resolver for the configured record type.
/// The formatted answer becomes the heartbeat message; when it differs from
/// the stored `dns_last_result` the new answer is persisted (declared side
/// effect of this checker).
pub async fn check_dns(
    db: &DatabaseConnection,
    monitor: &monitor::Model,
) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let server = required(&monitor.dns_resolve_server, "dns_resolve_server")?;
    let resolve_type = required(&monitor.dns_resolve_type, "dns_resolve_type")?;

    let server_ip: IpAddr = server
        .parse()
        .map_err(|_| CheckError::config(format!("dns_resolve_server is not an IP: {server}")))?;
    let port = monitor.port.unwrap_or(53) as u16;
    let record_type = RecordType::from_str(resolve_type)
        .map_err(|_| CheckError::config(format!("unknown DNS record type: {resolve_type}")))?;

    let group = NameServerConfigGroup::from_ips_clear(&[server_ip], port, true);
    let config = ResolverConfig::from_parts(None, vec![], group);
    let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());

    let started = Instant::now();
    let lookup = resolver
        .lookup(hostname, record_type)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    let ping = started.elapsed().as_millis() as i32;

    let records: Vec<&RData> = lookup.iter().collect();
    if records.is_empty() {
        return Err(CheckError::probe(format!(
            "no {resolve_type} records found for {hostname}"
        )));
    }

    let message = format_answer(record_type, &records);

    if monitor.dns_last_result.as_deref() != Some(message.as_str()) {
        if let Err(e) = monitor_service::update_dns_last_result(db, monitor.id, &message).await {
            warn!(monitor_id = monitor.id, error = %e, "failed to persist dns last result");
        }
    }

    Ok(CheckOutcome::up(message, Some(ping)))
}

fn format_answer(record_type: RecordType, records: &[&RData]) -> String {
    match record_type {
        RecordType::A | RecordType::AAAA | RecordType::TXT => {
            format_record_list(&stringify(records))
        }
        RecordType::CNAME | RecordType::PTR => records[0].to_string(),
        RecordType::CAA => records
            .iter()
            .find_map(|r| match r {
                RData::CAA(caa) => Some(format_caa_value(caa.value())),
                _ => None,
            })
            .unwrap_or_default(),
        RecordType::MX => {
            let pairs: Vec<(String, u16)> = records
                .iter()
                .filter_map(|r| match r {
                    RData::MX(mx) => Some((mx.exchange().to_string(), mx.preference())),
                    _ => None,
                })
                .collect();
            format_mx(&pairs)
        }
        RecordType::NS => format_server_list(&stringify(records)),
        RecordType::SOA => records
            .iter()
            .find_map(|r| match r {
                RData::SOA(soa) => Some(format_soa(
                    &soa.mname().to_string(),
                    &soa.rname().to_string(),
                    soa.serial(),
                    soa.refresh(),
                    soa.retry(),
                    soa.expire(),
                    soa.minimum(),
                )),
                _ => None,
            })
            .unwrap_or_default(),
        RecordType::SRV => {
            let entries: Vec<SrvEntry> = records
                .iter()
                .filter_map(|r| match r {
                    RData::SRV(srv) => Some(SrvEntry {
                        name: srv.target().to_string(),
                        port: srv.port(),
                        priority: srv.priority(),
                        weight: srv.weight(),
                    }),
                    _ => None,
                })
                .collect();
            format_srv(&entries)
        }
        _ => stringify(records).join(" | "),
    }
}

fn stringify(records: &[&RData]) -> Vec<String> {
    records.iter().map(|r| r.to_string()).collect()
}

fn format_caa_value(value: &CaaValue) -> String {
    match value {
        CaaValue::Issuer(Some(name), _) => name.to_string(),
        CaaValue::Issuer(None, _) => ";".to_owned(),
        CaaValue::Url(url) => url.to_string(),
        CaaValue::Unknown(data) => String::from_utf8_lossy(data).into_owned(),
    }
}

pub(crate) struct SrvEntry {
    pub name: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

pub(crate) fn format_record_list(records: &[String]) -> String {
    format!("Records: {}", records.join(" | "))
}

pub(crate) fn format_server_list(servers: &[String]) -> String {
    format!("Servers: {}", servers.join(" | "))
}

pub(crate) fn format_mx(pairs: &[(String, u16)]) -> String {
    pairs
        .iter()
        .map(|(hostname, priority)| format!("Hostname: {hostname} - Priority: {priority}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub(crate) fn format_srv(entries: &[SrvEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "Name: {} | Port: {} | Priority: {} | Weight: {}",
                e.name, e.port, e.priority, e.weight
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn format_soa(
    ns_name: &str,
    hostmaster: &str,
    serial: u32,
    refresh: i32,
    retry: i32,
    expire: i32,
    min_ttl: u32,
) -> String {
    format!(
        "NS-Name: {ns_name} | Hostmaster: {hostmaster} | Serial: {serial} | Refresh: {refresh} | Retry: {retry} | Expire: {expire} | MinTTL: {min_ttl}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mx_pairs_have_no_trailing_separator() {
        let pairs = vec![("a".to_owned(), 10), ("b".to_owned(), 20)];
        assert_eq!(
            format_mx(&pairs),
            "Hostname: a - Priority: 10 | Hostname: b - Priority: 20"
        );
    }

    #[test]
    fn single_mx_record_is_bare() {
        let pairs = vec![("mail.example.com.".to_owned(), 5)];
        assert_eq!(format_mx(&pairs), "Hostname: mail.example.com. - Priority: 5");
    }

    #[test]
    fn record_list_is_prefixed_and_joined() {
        let records = vec!["1.1.1.1".to_owned(), "8.8.8.8".to_owned()];
        assert_eq!(format_record_list(&records), "Records: 1.1.1.1 | 8.8.8.8");
    }

    #[test]
    fn srv_entries_join_without_trailing_separator() {
        let entries = vec![
            SrvEntry {
                name: "sip.example.com.".to_owned(),
                port: 5060,
                priority: 10,
                weight: 60,
            },
            SrvEntry {
                name: "sip2.example.com.".to_owned(),
                port: 5061,
                priority: 20,
                weight: 40,
            },
        ];
        let formatted = format_srv(&entries);
        assert!(formatted.starts_with("Name: sip.example.com. | Port: 5060"));
        assert!(formatted.ends_with("Weight: 40"));
    }

    #[test]
    fn soa_message_is_fully_structured() {
        let formatted = format_soa("ns1.example.com.", "admin.example.com.", 7, 3600, 600, 86400, 60);
        assert_eq!(
            formatted,
            "NS-Name: ns1.example.com. | Hostmaster: admin.example.com. | Serial: 7 | Refresh: 3600 | Retry: 600 | Expire: 86400 | MinTTL: 60"
        );
    }
}
