use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use rand::random;
use tokio::net::UdpSocket;

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

const CODE_ACCESS_REQUEST: u8 = 1;
const CODE_ACCESS_ACCEPT: u8 = 2;
const CODE_ACCESS_REJECT: u8 = 3;

const ATTR_USER_NAME: u8 = 1;
const ATTR_USER_PASSWORD: u8 = 2;
const ATTR_CALLED_STATION_ID: u8 = 30;
const ATTR_CALLING_STATION_ID: u8 = 31;

/// Send one Access-Request and report up on Access-Accept. The password is
/// hidden with the RFC 2865 MD5 construction and the response authenticator
/// is verified before the code is trusted.
pub async fn check_radius(
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let username = required(&monitor.radius_username, "radius_username")?;
    let password = required(&monitor.radius_password, "radius_password")?;
    let secret = required(&monitor.radius_secret, "radius_secret")?;
    let port = monitor.port.unwrap_or(1812) as u16;

    let identifier: u8 = random();
    let authenticator: [u8; 16] = random();
    let packet = encode_access_request(
        identifier,
        &authenticator,
        secret.as_bytes(),
        username,
        password,
        monitor.radius_called_station_id.as_deref(),
        monitor.radius_calling_station_id.as_deref(),
    );

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    socket
        .connect((hostname, port))
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let started = Instant::now();
    socket
        .send(&packet)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let mut buf = [0u8; 4096];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| CheckError::probe("no response from RADIUS server"))?
        .map_err(|e| CheckError::probe(e.to_string()))?;
    let ping = started.elapsed().as_millis() as i32;

    let response = &buf[..len];
    let code = parse_response(response, identifier)?;
    if !verify_response_authenticator(response, secret.as_bytes(), &authenticator) {
        return Err(CheckError::probe("RADIUS response failed authentication"));
    }

    match code {
        CODE_ACCESS_ACCEPT => Ok(CheckOutcome::up("Access-Accept", Some(ping))),
        CODE_ACCESS_REJECT => Err(CheckError::probe("Access-Reject")),
        other => Err(CheckError::probe(format!(
            "unexpected RADIUS response code {other}"
        ))),
    }
}

fn encode_access_request(
    identifier: u8,
    authenticator: &[u8; 16],
    secret: &[u8],
    username: &str,
    password: &str,
    called_station_id: Option<&str>,
    calling_station_id: Option<&str>,
) -> Vec<u8> {
    let mut attributes = Vec::new();
    push_attribute(&mut attributes, ATTR_USER_NAME, username.as_bytes());
    push_attribute(
        &mut attributes,
        ATTR_USER_PASSWORD,
        &hide_password(secret, authenticator, password.as_bytes()),
    );
    if let Some(id) = called_station_id.filter(|s| !s.is_empty()) {
        push_attribute(&mut attributes, ATTR_CALLED_STATION_ID, id.as_bytes());
    }
    if let Some(id) = calling_station_id.filter(|s| !s.is_empty()) {
        push_attribute(&mut attributes, ATTR_CALLING_STATION_ID, id.as_bytes());
    }

    let length = (20 + attributes.len()) as u16;
    let mut packet = Vec::with_capacity(length as usize);
    packet.push(CODE_ACCESS_REQUEST);
    packet.push(identifier);
    packet.extend_from_slice(&length.to_be_bytes());
    packet.extend_from_slice(authenticator);
    packet.extend_from_slice(&attributes);
    packet
}

fn push_attribute(out: &mut Vec<u8>, kind: u8, value: &[u8]) {
    // attribute value space is length-prefixed with a u8 covering the header
    let value = &value[..value.len().min(253)];
    out.push(kind);
    out.push((value.len() + 2) as u8);
    out.extend_from_slice(value);
}

/// RFC 2865 §5.2: xor each 16-byte password chunk with an MD5 keystream
/// chained on the previous ciphertext block.
fn hide_password(secret: &[u8], authenticator: &[u8; 16], password: &[u8]) -> Vec<u8> {
    let mut padded = password[..password.len().min(128)].to_vec();
    let blocks = padded.len().div_ceil(16).max(1);
    padded.resize(blocks * 16, 0);

    let mut out = Vec::with_capacity(padded.len());
    let mut previous: Vec<u8> = authenticator.to_vec();
    for chunk in padded.chunks(16) {
        let mut hasher = Md5::new();
        hasher.update(secret);
        hasher.update(&previous);
        let keystream = hasher.finalize();

        let block: Vec<u8> = chunk
            .iter()
            .zip(keystream.iter())
            .map(|(p, k)| p ^ k)
            .collect();
        previous = block.clone();
        out.extend_from_slice(&block);
    }
    out
}

fn parse_response(packet: &[u8], expected_identifier: u8) -> Result<u8, CheckError> {
    if packet.len() < 20 {
        return Err(CheckError::probe("RADIUS response too short"));
    }
    let declared = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    if declared < 20 || declared > packet.len() {
        return Err(CheckError::probe("RADIUS response length mismatch"));
    }
    if packet[1] != expected_identifier {
        return Err(CheckError::probe("RADIUS response identifier mismatch"));
    }
    Ok(packet[0])
}

/// Response authenticator is MD5 over the response with the request
/// authenticator substituted in, followed by the shared secret.
fn verify_response_authenticator(
    packet: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> bool {
    if packet.len() < 20 {
        return false;
    }
    let mut hasher = Md5::new();
    hasher.update(&packet[..4]);
    hasher.update(request_authenticator);
    hasher.update(&packet[20..]);
    hasher.update(secret);
    hasher.finalize().as_slice() == &packet[4..20]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal_password(secret: &[u8], authenticator: &[u8; 16], hidden: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(hidden.len());
        let mut previous: Vec<u8> = authenticator.to_vec();
        for chunk in hidden.chunks(16) {
            let mut hasher = Md5::new();
            hasher.update(secret);
            hasher.update(&previous);
            let keystream = hasher.finalize();
            out.extend(chunk.iter().zip(keystream.iter()).map(|(c, k)| c ^ k));
            previous = chunk.to_vec();
        }
        out
    }

    #[test]
    fn hidden_password_round_trips() {
        let authenticator = [7u8; 16];
        let hidden = hide_password(b"s3cret", &authenticator, b"hunter2");
        assert_eq!(hidden.len(), 16);

        let revealed = reveal_password(b"s3cret", &authenticator, &hidden);
        assert_eq!(&revealed[..7], b"hunter2");
        assert!(revealed[7..].iter().all(|b| *b == 0));
    }

    #[test]
    fn long_passwords_span_multiple_blocks() {
        let authenticator = [9u8; 16];
        let password = vec![b'a'; 20];
        let hidden = hide_password(b"secret", &authenticator, &password);
        assert_eq!(hidden.len(), 32);
        assert_eq!(&reveal_password(b"secret", &authenticator, &hidden)[..20], &password[..]);
    }

    #[test]
    fn access_request_layout_is_well_formed() {
        let authenticator = [1u8; 16];
        let packet = encode_access_request(
            42,
            &authenticator,
            b"secret",
            "monitor",
            "pw",
            Some("00-11-22-33-44-55"),
            None,
        );

        assert_eq!(packet[0], CODE_ACCESS_REQUEST);
        assert_eq!(packet[1], 42);
        let declared = u16::from_be_bytes([packet[2], packet[3]]) as usize;
        assert_eq!(declared, packet.len());
        assert_eq!(&packet[4..20], &authenticator);

        // first attribute is User-Name
        assert_eq!(packet[20], ATTR_USER_NAME);
        assert_eq!(packet[21] as usize, 2 + "monitor".len());
    }

    #[test]
    fn response_authenticator_is_verified() {
        let request_auth = [3u8; 16];
        let mut response = vec![CODE_ACCESS_ACCEPT, 42, 0, 20];
        let mut hasher = Md5::new();
        hasher.update(&response[..4]);
        hasher.update(request_auth);
        hasher.update(b"secret");
        response.extend_from_slice(&hasher.finalize());

        assert!(verify_response_authenticator(&response, b"secret", &request_auth));
        assert!(!verify_response_authenticator(&response, b"wrong", &request_auth));
    }

    #[test]
    fn malformed_responses_are_rejected() {
        assert!(parse_response(&[0u8; 10], 1).is_err());

        let mut packet = vec![CODE_ACCESS_ACCEPT, 5, 0, 20];
        packet.extend_from_slice(&[0u8; 16]);
        assert_eq!(parse_response(&packet, 5).unwrap(), CODE_ACCESS_ACCEPT);
        assert!(parse_response(&packet, 6).is_err());
    }
}
