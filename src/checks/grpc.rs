use std::time::{Duration, Instant};

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Request, Status};

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

/// Compile the monitor's protobuf source at check time, issue the configured
/// unary call dynamically and look for the keyword in the JSON-rendered
/// response. No generated stubs; the method is resolved by name from the
/// compiled descriptor pool.
pub async fn check_grpc_keyword(
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let url = required(&monitor.grpc_url, "grpc_url")?;
    let proto_source = required(&monitor.grpc_protobuf, "grpc_protobuf")?;
    let service_name = required(&monitor.grpc_service_name, "grpc_service_name")?;
    let method_name = required(&monitor.grpc_method, "grpc_method")?;
    let keyword = required(&monitor.keyword, "keyword")?;

    let method = resolve_method(proto_source, service_name, method_name)?;
    let request_message = build_request(&method, monitor.grpc_body.as_deref())?;

    let scheme = if monitor.grpc_enable_tls { "https" } else { "http" };
    let mut endpoint = Endpoint::from_shared(format!("{scheme}://{url}"))
        .map_err(|e| CheckError::config(format!("invalid gRPC url: {e}")))?
        .timeout(timeout)
        .connect_timeout(timeout);
    if monitor.grpc_enable_tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_enabled_roots())
            .map_err(|e| CheckError::probe(e.to_string()))?;
    }

    let started = Instant::now();
    let channel = endpoint
        .connect()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let path = http::uri::PathAndQuery::try_from(format!(
        "/{}/{}",
        method.parent_service().full_name(),
        method.name()
    ))
    .map_err(|e| CheckError::config(format!("invalid gRPC path: {e}")))?;

    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let reply = grpc
        .unary(Request::new(request_message), path, DynamicCodec::new(&method))
        .await;
    let ping = started.elapsed().as_millis() as i32;

    let response = match reply {
        Ok(response) => response.into_inner(),
        Err(status) => {
            return Err(CheckError::probe(format!(
                "Error in send gRPC {} {}",
                status.code() as i32,
                status.message()
            )));
        }
    };

    let rendered = serde_json::to_string(&response)
        .map_err(|e| CheckError::probe(format!("failed to render gRPC response: {e}")))?;
    let snippet = response_snippet(&rendered);

    if rendered.contains(keyword) {
        Ok(CheckOutcome::up(
            format!("{snippet}, keyword [{keyword}] is found"),
            Some(ping),
        ))
    } else {
        Err(CheckError::probe(format!(
            "{snippet}, but keyword [{keyword}] is not in response"
        )))
    }
}

/// Compile the proto source in a scratch directory and pull out the named
/// service method.
fn resolve_method(
    proto_source: &str,
    service_name: &str,
    method_name: &str,
) -> Result<MethodDescriptor, CheckError> {
    let dir = tempfile::tempdir()
        .map_err(|e| CheckError::probe(format!("failed to create proto scratch dir: {e}")))?;
    let proto_path = dir.path().join("monitor.proto");
    std::fs::write(&proto_path, proto_source)
        .map_err(|e| CheckError::probe(format!("failed to write proto source: {e}")))?;

    let descriptors = protox::compile([proto_path.as_path()], [dir.path()])
        .map_err(|e| CheckError::config(format!("protobuf compilation failed: {e}")))?;
    let pool = DescriptorPool::from_file_descriptor_set(descriptors)
        .map_err(|e| CheckError::config(format!("invalid protobuf descriptors: {e}")))?;

    let service = pool
        .services()
        .find(|s| s.full_name() == service_name || s.name() == service_name)
        .ok_or_else(|| CheckError::config(format!("service {service_name} not found in proto")))?;
    service
        .methods()
        .find(|m| m.name() == method_name)
        .ok_or_else(|| {
            CheckError::config(format!("method {method_name} not found on {service_name}"))
        })
}

fn build_request(
    method: &MethodDescriptor,
    body: Option<&str>,
) -> Result<DynamicMessage, CheckError> {
    let input = method.input();
    match body.filter(|b| !b.trim().is_empty()) {
        Some(raw) => {
            let mut de = serde_json::Deserializer::from_str(raw);
            DynamicMessage::deserialize(input, &mut de)
                .map_err(|e| CheckError::config(format!("gRPC body does not match request: {e}")))
        }
        None => Ok(DynamicMessage::new(input)),
    }
}

pub(crate) fn response_snippet(rendered: &str) -> String {
    if rendered.chars().count() > 50 {
        let head: String = rendered.chars().take(47).collect();
        format!("{head}...")
    } else {
        rendered.to_owned()
    }
}

/// Codec that moves `DynamicMessage` values over the wire instead of
/// generated prost types.
struct DynamicCodec {
    response: MessageDescriptor,
}

impl DynamicCodec {
    fn new(method: &MethodDescriptor) -> Self {
        Self {
            response: method.output(),
        }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            response: self.response.clone(),
        }
    }
}

struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| Status::internal(e.to_string()))
    }
}

struct DynamicDecoder {
    response: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let message = DynamicMessage::decode(self.response.clone(), src)
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_service_and_method_from_source() {
        let proto = r#"
            syntax = "proto3";
            package health.v1;
            message Ping { string probe = 1; }
            message Pong { string state = 1; }
            service Health {
                rpc Check (Ping) returns (Pong);
            }
        "#;
        let method = resolve_method(proto, "health.v1.Health", "Check").unwrap();
        assert_eq!(method.input().name(), "Ping");
        assert_eq!(method.output().name(), "Pong");

        // bare service name works too
        assert!(resolve_method(proto, "Health", "Check").is_ok());
        assert!(resolve_method(proto, "Health", "Missing").is_err());
        assert!(resolve_method(proto, "Nope", "Check").is_err());
    }

    #[test]
    fn body_json_populates_the_request_message() {
        let proto = r#"
            syntax = "proto3";
            message Ping { string probe = 1; }
            message Pong { string state = 1; }
            service Health { rpc Check (Ping) returns (Pong); }
        "#;
        let method = resolve_method(proto, "Health", "Check").unwrap();

        let message = build_request(&method, Some(r#"{"probe":"deep"}"#)).unwrap();
        let rendered = serde_json::to_string(&message).unwrap();
        assert!(rendered.contains("deep"));

        assert!(build_request(&method, None).is_ok());
        assert!(build_request(&method, Some("not json")).is_err());
    }

    #[test]
    fn long_responses_are_truncated_for_messages() {
        let short = response_snippet("{\"ok\":true}");
        assert_eq!(short, "{\"ok\":true}");

        let long = response_snippet(&"y".repeat(120));
        assert_eq!(long.chars().count(), 50);
        assert!(long.ends_with("..."));
    }
}
