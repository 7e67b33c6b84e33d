//! obs-websocket v5 message shapes.
//!
//! Only the opcodes the client uses are modelled. Every message is an
//! envelope `{"op": <code>, "d": <payload>}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const RPC_VERSION: u32 = 1;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Event categories the client subscribes to.
pub mod subscription {
    pub const GENERAL: u32 = 1 << 0;
    pub const CONFIG: u32 = 1 << 1;
    pub const SCENES: u32 = 1 << 2;
    pub const OUTPUTS: u32 = 1 << 6;

    pub const CLIENT_DEFAULT: u32 = GENERAL | CONFIG | SCENES | OUTPUTS;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    pub d: Value,
}

impl Envelope {
    pub fn new(op: u8, payload: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            op,
            d: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Authentication string for the Identify message:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Human-readable reason for an obs-websocket close code.
pub fn describe_close_code(code: u16) -> &'static str {
    match code {
        4002 => "unknown reason",
        4003 => "missing data field",
        4004 => "invalid data field type",
        4005 => "invalid data field value",
        4006 => "unknown opcode",
        4007 => "not identified",
        4008 => "already identified",
        4009 => "authentication failed",
        4010 => "unsupported rpc version",
        4011 => "session invalidated",
        4012 => "unsupported feature",
        _ => "connection closed",
    }
}
