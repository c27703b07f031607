//! Wire envelopes and JSON codec for the estimation session transport.
//!
//! This crate owns the wire representation shared by the session engine and
//! the CLI host. Every frame is one JSON object.
//!
//! DESIGN
//! ======
//! - Inbound (authority → client) frames carry a `type` discriminator and
//!   decode into the closed [`ServerMessage`] union.
//! - Outbound (client → authority) frames carry `message_type` plus a
//!   `message` payload and are built from [`ClientMessage`].
//! - Joining is implicit: opening the connection is the join. There is no
//!   `join` frame on the wire.
//! - Decoding is pure. A frame that fails validation yields a [`DecodeError`]
//!   and never a partially-populated message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Identifier of a participant, as issued by the account service.
pub type UserId = u64;

/// One selectable value of an estimation deck.
pub type Estimate = u32;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by the decode functions.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is valid JSON but not an object.
    #[error("frame is not a json object")]
    NotAnObject,
    /// The discriminator field is absent.
    #[error("missing `{0}` discriminator")]
    MissingType(&'static str),
    /// The discriminator is present but not a string.
    #[error("`{0}` discriminator is not a string")]
    InvalidType(&'static str),
    /// The discriminator names a kind this protocol does not define.
    #[error("unknown message kind: {0}")]
    UnknownType(String),
    /// The payload is missing a required field or has a wrong field type.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A required field is absent or null.
    #[error("`{kind}` payload missing `{field}`")]
    MissingField { kind: &'static str, field: &'static str },
    /// A timestamp field could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Discriminator values of the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    InitialiseGame,
    Vote,
    StartTimer,
    Skip,
    Estimate,
    Update,
}

impl MessageKind {
    /// Wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialiseGame => "initialise_game",
            Self::Vote => "vote",
            Self::StartTimer => "start_timer",
            Self::Skip => "skip",
            Self::Estimate => "estimate",
            Self::Update => "update",
        }
    }

    /// Parse a wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "initialise_game" => Some(Self::InitialiseGame),
            "vote" => Some(Self::Vote),
            "start_timer" => Some(Self::StartTimer),
            "skip" => Some(Self::Skip),
            "estimate" => Some(Self::Estimate),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

// =============================================================================
// PAYLOAD TYPES
// =============================================================================

/// A user as serialized by the authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserInfo {
    /// `first last`, trimmed. Empty when the authority sent no name.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    /// Upper-cased first letters of first and last name.
    #[must_use]
    pub fn initials(&self) -> String {
        self.first_name
            .chars()
            .take(1)
            .chain(self.last_name.chars().take(1))
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// One vote as carried by `vote` broadcasts and the `initialise_game` snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRecord {
    pub user_id: UserId,
    /// Full user data, when the authority embedded it.
    pub user: Option<UserInfo>,
    pub estimate: Estimate,
}

/// Payload of the `initialise_game` broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameInit {
    pub users: Vec<UserInfo>,
    pub votes: Vec<VoteRecord>,
    /// Countdown anchor, `None` when the countdown has not been started.
    pub timer: Option<Timestamp>,
    /// Ticket under estimation, when the authority names it.
    pub ticket: Option<String>,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Frames sent by the authority to every participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    InitialiseGame(GameInit),
    Vote(VoteRecord),
    StartTimer { timer_started_at: Timestamp },
    Skip,
    Estimate { estimate: Estimate },
    Update { users: Vec<UserInfo> },
    /// Rejection notice addressed to this participant only (`{"error": ...}`).
    Error { message: String },
}

/// Frames sent by a participant to the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    InitialiseGame,
    Vote { estimate: Estimate },
    StartTimer,
    Skip,
    Estimate { estimate: Estimate },
}

impl ClientMessage {
    #[must_use]
    pub fn kind(self) -> MessageKind {
        match self {
            Self::InitialiseGame => MessageKind::InitialiseGame,
            Self::Vote { .. } => MessageKind::Vote,
            Self::StartTimer => MessageKind::StartTimer,
            Self::Skip => MessageKind::Skip,
            Self::Estimate { .. } => MessageKind::Estimate,
        }
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode an outbound frame as a JSON text frame.
#[must_use]
pub fn encode_client_message(message: &ClientMessage) -> String {
    let payload = match *message {
        ClientMessage::InitialiseGame => json!("Member Joined"),
        ClientMessage::StartTimer => json!("Start Timer"),
        ClientMessage::Skip => json!("Skip game"),
        ClientMessage::Vote { estimate } | ClientMessage::Estimate { estimate } => {
            json!({ "estimate": estimate })
        }
    };
    json!({ "message_type": message.kind().as_str(), "message": payload }).to_string()
}

/// Encode an authority frame as a JSON text frame.
///
/// Timestamps are written as epoch milliseconds.
#[must_use]
pub fn encode_server_message(message: &ServerMessage) -> String {
    let value = match message {
        ServerMessage::InitialiseGame(init) => {
            let mut map = Map::new();
            map.insert("type".into(), json!(MessageKind::InitialiseGame.as_str()));
            map.insert("users".into(), json!(init.users));
            map.insert("votes".into(), Value::Array(init.votes.iter().map(vote_to_json).collect()));
            map.insert("timer".into(), init.timer.map_or(Value::Null, |ts| json!(ts)));
            if let Some(ticket) = &init.ticket {
                map.insert("ticket".into(), json!(ticket));
            }
            Value::Object(map)
        }
        ServerMessage::Vote(vote) => json!({ "type": "vote", "vote": vote_to_json(vote) }),
        ServerMessage::StartTimer { timer_started_at } => {
            json!({ "type": "start_timer", "timer_started_at": timer_started_at })
        }
        ServerMessage::Skip => json!({ "type": "skip" }),
        ServerMessage::Estimate { estimate } => json!({ "type": "estimate", "estimate": estimate }),
        ServerMessage::Update { users } => json!({ "type": "update", "users": users }),
        ServerMessage::Error { message } => json!({ "error": message }),
    };
    value.to_string()
}

fn vote_to_json(vote: &VoteRecord) -> Value {
    let user = vote.user.as_ref().map_or_else(|| json!(vote.user_id), |user| json!(user));
    json!({ "user": user, "estimate": vote.estimate })
}

// =============================================================================
// DECODE
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum WireUser {
    Id(UserId),
    Info(UserInfo),
}

#[derive(Deserialize)]
struct WireVote {
    user: WireUser,
    estimate: Estimate,
}

impl From<WireVote> for VoteRecord {
    fn from(wire: WireVote) -> Self {
        match wire.user {
            WireUser::Id(user_id) => Self { user_id, user: None, estimate: wire.estimate },
            WireUser::Info(user) => Self { user_id: user.id, user: Some(user), estimate: wire.estimate },
        }
    }
}

#[derive(Deserialize)]
struct WireInit {
    users: Vec<UserInfo>,
    votes: Vec<WireVote>,
    #[serde(default)]
    timer: Value,
    #[serde(default)]
    ticket: Option<String>,
}

#[derive(Deserialize)]
struct WireUpdate {
    users: Vec<UserInfo>,
}

#[derive(Deserialize)]
struct WireEstimate {
    estimate: Estimate,
}

/// Decode one authority frame.
///
/// # Errors
///
/// Returns a [`DecodeError`] for malformed JSON, an absent or unknown `type`,
/// and payloads with missing or mistyped fields.
pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, DecodeError> {
    let mut map = decode_object(bytes)?;

    let tag = match map.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(_) => return Err(DecodeError::InvalidType("type")),
        None => {
            if let Some(message) = map.get("error").and_then(Value::as_str) {
                return Ok(ServerMessage::Error { message: message.to_owned() });
            }
            return Err(DecodeError::MissingType("type"));
        }
    };
    let kind = MessageKind::from_tag(&tag).ok_or(DecodeError::UnknownType(tag))?;

    match kind {
        MessageKind::InitialiseGame => {
            let wire: WireInit = payload(kind, Value::Object(map))?;
            Ok(ServerMessage::InitialiseGame(GameInit {
                users: wire.users,
                votes: wire.votes.into_iter().map(VoteRecord::from).collect(),
                timer: parse_timestamp(&wire.timer)?,
                ticket: wire.ticket,
            }))
        }
        MessageKind::Vote => {
            // Broadcasts nest the vote under `vote`; the flat shape is accepted too.
            let body = map.remove("vote").unwrap_or(Value::Object(map));
            let wire: WireVote = payload(kind, body)?;
            Ok(ServerMessage::Vote(wire.into()))
        }
        MessageKind::StartTimer => {
            let raw = map.remove("timer_started_at").unwrap_or(Value::Null);
            let timer_started_at = parse_timestamp(&raw)?
                .ok_or(DecodeError::MissingField { kind: kind.as_str(), field: "timer_started_at" })?;
            Ok(ServerMessage::StartTimer { timer_started_at })
        }
        MessageKind::Skip => Ok(ServerMessage::Skip),
        MessageKind::Estimate => {
            let wire: WireEstimate = payload(kind, Value::Object(map))?;
            Ok(ServerMessage::Estimate { estimate: wire.estimate })
        }
        MessageKind::Update => {
            let wire: WireUpdate = payload(kind, Value::Object(map))?;
            Ok(ServerMessage::Update { users: wire.users })
        }
    }
}

/// Decode one participant frame. Used by authority-side tooling and tests.
///
/// # Errors
///
/// Returns a [`DecodeError`] for malformed JSON, an absent or unknown
/// `message_type`, and vote/estimate frames without a numeric `estimate`.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, DecodeError> {
    let mut map = decode_object(bytes)?;
    let tag = match map.get("message_type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(_) => return Err(DecodeError::InvalidType("message_type")),
        None => return Err(DecodeError::MissingType("message_type")),
    };
    let kind = MessageKind::from_tag(&tag).ok_or(DecodeError::UnknownType(tag))?;

    match kind {
        MessageKind::InitialiseGame => Ok(ClientMessage::InitialiseGame),
        MessageKind::StartTimer => Ok(ClientMessage::StartTimer),
        MessageKind::Skip => Ok(ClientMessage::Skip),
        MessageKind::Vote | MessageKind::Estimate => {
            let body = map.remove("message").unwrap_or(Value::Null);
            let wire: WireEstimate = payload(kind, body)?;
            if kind == MessageKind::Vote {
                Ok(ClientMessage::Vote { estimate: wire.estimate })
            } else {
                Ok(ClientMessage::Estimate { estimate: wire.estimate })
            }
        }
        MessageKind::Update => Err(DecodeError::UnknownType(kind.as_str().to_owned())),
    }
}

fn decode_object(bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn payload<T: DeserializeOwned>(kind: MessageKind, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind: kind.as_str(), source })
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Parse a countdown anchor.
///
/// Accepts `null`, epoch milliseconds, RFC 3339 strings, naive
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` strings (taken as UTC), and any of those
/// strings wrapped in an extra layer of JSON quoting. The string `"null"`
/// means no anchor.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidTimestamp`] for any other value.
pub fn parse_timestamp(value: &Value) -> Result<Option<Timestamp>, DecodeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(round_millis))
            .map(Some)
            .ok_or_else(|| DecodeError::InvalidTimestamp(number.to_string())),
        Value::String(raw) => parse_timestamp_str(raw),
        other => Err(DecodeError::InvalidTimestamp(other.to_string())),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_millis(value: f64) -> Timestamp {
    value.round() as Timestamp
}

/// Parse a textual anchor: RFC 3339, or the authority's naive
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form, optionally JSON-quoted.
///
/// Naive values carry no offset and are read as UTC, which is how the
/// authority stores them. A browser `Date` would read the same text in the
/// viewer's local zone instead, so clients outside UTC disagree with this
/// reading by their offset.
fn parse_timestamp_str(raw: &str) -> Result<Option<Timestamp>, DecodeError> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    if unquoted.is_empty() || unquoted == "null" {
        return Ok(None);
    }

    if let Ok(parsed) = OffsetDateTime::parse(unquoted, &Rfc3339) {
        return to_millis(parsed, raw).map(Some);
    }

    let naive = format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]");
    let normalized = unquoted.replacen('T', " ", 1);
    let parsed = PrimitiveDateTime::parse(&normalized, naive)
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_owned()))?;
    to_millis(parsed.assume_utc(), raw).map(Some)
}

fn to_millis(at: OffsetDateTime, raw: &str) -> Result<Timestamp, DecodeError> {
    Timestamp::try_from(at.unix_timestamp_nanos() / 1_000_000)
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_owned()))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
