//! Text-framed wire protocol (spec.md §4.A).
//!
//! The codec is total: [`Frame::parse`] never fails. A frame that matches
//! none of the recognized service prefixes comes back as [`Frame::Broadcast`]
//! — the same "never surface a parse error as a connection-ending one" shape
//! as the teacher's line-oriented IRC parser.
//!
//! [`Frame::parse`] covers the full bidirectional vocabulary (useful for
//! codec round-trip tests); [`parse_inbound`] is the narrower trichotomy the
//! router actually applies to client input (spec.md §4.E step 2): a peer is
//! never expected to send `msg:`/`get:`/`welcome:`/`connect:`/`disconnect:`
//! itself, so those prefixes are not special-cased on the inbound path —
//! only `ping` and `to:` are.

use std::fmt;

/// A decoded inbound frame, or the outbound shape to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `ping` — liveness probe.
    Ping,
    /// `pong` — probe reply.
    Pong,
    /// `welcome:{json}` — admitted, payload is `{"maxPayload": N}`.
    Welcome { max_payload: usize },
    /// `connect:<peerId>` — a peer joined the group.
    Connect { peer_id: String },
    /// `disconnect:<peerId>` — a peer left the group.
    Disconnect { peer_id: String },
    /// `to:<recipient>;<body>` — directed send. `recipient` is a peer id or
    /// `"all"`.
    To { recipient: String, body: String },
    /// `msg:<body>` — delivered from another peer.
    Msg { body: String },
    /// `get:<slotId>` — body spilled to the sideband store.
    Get { slot_id: String },
    /// Anything else: an unprefixed broadcast body, or genuinely malformed
    /// input the caller should log and discard.
    Broadcast { body: String },
}

impl Frame {
    /// Parse an inbound text frame. Total — never returns an error.
    pub fn parse(text: &str) -> Frame {
        if text == "ping" {
            return Frame::Ping;
        }
        if text == "pong" {
            return Frame::Pong;
        }
        if let Some(rest) = text.strip_prefix("to:") {
            let (recipient, body) = match rest.split_once(';') {
                Some((r, b)) => (r.to_string(), b.to_string()),
                None => (String::new(), rest.to_string()),
            };
            return Frame::To { recipient, body };
        }
        if let Some(body) = text.strip_prefix("msg:") {
            return Frame::Msg {
                body: body.to_string(),
            };
        }
        if let Some(slot_id) = text.strip_prefix("get:") {
            return Frame::Get {
                slot_id: slot_id.to_string(),
            };
        }
        // An inbound message with neither `ping` nor `to:` is a broadcast
        // whose body is the entire frame (spec.md §4.A).
        Frame::Broadcast {
            body: text.to_string(),
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        match self {
            Frame::Ping => "ping".to_string(),
            Frame::Pong => "pong".to_string(),
            Frame::Welcome { max_payload } => {
                format!("welcome:{{\"maxPayload\":{max_payload}}}")
            }
            Frame::Connect { peer_id } => format!("connect:{peer_id}"),
            Frame::Disconnect { peer_id } => format!("disconnect:{peer_id}"),
            Frame::To { recipient, body } => format!("to:{recipient};{body}"),
            Frame::Msg { body } => format!("msg:{body}"),
            Frame::Get { slot_id } => format!("get:{slot_id}"),
            Frame::Broadcast { body } => body.clone(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The result of applying the router's inbound trichotomy (spec.md §4.E
/// step 1-2) to a raw client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Ping,
    /// `to:<recipient>;<body>`. `recipient` is empty when the `to:` prefix
    /// had no `;` delimiter — treated the same as a missing prefix.
    Directed { recipient: String, body: String },
    /// No `to:` prefix: a broadcast whose body is the entire frame.
    Broadcast { body: String },
}

/// Parse exactly the inbound trichotomy the router acts on: `ping`,
/// `to:<recipient>;<body>`, or an unprefixed broadcast body.
pub fn parse_inbound(text: &str) -> InboundFrame {
    if text == "ping" {
        return InboundFrame::Ping;
    }
    if let Some(rest) = text.strip_prefix("to:") {
        return match rest.split_once(';') {
            Some((recipient, body)) => InboundFrame::Directed {
                recipient: recipient.to_string(),
                body: body.to_string(),
            },
            None => InboundFrame::Directed {
                recipient: String::new(),
                body: rest.to_string(),
            },
        };
    }
    InboundFrame::Broadcast {
        body: text.to_string(),
    }
}
