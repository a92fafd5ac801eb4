//! Engine.IO long-polling transport session.
//!
//! Owns one polling connection against the vendor's `/socket.io/` mount:
//! handshake, namespace join, snapshot requests, bounded polls, and pong
//! replies, all over plain HTTP GET/POST with the framing from
//! [`frame`](crate::frame).

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::frame::{self, Message};
use crate::transport::TransportConfig;

/// Live session parameters, regenerated on every handshake.
///
/// The `sid` is valid only between a successful handshake and the next
/// disconnect; callers drop the handle when the connection ends.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub sid: String,
    token: String,
    dev_id: String,
}

/// Body of the `0{...}` handshake packet.
#[derive(Debug, Deserialize)]
struct HandshakeBody {
    sid: String,
}

/// One polling connection against a fixed endpoint.
pub struct PollingSession {
    http: reqwest::Client,
    base: Url,
    path: String,
    namespace: String,
}

impl PollingSession {
    pub fn new(
        base: Url,
        path: impl Into<String>,
        namespace: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base,
            path: path.into(),
            namespace: namespace.into(),
        })
    }

    /// The namespace carrying device events.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ── Connection establishment ─────────────────────────────────────

    /// Open a session: GET the polling endpoint and parse the handshake.
    ///
    /// A non-success status is a transport failure; anything other than a
    /// handshake packet in the first decoded frame is a protocol error.
    pub async fn handshake(&self, token: &str, dev_id: &str) -> Result<SessionHandle, Error> {
        let url = self.endpoint(token, dev_id, None)?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                endpoint: self.path.clone(),
            });
        }

        let body = resp.bytes().await?;
        let first = frame::decode(&body)
            .next()
            .ok_or_else(|| Error::Protocol("empty handshake response".into()))?;

        match Message::classify(&first) {
            Message::Handshake(payload) => {
                let handshake: HandshakeBody = serde_json::from_str(&payload)
                    .map_err(|e| Error::Protocol(format!("malformed handshake body: {e}")))?;
                debug!(sid = %handshake.sid, "session opened");
                Ok(SessionHandle {
                    sid: handshake.sid,
                    token: token.to_owned(),
                    dev_id: dev_id.to_owned(),
                })
            }
            other => Err(Error::Protocol(format!(
                "expected handshake, got {other:?}"
            ))),
        }
    }

    /// Join the event namespace.
    ///
    /// A non-success status is logged and tolerated; the server still
    /// delivers events on most firmware revisions.
    pub async fn join_namespace(&self, handle: &SessionHandle) -> Result<(), Error> {
        let connect = format!(
            "40{}?token={}&dev_id={}",
            self.namespace, handle.token, handle.dev_id
        );
        let status = self.post_frame(handle, frame::encode(&connect)).await?;
        if status.is_success() {
            debug!(namespace = %self.namespace, "joined namespace");
        } else {
            warn!(
                status = status.as_u16(),
                "namespace join returned non-success status"
            );
        }
        Ok(())
    }

    // ── Steady-state operations ──────────────────────────────────────

    /// Ask the server to push a full `dev_data` snapshot.
    ///
    /// Fire-and-forget: the response arrives on a later poll.
    pub async fn request_snapshot(&self, handle: &SessionHandle) -> Result<(), Error> {
        let event = format!("42{},[\"dev_data\"]", self.namespace);
        let status = self.post_frame(handle, frame::encode(&event)).await?;
        if !status.is_success() {
            debug!(
                status = status.as_u16(),
                "snapshot request returned non-success status"
            );
        }
        Ok(())
    }

    /// One bounded GET against the session; decodes and classifies every
    /// frame in the response body.
    pub async fn poll(
        &self,
        handle: &SessionHandle,
        timeout: Duration,
    ) -> Result<Vec<Message>, Error> {
        let url = self.endpoint(&handle.token, &handle.dev_id, Some(&handle.sid))?;
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::PollTimeout {
                        timeout_secs: timeout.as_secs(),
                    }
                } else {
                    Error::Transport(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                endpoint: self.path.clone(),
            });
        }

        let body = resp.bytes().await?;
        Ok(frame::decode(&body)
            .filter(|m| !m.is_empty())
            .map(|m| Message::classify(&m))
            .collect())
    }

    /// Answer a server ping. The pong is the bare `3` payload, not a
    /// length-prefixed frame.
    pub async fn pong(&self, handle: &SessionHandle) -> Result<(), Error> {
        let status = self.post_frame(handle, "3".to_owned()).await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "pong returned non-success status");
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn post_frame(
        &self,
        handle: &SessionHandle,
        body: String,
    ) -> Result<reqwest::StatusCode, Error> {
        let url = self.endpoint(&handle.token, &handle.dev_id, Some(&handle.sid))?;
        let resp = self.http.post(url).body(body).send().await?;
        Ok(resp.status())
    }

    /// `{base}{path}?token=..&EIO=3&transport=polling[&sid=..]&dev_id=..`
    fn endpoint(&self, token: &str, dev_id: &str, sid: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base.join(&self.path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("token", token)
                .append_pair("EIO", "3")
                .append_pair("transport", "polling");
            if let Some(sid) = sid {
                pairs.append_pair("sid", sid);
            }
            pairs.append_pair("dev_id", dev_id);
        }
        Ok(url)
    }
}
