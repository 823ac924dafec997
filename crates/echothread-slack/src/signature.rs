// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack request signature verification.
//!
//! Every inbound webhook body must carry a valid `v0` HMAC-SHA256 signature
//! over `v0:{timestamp}:{raw_body}` before any routing happens. Timestamps
//! outside a five-minute window are rejected to prevent replay.

use echothread_core::EchoError;
use ring::constant_time::verify_slices_are_equal;
use ring::hmac;

/// Maximum allowed clock skew between Slack and us, in seconds.
const MAX_SKEW_SECS: i64 = 60 * 5;

/// Verifies the `X-Slack-Signature` / `X-Slack-Request-Timestamp` pair
/// against the raw request body.
pub fn verify(
    signing_secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), EchoError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| EchoError::Auth("malformed request timestamp".into()))?;
    if (now_unix - ts).abs() > MAX_SKEW_SECS {
        return Err(EchoError::Auth("request timestamp outside replay window".into()));
    }

    let expected_hex = signature
        .strip_prefix("v0=")
        .ok_or_else(|| EchoError::Auth("unsupported signature version".into()))?;
    let expected = hex::decode(expected_hex)
        .map_err(|_| EchoError::Auth("malformed request signature".into()))?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, signing_secret.as_bytes());
    let mut base = Vec::with_capacity(body.len() + timestamp.len() + 4);
    base.extend_from_slice(b"v0:");
    base.extend_from_slice(timestamp.as_bytes());
    base.extend_from_slice(b":");
    base.extend_from_slice(body);
    let tag = hmac::sign(&key, &base);

    verify_slices_are_equal(tag.as_ref(), &expected)
        .map_err(|_| EchoError::Auth("invalid request signature".into()))
}

/// Computes the `v0=` signature for a body; used by tests and tooling.
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, signing_secret.as_bytes());
    let mut base = Vec::with_capacity(body.len() + timestamp.len() + 4);
    base.extend_from_slice(b"v0:");
    base.extend_from_slice(timestamp.as_bytes());
    base.extend_from_slice(b":");
    base.extend_from_slice(body);
    let tag = hmac::sign(&key, &base);
    format!("v0={}", hex::encode(tag.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    #[test]
    fn valid_signature_passes() {
        let body = b"token=x&command=%2Fyoutube2thread";
        let ts = "1700000000";
        let sig = sign(SECRET, ts, body);
        assert!(verify(SECRET, ts, &sig, body, 1_700_000_010).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let ts = "1700000000";
        let sig = sign("other-secret", ts, body);
        assert!(verify(SECRET, ts, &sig, body, 1_700_000_000).is_err());
    }

    #[test]
    fn tampered_body_fails() {
        let ts = "1700000000";
        let sig = sign(SECRET, ts, b"original");
        assert!(verify(SECRET, ts, &sig, b"tampered", 1_700_000_000).is_err());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let body = b"payload";
        let ts = "1700000000";
        let sig = sign(SECRET, ts, body);
        let err = verify(SECRET, ts, &sig, body, 1_700_000_000 + MAX_SKEW_SECS + 1).unwrap_err();
        assert!(err.to_string().contains("replay window"));
    }

    #[test]
    fn future_timestamp_rejected() {
        let body = b"payload";
        let ts = "1700009999";
        let sig = sign(SECRET, ts, body);
        assert!(verify(SECRET, ts, &sig, body, 1_700_000_000).is_err());
    }

    #[test]
    fn non_v0_signature_rejected() {
        assert!(verify(SECRET, "1700000000", "v1=abcdef", b"x", 1_700_000_000).is_err());
    }
}
