//! Risk cookie decoding and authentication.
//!
//! Cookie format: `{base64 salt}:{iterations}:{base64 ciphertext}`. Some
//! clients send the cookie with `+` replaced by spaces, which is undone
//! before parsing.
//!
//! A 48-byte keystream is derived with PBKDF2-HMAC-SHA256 over the shared
//! secret; the first 32 bytes key AES-256-CBC and the last 16 are the IV.
//! The plaintext is a JSON object `{t, s: {a, b}, u, v, h}` where `h` is the
//! hex HMAC-SHA256 of `t`, `s.a`, `s.b`, `u`, `v` and the user agent,
//! concatenated without separators.
//!
//! The signed message has no delimiters or length prefixes, so adjacent
//! fields have ambiguous boundaries. The layout is fixed by the cookie issuer
//! and must not change here.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Terminal outcome of decoding a risk cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieStatus {
    /// No cookie on the request
    NoCookie,
    /// Signature verified but the timestamp is not in the future
    Expired,
    /// Cookie could not be parsed, decrypted or deserialized
    DecryptionFailed,
    /// HMAC signature did not match
    VerificationFailed,
    /// Authentic and fresh
    Valid,
}

impl CookieStatus {
    /// Wire name, as used for the s2s call reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieStatus::NoCookie => "no_cookie",
            CookieStatus::Expired => "expired_cookie",
            CookieStatus::DecryptionFailed => "cookie_decryption_failed",
            CookieStatus::VerificationFailed => "cookie_verification_failed",
            CookieStatus::Valid => "none",
        }
    }
}

/// Risk sub-scores carried by the cookie.
///
/// Unlike the API score these are not range checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskScore {
    pub app: i64,
    pub bot: i64,
}

/// Fields of an authentic, unexpired cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieContents {
    pub score: RiskScore,
    /// Request id of the evaluation that issued the cookie
    pub uuid: String,
    /// Visitor id
    pub vid: String,
    /// Expiry, epoch milliseconds
    pub timestamp_ms: u64,
}

/// Result of decoding one request's risk cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCookie {
    status: CookieStatus,
    contents: Option<CookieContents>,
    raw: Option<String>,
}

impl DecodedCookie {
    pub(crate) fn absent() -> Self {
        Self {
            status: CookieStatus::NoCookie,
            contents: None,
            raw: None,
        }
    }

    pub(crate) fn untrusted(status: CookieStatus, raw: &str) -> Self {
        Self {
            status,
            contents: None,
            raw: Some(raw.to_string()),
        }
    }

    fn valid(contents: CookieContents, raw: &str) -> Self {
        Self {
            status: CookieStatus::Valid,
            contents: Some(contents),
            raw: Some(raw.to_string()),
        }
    }

    pub fn status(&self) -> CookieStatus {
        self.status
    }

    /// Decoded fields; only present when the status is `Valid`.
    pub fn contents(&self) -> Option<&CookieContents> {
        self.contents.as_ref()
    }

    /// Cookie value as received.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.status != CookieStatus::NoCookie
    }

    pub fn is_valid(&self) -> bool {
        self.status == CookieStatus::Valid
    }

    /// Whether the cookie alone is enough to let the request through.
    pub fn use_cookie(&self, threshold: u8) -> bool {
        self.contents
            .as_ref()
            .is_some_and(|c| c.score.bot < i64::from(threshold))
    }

    pub fn summary(&self) -> Value {
        match &self.contents {
            Some(c) => json!({
                "status": self.status.as_str(),
                "score": c.score,
                "uuid": c.uuid,
                "vid": c.vid,
                "timestamp": c.timestamp_ms,
            }),
            None => json!({ "status": self.status.as_str() }),
        }
    }
}

/// Reasons a cookie was not trusted.
#[derive(Debug, Error)]
pub enum CookieError {
    /// Reason is kept for debug logs only; callers see `DecryptionFailed`.
    #[error("cookie could not be decrypted: {0}")]
    Decryption(&'static str),

    #[error("cookie signature mismatch")]
    Verification,

    #[error("cookie expired")]
    Expired,

    #[error("system clock is before the Unix epoch")]
    Clock(#[from] SystemTimeError),
}

impl CookieError {
    fn status(&self) -> CookieStatus {
        match self {
            CookieError::Verification => CookieStatus::VerificationFailed,
            CookieError::Expired => CookieStatus::Expired,
            CookieError::Decryption(_) | CookieError::Clock(_) => CookieStatus::DecryptionFailed,
        }
    }
}

#[derive(Deserialize)]
struct CookiePayload {
    t: u64,
    s: PayloadScore,
    u: String,
    v: String,
    h: String,
}

#[derive(Deserialize)]
struct PayloadScore {
    a: i64,
    b: i64,
}

/// Decrypts and authenticates risk cookies with the shared secret.
pub struct CookieCodec {
    secret: Vec<u8>,
    max_iterations: u32,
}

impl CookieCodec {
    /// Create a codec for `secret`, refusing cookies that ask for more than
    /// `max_iterations` PBKDF2 rounds.
    pub fn new(secret: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            secret: secret.into().into_bytes(),
            max_iterations,
        }
    }

    /// Decode `raw` as seen at `now`.
    ///
    /// Every expected failure is reported through the returned status. `Err`
    /// is only returned for the unexpected case of a clock set before the
    /// Unix epoch.
    pub fn decode(
        &self,
        raw: Option<&str>,
        user_agent: Option<&str>,
        now: SystemTime,
    ) -> Result<DecodedCookie, CookieError> {
        let Some(raw) = raw else {
            return Ok(DecodedCookie::absent());
        };
        let now_ms = now.duration_since(UNIX_EPOCH)?.as_millis();

        match self.open(raw, user_agent.unwrap_or_default(), now_ms) {
            Ok(contents) => Ok(DecodedCookie::valid(contents, raw)),
            Err(err) => {
                debug!(error = %err, "Risk cookie rejected");
                Ok(DecodedCookie::untrusted(err.status(), raw))
            }
        }
    }

    fn open(&self, raw: &str, user_agent: &str, now_ms: u128) -> Result<CookieContents, CookieError> {
        let payload = self.decrypt(raw)?;

        // Signature first: the timestamp is meaningless until it is authentic.
        let data = format!(
            "{}{}{}{}{}{}",
            payload.t, payload.s.a, payload.s.b, payload.u, payload.v, user_agent
        );
        let expected = self.sign(&data)?;
        if !constant_time_eq(payload.h.as_bytes(), expected.as_bytes()) {
            return Err(CookieError::Verification);
        }

        if u128::from(payload.t) <= now_ms {
            return Err(CookieError::Expired);
        }

        Ok(CookieContents {
            score: RiskScore {
                app: payload.s.a,
                bot: payload.s.b,
            },
            uuid: payload.u,
            vid: payload.v,
            timestamp_ms: payload.t,
        })
    }

    fn decrypt(&self, raw: &str) -> Result<CookiePayload, CookieError> {
        let normalized = raw.replace(' ', "+");
        let mut fields = normalized.split(':');
        let (Some(salt), Some(iterations), Some(ciphertext), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(CookieError::Decryption("expected salt:iterations:ciphertext"));
        };

        let iterations: u32 = iterations
            .parse()
            .map_err(|_| CookieError::Decryption("invalid iteration count"))?;
        if iterations == 0 || iterations > self.max_iterations {
            return Err(CookieError::Decryption("iteration count out of range"));
        }

        let salt = general_purpose::STANDARD
            .decode(salt)
            .map_err(|_| CookieError::Decryption("invalid salt encoding"))?;
        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| CookieError::Decryption("invalid ciphertext encoding"))?;

        let mut derived = [0u8; KEY_LEN + IV_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.secret, &salt, iterations, &mut derived);
        let (key, iv) = derived.split_at(KEY_LEN);

        let plaintext = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| CookieError::Decryption("invalid key material"))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CookieError::Decryption("bad padding"))?;

        serde_json::from_slice(&plaintext).map_err(|_| CookieError::Decryption("unparsable payload"))
    }

    /// Hex HMAC-SHA256 of `data` under the shared secret.
    fn sign(&self, data: &str) -> Result<String, CookieError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CookieError::Verification)?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;
    use std::time::Duration;

    const SECRET: &str = "cookie-secret";
    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";
    const NOW_MS: u64 = 1_700_000_000_000;

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(NOW_MS)
    }

    fn codec() -> CookieCodec {
        CookieCodec::new(SECRET, 10_000)
    }

    fn signed_payload(t: u64, app: i64, bot: i64, ua: &str) -> String {
        let h = codec().sign(&format!("{t}{app}{bot}uuid-1vid-1{ua}")).unwrap();
        json!({"t": t, "s": {"a": app, "b": bot}, "u": "uuid-1", "v": "vid-1", "h": h}).to_string()
    }

    fn seal(salt: &[u8], iterations: u32, plaintext: &str) -> String {
        let mut derived = [0u8; KEY_LEN + IV_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(SECRET.as_bytes(), salt, iterations, &mut derived);
        let (key, iv) = derived.split_at(KEY_LEN);
        let ciphertext = cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        format!(
            "{}:{}:{}",
            general_purpose::STANDARD.encode(salt),
            iterations,
            general_purpose::STANDARD.encode(ciphertext)
        )
    }

    fn decode(raw: &str) -> DecodedCookie {
        codec().decode(Some(raw), Some(UA), now()).unwrap()
    }

    #[test]
    fn test_valid_cookie() {
        let raw = seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 3, 9, UA));
        let cookie = decode(&raw);

        assert_eq!(cookie.status(), CookieStatus::Valid);
        let contents = cookie.contents().unwrap();
        assert_eq!(contents.score, RiskScore { app: 3, bot: 9 });
        assert_eq!(contents.uuid, "uuid-1");
        assert_eq!(contents.vid, "vid-1");
        assert_eq!(contents.timestamp_ms, NOW_MS + 60_000);
        assert_eq!(cookie.raw(), Some(raw.as_str()));
    }

    #[test]
    fn test_absent_cookie() {
        let cookie = codec().decode(None, Some(UA), now()).unwrap();
        assert_eq!(cookie.status(), CookieStatus::NoCookie);
        assert!(!cookie.exists());
        assert!(cookie.raw().is_none());
    }

    #[test]
    fn test_spaces_stand_in_for_plus() {
        // This salt base64-encodes to "++++".
        let raw = seal(&[0xfb, 0xef, 0xbe], 1000, &signed_payload(NOW_MS + 60_000, 0, 1, UA));
        assert!(raw.starts_with("++++:"));

        let cookie = decode(&raw.replace('+', " "));
        assert_eq!(cookie.status(), CookieStatus::Valid);
    }

    #[test]
    fn test_tampered_signature() {
        let payload = signed_payload(NOW_MS + 60_000, 0, 1, UA);
        let mut value: Value = serde_json::from_str(&payload).unwrap();
        let h = value["h"].as_str().unwrap().to_string();
        let flipped = if h.starts_with('0') { format!("1{}", &h[1..]) } else { format!("0{}", &h[1..]) };
        value["h"] = json!(flipped);

        let cookie = decode(&seal(b"salty", 1000, &value.to_string()));
        assert_eq!(cookie.status(), CookieStatus::VerificationFailed);
        assert!(cookie.contents().is_none());
    }

    #[test]
    fn test_user_agent_mismatch() {
        let raw = seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 0, 1, UA));
        let cookie = codec().decode(Some(&raw), Some("curl/8.0"), now()).unwrap();
        assert_eq!(cookie.status(), CookieStatus::VerificationFailed);
    }

    #[test]
    fn test_expired_cookie() {
        let raw = seal(b"salty", 1000, &signed_payload(NOW_MS - 1, 0, 1, UA));
        assert_eq!(decode(&raw).status(), CookieStatus::Expired);

        // Exactly now is not in the future.
        let raw = seal(b"salty", 1000, &signed_payload(NOW_MS, 0, 1, UA));
        assert_eq!(decode(&raw).status(), CookieStatus::Expired);
    }

    #[test]
    fn test_verification_checked_before_expiry() {
        let raw = seal(b"salty", 1000, &signed_payload(NOW_MS - 1, 0, 1, "other agent"));
        assert_eq!(decode(&raw).status(), CookieStatus::VerificationFailed);
    }

    #[test]
    fn test_malformed_cookies() {
        let good = seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 0, 1, UA));
        let fields: Vec<&str> = good.split(':').collect();

        let cases = vec![
            "garbage".to_string(),
            format!("{}:{}", fields[0], fields[1]),
            format!("{good}:extra"),
            format!("{}:abc:{}", fields[0], fields[2]),
            format!("{}:0:{}", fields[0], fields[2]),
            format!("{}:999:{}", fields[0], fields[2]),
            format!("!!!:{}:{}", fields[1], fields[2]),
            format!("{}:{}:AAAA", fields[0], fields[1]),
            seal(b"salty", 1000, "not json"),
            seal(b"salty", 1000, r#"{"t": 1}"#),
        ];

        for raw in cases {
            assert_eq!(
                decode(&raw).status(),
                CookieStatus::DecryptionFailed,
                "cookie {raw:?} should fail decryption"
            );
        }
    }

    #[test]
    fn test_iteration_cap() {
        let raw = seal(b"salty", 20_000, &signed_payload(NOW_MS + 60_000, 0, 1, UA));
        assert_eq!(decode(&raw).status(), CookieStatus::DecryptionFailed);
    }

    #[test]
    fn test_use_cookie_threshold_boundary() {
        let trusted = decode(&seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 0, 9, UA)));
        assert!(trusted.use_cookie(10));

        let risky = decode(&seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 0, 10, UA)));
        assert!(!risky.use_cookie(10));

        assert!(!DecodedCookie::absent().use_cookie(100));
    }

    #[test]
    fn test_clock_before_epoch() {
        if let Some(before) = UNIX_EPOCH.checked_sub(Duration::from_secs(1)) {
            let result = codec().decode(Some("a:1:b"), Some(UA), before);
            assert!(matches!(result, Err(CookieError::Clock(_))));
        }
    }

    #[test]
    fn test_summary() {
        let cookie = decode(&seal(b"salty", 1000, &signed_payload(NOW_MS + 60_000, 2, 4, UA)));
        let summary = cookie.summary();
        assert_eq!(summary["status"], "none");
        assert_eq!(summary["score"], json!({"app": 2, "bot": 4}));
        assert_eq!(summary["vid"], "vid-1");

        assert_eq!(DecodedCookie::absent().summary(), json!({"status": "no_cookie"}));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
    }
}
