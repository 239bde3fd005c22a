//! Request signing for private Bitget endpoints.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use momentum_core::{ExchangeCredentials, ExchangeError};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Values for the `ACCESS-*` headers of one request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub access_key: String,
    pub signature: String,
    pub timestamp: String,
    pub passphrase: String,
}

impl SignedHeaders {
    /// Header name/value pairs in the order Bitget documents them.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("ACCESS-KEY", &self.access_key),
            ("ACCESS-SIGN", &self.signature),
            ("ACCESS-TIMESTAMP", &self.timestamp),
            ("ACCESS-PASSPHRASE", &self.passphrase),
        ]
    }
}

/// HMAC-SHA256 signer keyed by an API secret.
#[derive(Clone)]
pub struct BitgetSigner {
    api_key: String,
    secret: String,
    passphrase: String,
}

impl BitgetSigner {
    /// # Errors
    /// Returns [`ExchangeError::MissingCredentials`] if any part is empty.
    pub fn new(credentials: &ExchangeCredentials) -> Result<Self, ExchangeError> {
        if !credentials.is_complete() {
            return Err(ExchangeError::MissingCredentials);
        }
        Ok(Self {
            api_key: credentials.api_key.clone(),
            secret: credentials.api_secret.clone(),
            passphrase: credentials.passphrase.clone(),
        })
    }

    /// Signs `timestamp + METHOD + path [+ "?" + query] + body`.
    ///
    /// # Errors
    /// Returns [`ExchangeError::Signing`] if the key is rejected by HMAC.
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &str,
    ) -> Result<String, ExchangeError> {
        let mut message = format!("{timestamp}{}{path}", method.to_uppercase());
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            message.push('?');
            message.push_str(query);
        }
        message.push_str(body);

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ExchangeError::Signing(format!("invalid key length: {e}")))?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Signs a request stamped with the current time in milliseconds.
    ///
    /// # Errors
    /// See [`BitgetSigner::sign`].
    pub fn headers(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &str,
    ) -> Result<SignedHeaders, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, method, path, query, body)?;
        Ok(SignedHeaders {
            access_key: self.api_key.clone(),
            signature,
            timestamp,
            passphrase: self.passphrase.clone(),
        })
    }
}

impl fmt::Debug for BitgetSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitgetSigner")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> BitgetSigner {
        BitgetSigner::new(&ExchangeCredentials::new("key", "secret", "pass")).unwrap()
    }

    #[test]
    fn test_sign_post_body() {
        let sig = signer()
            .sign(
                "1700000000000",
                "POST",
                "/api/v2/mix/order/place-order",
                None,
                r#"{"symbol":"BTCUSDT"}"#,
            )
            .unwrap();
        assert_eq!(sig, "C/vSpmkAdkJHFrpOiYGEkV5HK8LKTTJ44CrlBsnfknQ=");
    }

    #[test]
    fn test_sign_get_with_query() {
        let sig = signer()
            .sign(
                "1700000000000",
                "get",
                "/api/v2/mix/market/history-candles",
                Some("symbol=BTCUSDT"),
                "",
            )
            .unwrap();
        assert_eq!(sig, "CJCthCqIUvf0ite3rXBGnVMaAsoCxXYdfFegyY4ryD4=");
    }

    #[test]
    fn test_empty_query_adds_no_separator() {
        let s = signer();
        let with_empty = s.sign("1", "GET", "/p", Some(""), "").unwrap();
        let without = s.sign("1", "GET", "/p", None, "").unwrap();
        assert_eq!(with_empty, without);
    }

    #[test]
    fn test_incomplete_credentials_rejected() {
        let err = BitgetSigner::new(&ExchangeCredentials::new("key", "", "pass")).unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials));
    }

    #[test]
    fn test_headers_and_debug_redaction() {
        let s = signer();
        let headers = s.headers("POST", "/p", None, "{}").unwrap();
        assert_eq!(headers.access_key, "key");
        assert_eq!(headers.passphrase, "pass");
        assert_eq!(headers.timestamp.len(), 13);
        assert_eq!(headers.pairs()[1].0, "ACCESS-SIGN");
        assert!(!format!("{s:?}").contains("secret"));
    }
}
