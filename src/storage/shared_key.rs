//! # Shared Key Authorization
//!
//! Signs Blob service requests with a storage account key.
//!
//! The signature is `base64(HMAC-SHA256(base64_decode(key), string_to_sign))`
//! and is sent as `Authorization: SharedKey {account}:{signature}`.
//!
//! References:
//! - [Authorize with Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)

use super::TransferError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use sha2::Sha256;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers in string-to-sign order
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Decoded account key bound to its account name
pub struct SharedKeyCredential {
    account: String,
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &"***")
            .finish()
    }
}

impl SharedKeyCredential {
    /// Decode a base64 account key
    ///
    /// # Errors
    /// Returns [`TransferError::Auth`] when the key is empty or not valid base64
    pub fn new(account: &str, base64_key: &str) -> Result<Self, TransferError> {
        let key = STANDARD
            .decode(base64_key.trim())
            .map_err(|e| TransferError::Auth {
                account: account.to_string(),
                message: format!("account key is not valid base64: {e}"),
            })?;
        if key.is_empty() {
            return Err(TransferError::Auth {
                account: account.to_string(),
                message: "account key is empty".to_string(),
            });
        }
        Ok(Self {
            account: account.to_string(),
            key: Zeroizing::new(key),
        })
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// HMAC-SHA256 signature of `string_to_sign`, base64 encoded
    ///
    /// # Errors
    /// Returns [`TransferError::Auth`] if the key cannot initialise the MAC
    pub fn sign(&self, string_to_sign: &str) -> Result<String, TransferError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| TransferError::Auth {
            account: self.account.clone(),
            message: format!("invalid account key: {e}"),
        })?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Value of the `Authorization` header for a request
    ///
    /// `headers` must already contain `x-ms-date`, `x-ms-version` and every
    /// standard header that will be sent.
    ///
    /// # Errors
    /// Propagates [`SharedKeyCredential::sign`] failures
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<String, TransferError> {
        let string_to_sign = string_to_sign(&self.account, method, url, headers);
        Ok(format!("SharedKey {}:{}", self.account, self.sign(&string_to_sign)?))
    }
}

/// Build the Blob service string-to-sign
#[must_use]
pub fn string_to_sign(account: &str, method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let mut out = String::new();
    out.push_str(method.as_str());
    out.push('\n');

    for name in SIGNED_HEADERS {
        let value = header_str(headers, name);
        // Content-Length is signed as empty when zero (service version 2015-02-21+)
        if name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }

    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(account, url));
    out
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `x-ms-*` headers, lowercased, sorted, one `name:value\n` per header
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_ascii_lowercase();
        if !name.starts_with("x-ms-") {
            continue;
        }
        if let Ok(value) = value.to_str() {
            ms_headers.insert(name, value.trim().to_string());
        }
    }

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

/// `/{account}{path}` followed by `\nname:value` per query parameter, sorted
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const TEST_KEY: &str = "dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5";

    fn put_blob_headers(content_length: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from(content_length));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_static("Sat, 17 Oct 2026 12:00:00 GMT"),
        );
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers
    }

    #[test]
    fn test_string_to_sign_layout() {
        let url = Url::parse("https://acct1.blob.core.windows.net/backups/nightly.sql").unwrap();
        let sts = string_to_sign("acct1", &Method::PUT, &url, &put_blob_headers(11));

        assert_eq!(
            sts,
            "PUT\n\n\n11\n\ntext/plain\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Sat, 17 Oct 2026 12:00:00 GMT\n\
             x-ms-version:2021-08-06\n\
             /acct1/backups/nightly.sql"
        );
    }

    #[test]
    fn test_zero_content_length_is_signed_empty() {
        let url = Url::parse("https://acct1.blob.core.windows.net/backups/empty.sql").unwrap();
        let sts = string_to_sign("acct1", &Method::PUT, &url, &put_blob_headers(0));
        assert!(sts.starts_with("PUT\n\n\n\n\ntext/plain\n"));
    }

    #[test]
    fn test_query_parameters_are_canonicalized() {
        let mut url = Url::parse("https://acct1.blob.core.windows.net/backups/nightly.sql").unwrap();
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", "YmxvY2stMDAwMDAwMDE=");

        let sts = string_to_sign("acct1", &Method::PUT, &url, &HeaderMap::new());
        assert!(sts.ends_with(
            "/acct1/backups/nightly.sql\nblockid:YmxvY2stMDAwMDAwMDE=\ncomp:block"
        ));
    }

    #[test]
    fn test_signature_matches_known_vector() {
        let credential = SharedKeyCredential::new("acct1", TEST_KEY).unwrap();
        let url = Url::parse("https://acct1.blob.core.windows.net/backups/nightly.sql").unwrap();

        let authorization = credential
            .authorization(&Method::PUT, &url, &put_blob_headers(11))
            .unwrap();

        assert_eq!(
            authorization,
            "SharedKey acct1:S3sGCvt6BApr2jU0B/G1+FAZ2gIOjNY2tzVqdrOZf4U="
        );
    }

    #[test]
    fn test_invalid_key_is_auth_error() {
        let err = SharedKeyCredential::new("acct1", "not base64!").unwrap_err();
        assert!(matches!(err, TransferError::Auth { .. }));

        let err = SharedKeyCredential::new("acct1", "").unwrap_err();
        assert!(matches!(err, TransferError::Auth { .. }));
    }

    #[test]
    fn test_debug_redacts_key() {
        let credential = SharedKeyCredential::new("acct1", TEST_KEY).unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("acct1"));
        assert!(!rendered.contains(TEST_KEY));
    }
}
