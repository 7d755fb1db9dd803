//! RPC request signing (signature version 1.0, HMAC-SHA1)

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{AlicloudError, Result};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// RFC 3986 percent-encoding; only unreserved characters stay literal
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Sorted `key=value` pairs joined by `&`, both sides percent-encoded
pub fn canonicalized_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, params: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonicalized_query(params))
    )
}

/// Sign every request parameter with the access key secret
pub fn sign(method: &str, params: &BTreeMap<String, String>, secret: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(format!("{}&", secret).as_bytes())
        .map_err(|e| AlicloudError::Config(format!("Invalid signing key: {}", e)))?;
    mac.update(string_to_sign(method, params).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encoding_follows_rfc3986() {
        assert_eq!(percent_encode("a b*c~d/e"), "a%20b%2Ac~d%2Fe");
        assert_eq!(percent_encode("2016-02-23T12:46:24Z"), "2016-02-23T12%3A46%3A24Z");
    }

    #[test]
    fn canonical_query_is_sorted() {
        let query = canonicalized_query(&params(&[
            ("Version", "2020-09-30"),
            ("Action", "DescribeDesktops"),
            ("DesktopId.1", "ecd-1"),
        ]));
        assert_eq!(query, "Action=DescribeDesktops&DesktopId.1=ecd-1&Version=2020-09-30");
    }

    #[test]
    fn string_to_sign_encodes_query_twice() {
        let sts = string_to_sign("POST", &params(&[("Action", "A"), ("Timestamp", "12:00")]));
        assert_eq!(sts, "POST&%2F&Action%3DA%26Timestamp%3D12%253A00");
    }

    #[test]
    fn signature_depends_on_secret() {
        let p = params(&[("Action", "DescribeRegions")]);
        let a = sign("POST", &p, "secret-a").unwrap();
        let b = sign("POST", &p, "secret-b").unwrap();

        assert_eq!(a, sign("POST", &p, "secret-a").unwrap());
        assert_ne!(a, b);
        // 20-byte digest
        assert_eq!(a.len(), 28);
    }
}
