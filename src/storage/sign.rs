//! AWS Signature Version 4 request signing.
//!
//! Implements just enough of SigV4 for path-style object operations against
//! S3-compatible stores (MinIO, Garage, AWS itself). Avoids an SDK
//! dependency; the algorithm is stable and small.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Credentials and scope for signing.
pub struct SigningContext<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
}

/// A header that participates in the signature, name lowercase.
pub type SignedHeader = (String, String);

/// Sign one request, returning the Authorization header value.
///
/// `headers` must already include `host`, `x-amz-date`, and
/// `x-amz-content-sha256`; they are sorted and folded into the canonical
/// request here.
pub fn authorization_header(
    ctx: &SigningContext<'_>,
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &mut Vec<SignedHeader>,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> String {
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers: String = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, ctx.region);

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(ctx.secret_key, &date_stamp, ctx.region);
    let signature = hex::encode(hmac_bytes(&signing_key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        ctx.access_key
    )
}

/// Hex-encoded SHA-256, used for payload and canonical-request hashes.
pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode a URI path or query value per the SigV4 rules.
///
/// Unreserved characters pass through; `/` passes through only when
/// `encode_slash` is false (path segments keep their separators).
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_bytes(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_bytes(&k_date, region.as_bytes());
    let k_service = hmac_bytes(&k_region, b"s3");
    hmac_bytes(&k_service, b"aws4_request")
}

fn hmac_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_uri_encode_preserves_path_slashes() {
        assert_eq!(uri_encode("websites/1/a b.txt", false), "websites/1/a%20b.txt");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
        assert_eq!(uri_encode("safe-._~chars", true), "safe-._~chars");
    }

    #[test]
    fn test_hex_sha256_empty() {
        // The well-known SHA-256 of the empty string.
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_authorization_header_shape() {
        let ctx = SigningContext {
            access_key: "AKIDEXAMPLE",
            secret_key: "secret",
            region: "us-east-1",
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let mut headers = vec![
            ("host".to_string(), "localhost:9000".to_string()),
            ("x-amz-date".to_string(), "20240115T120000Z".to_string()),
            ("x-amz-content-sha256".to_string(), hex_sha256(b"body")),
        ];

        let auth = authorization_header(
            &ctx,
            "PUT",
            "/bucket/key.txt",
            "",
            &mut headers,
            &hex_sha256(b"body"),
            now,
        );

        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240115/us-east-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(auth.contains("Signature="));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let ctx = SigningContext {
            access_key: "AKIDEXAMPLE",
            secret_key: "secret",
            region: "garage",
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        let sign = || {
            let mut headers = vec![
                ("host".to_string(), "localhost:9000".to_string()),
                ("x-amz-date".to_string(), "20240115T120000Z".to_string()),
            ];
            authorization_header(&ctx, "GET", "/b/k", "", &mut headers, &hex_sha256(b""), now)
        };

        assert_eq!(sign(), sign());
    }
}
