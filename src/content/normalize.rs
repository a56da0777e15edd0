//! URL canonicalization for duplicate detection.
//!
//! Every URL the crawler touches goes through [`normalize_url`] before it is
//! compared, persisted, or handed to the robots cache. The function is pure
//! and total for well-formed absolute URLs.

use url::Url;

use crate::content::error::ContentError;

/// Query parameters that never change page identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
    "campaign",
];

/// Canonicalize a URL for dedup and lookup.
///
/// Applied in order: lowercase scheme and host, drop the fragment, strip
/// tracking query parameters and re-encode the rest in sorted order, strip a
/// trailing slash (except for the root path), and force an empty path to `/`.
pub fn normalize_url(raw: &str) -> Result<String, ContentError> {
    let mut parsed =
        Url::parse(raw).map_err(|e| ContentError::MalformedUrl(format!("{raw}: {e}")))?;

    // The url crate lowercases scheme and host during parsing; the remaining
    // rules are applied by hand.
    parsed.set_fragment(None);

    if parsed.query().is_some() {
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(name, _)| !TRACKING_PARAMS.contains(&name.as_ref()))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        pairs.sort();

        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
            parsed.set_query(Some(&serializer.finish()));
        }
    }

    let path = parsed.path().to_string();
    if path != "/" && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }
    if parsed.path().is_empty() {
        parsed.set_path("/");
    }

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent() {
        let urls = [
            "https://Example.test/Doc?b=2&a=1#frag",
            "http://example.test/",
            "https://example.test/a/b/?utm_source=x",
        ];
        for raw in urls {
            let once = normalize_url(raw).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "normalize must be idempotent for {raw}");
        }
    }

    #[test]
    fn test_strips_tracking_params() {
        let normalized =
            normalize_url("https://example.test/doc?utm_source=x&utm_medium=y&fbclid=z").unwrap();
        assert_eq!(normalized, "https://example.test/doc");
    }

    #[test]
    fn test_keeps_and_sorts_real_params() {
        let normalized = normalize_url("https://example.test/doc?b=2&a=1&utm_campaign=c").unwrap();
        assert_eq!(normalized, "https://example.test/doc?a=1&b=2");
    }

    #[test]
    fn test_variants_collapse() {
        let expected = "https://example.test/doc";
        for raw in [
            "https://example.test/doc?utm_source=x",
            "https://example.test/doc",
            "https://example.test/doc/",
            "https://example.test/doc#intro",
            "https://EXAMPLE.test/doc",
        ] {
            assert_eq!(normalize_url(raw).unwrap(), expected, "for {raw}");
        }
    }

    #[test]
    fn test_root_path_keeps_slash() {
        assert_eq!(
            normalize_url("https://example.test").unwrap(),
            "https://example.test/"
        );
        assert_eq!(
            normalize_url("https://example.test/").unwrap(),
            "https://example.test/"
        );
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
        assert!(normalize_url("").is_err());
    }
}
