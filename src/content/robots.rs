//! robots.txt fetching, parsing, and caching.
//!
//! Lookups are keyed by origin (`scheme://host`). A fetched file is cached
//! for 24 hours; a 404 caches an allow-all record for the same period. Any
//! other failure answers allow without caching, so a flaky origin is retried
//! on the next URL instead of being hammered or permanently trusted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::content::error::ContentError;

/// How long a fetched robots.txt stays valid.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for the robots.txt request itself.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect cap for the robots.txt request.
const MAX_REDIRECTS: usize = 5;

/// Directives for one user-agent section of a robots.txt file.
#[derive(Debug, Clone, Default)]
struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl AgentRules {
    /// Test a path against the allow/disallow prefix lists.
    ///
    /// An allow rule wins over a disallow rule when its matching prefix is at
    /// least as long, per the common longest-match convention.
    fn allows(&self, path: &str) -> bool {
        let longest_disallow = self
            .disallow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .map(|p| p.len())
            .max();

        let Some(disallow_len) = longest_disallow else {
            return true;
        };

        self.allow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .any(|p| p.len() >= disallow_len)
    }
}

/// A parsed robots.txt directive set.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Rules per user-agent token (lowercase)
    rules: HashMap<String, AgentRules>,
    /// Rules for `*`
    default_rules: AgentRules,
}

impl RobotsPolicy {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut policy = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        // A `user-agent` line after rules starts a fresh section.
        let mut section_open = false;

        let flush =
            |agents: &mut Vec<String>, rules: &mut AgentRules, policy: &mut RobotsPolicy| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        policy.default_rules = rules.clone();
                    } else {
                        policy.rules.insert(agent, rules.clone());
                    }
                }
                *rules = AgentRules::default();
            };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if section_open {
                        flush(&mut current_agents, &mut current_rules, &mut policy);
                        section_open = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    section_open = true;
                    if !value.is_empty() {
                        current_rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    section_open = true;
                    if !value.is_empty() {
                        current_rules.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    section_open = true;
                    current_rules.crawl_delay = value.parse().ok();
                }
                _ => {}
            }
        }
        flush(&mut current_agents, &mut current_rules, &mut policy);

        policy
    }

    /// Look up the rule section for a user agent, falling back to `*`.
    fn rules_for(&self, user_agent: &str) -> &AgentRules {
        let ua = user_agent.to_lowercase();
        self.rules
            .iter()
            .find(|(token, _)| ua.contains(token.as_str()))
            .map(|(_, rules)| rules)
            .unwrap_or(&self.default_rules)
    }

    /// Whether the given path may be fetched by the given user agent.
    pub fn allows(&self, user_agent: &str, path: &str) -> bool {
        self.rules_for(user_agent).allows(path)
    }

    /// The crawl delay requested for the given user agent, if any.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules_for(user_agent)
            .crawl_delay
            .or(self.default_rules.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}

struct CacheEntry {
    policy: RobotsPolicy,
    expires_at: Instant,
}

/// Concurrency-safe per-origin robots.txt cache.
#[derive(Clone)]
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl RobotsCache {
    /// Create a cache that identifies itself with `user_agent`.
    pub fn new(user_agent: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("failed to build robots HTTP client");

        Self {
            client,
            user_agent: user_agent.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether the URL may be fetched according to the origin's robots.txt.
    ///
    /// Unreachable or misbehaving robots endpoints answer `true` (fail-open):
    /// robots unavailability must never stall ingestion.
    pub async fn can_fetch(&self, page_url: &str) -> Result<bool, ContentError> {
        let parsed = Url::parse(page_url)
            .map_err(|e| ContentError::MalformedUrl(format!("{page_url}: {e}")))?;
        let path = parsed.path().to_string();

        match self.policy_for(&parsed).await? {
            Some(policy) => Ok(policy.allows(&self.user_agent, &path)),
            None => Ok(true),
        }
    }

    /// The crawl delay the origin requests for our user agent, if any.
    pub async fn crawl_delay(&self, page_url: &str) -> Result<Option<Duration>, ContentError> {
        let parsed = Url::parse(page_url)
            .map_err(|e| ContentError::MalformedUrl(format!("{page_url}: {e}")))?;

        match self.policy_for(&parsed).await? {
            Some(policy) => Ok(policy.crawl_delay(&self.user_agent)),
            None => Ok(None),
        }
    }

    /// Drop the cached record for one origin.
    pub async fn invalidate(&self, origin: &str) {
        self.cache.write().await.remove(origin);
    }

    /// Drop every cached record.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Get the cached policy for a URL's origin, fetching on miss.
    ///
    /// Returns `None` when the file could not be fetched; the caller treats
    /// that as allow-all without poisoning the cache.
    async fn policy_for(&self, url: &Url) -> Result<Option<RobotsPolicy>, ContentError> {
        if url.host_str().is_none() {
            return Err(ContentError::MalformedUrl(format!("{url}: no host")));
        }
        // Includes the port, so two servers on one host don't share a record.
        let origin = url.origin().ascii_serialization();

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&origin) {
                if Instant::now() < entry.expires_at {
                    debug!(origin = %origin, "using cached robots.txt");
                    return Ok(Some(entry.policy.clone()));
                }
            }
        }

        let robots_url = format!("{origin}/robots.txt");
        debug!(url = %robots_url, "fetching robots.txt");

        let response = match self
            .client
            .get(&robots_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(origin = %origin, error = %e, "robots.txt fetch failed, allowing by default");
                return Ok(None);
            }
        };

        let status = response.status();
        let policy = if status.is_success() {
            let body = response.text().await.unwrap_or_default();
            RobotsPolicy::parse(&body)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            // No robots.txt means everything is allowed.
            RobotsPolicy::default()
        } else {
            // Transient server trouble: allow, but do not cache, so the next
            // URL retries the fetch.
            warn!(origin = %origin, status = %status, "unexpected robots.txt status, allowing by default");
            return Ok(None);
        };

        let mut cache = self.cache.write().await;
        cache.insert(
            origin,
            CacheEntry {
                policy: policy.clone(),
                expires_at: Instant::now() + CACHE_TTL,
            },
        );

        Ok(Some(policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROBOTS: &str = "User-agent: *\nDisallow: /private\nCrawl-delay: 2\n";

    #[test]
    fn test_parse_disallow() {
        let policy = RobotsPolicy::parse(ROBOTS);
        assert!(!policy.allows("quarry-crawler/0.1", "/private/x"));
        assert!(policy.allows("quarry-crawler/0.1", "/public/y"));
    }

    #[test]
    fn test_parse_crawl_delay() {
        let policy = RobotsPolicy::parse(ROBOTS);
        assert_eq!(
            policy.crawl_delay("quarry-crawler/0.1"),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let policy = RobotsPolicy::parse(
            "User-agent: *\nDisallow: /private\nAllow: /private/open\n",
        );
        assert!(policy.allows("any", "/private/open/page"));
        assert!(!policy.allows("any", "/private/closed"));
    }

    #[test]
    fn test_agent_specific_section() {
        let policy = RobotsPolicy::parse(
            "User-agent: quarry-crawler\nDisallow: /only-for-us\n\nUser-agent: *\nDisallow: /all\n",
        );
        assert!(!policy.allows("quarry-crawler/0.1", "/only-for-us"));
        assert!(policy.allows("quarry-crawler/0.1", "/all"));
        assert!(!policy.allows("otherbot", "/all"));
    }

    #[test]
    fn test_empty_file_allows_everything() {
        let policy = RobotsPolicy::parse("");
        assert!(policy.allows("any", "/anything"));
        assert_eq!(policy.crawl_delay("any"), None);
    }

    #[tokio::test]
    async fn test_fetch_and_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS))
            .expect(1)
            .mount(&server)
            .await;

        let cache = RobotsCache::new("quarry-crawler/test");
        let page = format!("{}/private/x", server.uri());

        assert!(!cache.can_fetch(&page).await.unwrap());
        // Second lookup must hit the cache (mock expects exactly one call).
        assert!(!cache.can_fetch(&page).await.unwrap());

        let public = format!("{}/public", server.uri());
        assert!(cache.can_fetch(&public).await.unwrap());
    }

    #[tokio::test]
    async fn test_404_caches_allow_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cache = RobotsCache::new("quarry-crawler/test");
        let page = format!("{}/anything", server.uri());
        assert!(cache.can_fetch(&page).await.unwrap());
        assert!(cache.can_fetch(&page).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_fails_open_without_caching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let cache = RobotsCache::new("quarry-crawler/test");
        let page = format!("{}/anything", server.uri());
        // Fail-open both times; the 503 record must not be cached.
        assert!(cache.can_fetch(&page).await.unwrap());
        assert!(cache.can_fetch(&page).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS))
            .expect(2)
            .mount(&server)
            .await;

        let cache = RobotsCache::new("quarry-crawler/test");
        let page = format!("{}/public", server.uri());
        assert!(cache.can_fetch(&page).await.unwrap());

        cache.invalidate(&server.uri()).await;
        assert!(cache.can_fetch(&page).await.unwrap());
    }
}
