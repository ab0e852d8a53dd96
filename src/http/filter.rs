//! Endpoint admission and exclusion.
//!
//! # Responsibilities
//! - Decide whether a request is logged at all
//! - Match `METHOD:/path` allow-list entries, exactly or by `*` glob
//! - Apply path-prefix, method and domain exclusions
//!
//! # Design Decisions
//! - Patterns are compiled once when the policy is built
//! - Exclusion always overrides admission
//! - Domain matching is a literal host comparison (exact or dot-suffix), no DNS

use axum::http::Method;
use regex::Regex;

use crate::config::schema::HttpLoggingConfig;

/// One compiled allow-list entry.
#[derive(Debug, Clone)]
pub enum EndpointPattern {
    Exact(String),
    Glob(Regex),
}

impl EndpointPattern {
    /// Compile `METHOD:/path` (with optional `*` wildcards).
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        if !spec.contains('*') {
            return Some(EndpointPattern::Exact(spec.to_string()));
        }

        let pattern = spec
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{}$", pattern)) {
            Ok(regex) => Some(EndpointPattern::Glob(regex)),
            Err(e) => {
                tracing::warn!(endpoint = %spec, error = %e, "Ignoring invalid endpoint pattern");
                None
            }
        }
    }

    pub fn matches(&self, endpoint: &str) -> bool {
        match self {
            EndpointPattern::Exact(s) => s == endpoint,
            EndpointPattern::Glob(re) => re.is_match(endpoint),
        }
    }
}

/// Compiled admission/exclusion rules.
#[derive(Debug, Clone)]
pub struct EndpointFilter {
    enabled: bool,
    admit_all: bool,
    endpoints: Vec<EndpointPattern>,
    excluded_paths: Vec<String>,
    excluded_methods: Vec<String>,
    excluded_domains: Vec<String>,
}

impl EndpointFilter {
    pub fn from_config(config: &HttpLoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            admit_all: config.endpoints.iter().any(|e| e.trim() == "*"),
            endpoints: config
                .endpoints
                .iter()
                .filter_map(|e| EndpointPattern::parse(e))
                .collect(),
            excluded_paths: config
                .excluded_paths
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            excluded_methods: config
                .excluded_methods
                .iter()
                .map(|m| m.trim().to_ascii_uppercase())
                .collect(),
            excluded_domains: config
                .excluded_domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Full decision: enabled, admitted, not excluded.
    pub fn should_log(&self, method: &Method, path: &str, host: Option<&str>) -> bool {
        self.enabled && self.is_admitted(method, path) && !self.is_excluded(method, path, host)
    }

    pub fn is_admitted(&self, method: &Method, path: &str) -> bool {
        if self.admit_all {
            return true;
        }
        let endpoint = format!("{}:{}", method.as_str(), path);
        self.endpoints.iter().any(|p| p.matches(&endpoint))
    }

    pub fn is_excluded(&self, method: &Method, path: &str, host: Option<&str>) -> bool {
        if self.excluded_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return true;
        }
        if self
            .excluded_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
        {
            return true;
        }
        match host.map(strip_port) {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                self.excluded_domains.iter().any(|d| {
                    host == *d
                        || host
                            .strip_suffix(d.as_str())
                            .is_some_and(|prefix| prefix.ends_with('.'))
                })
            }
            None => false,
        }
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop a trailing :port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
