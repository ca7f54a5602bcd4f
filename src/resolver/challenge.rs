// ABOUTME: Parser for registry WWW-Authenticate challenges.
// ABOUTME: Recognises Bearer (realm/service/scope) and Basic schemes, case-insensitively.

use std::collections::HashMap;

/// Authentication scheme announced by a registry's `/v2/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
    /// No challenge header; the registry allows anonymous access.
    None,
}

impl Challenge {
    /// Parses the header value. Returns `None` for unknown schemes or a
    /// bearer challenge without a realm.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        if header.is_empty() {
            return Some(Challenge::None);
        }

        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        match scheme.to_ascii_lowercase().as_str() {
            "basic" => Some(Challenge::Basic),
            "bearer" => {
                let mut params = parse_params(params);
                let realm = params.remove("realm").filter(|r| !r.is_empty())?;
                Some(Challenge::Bearer {
                    realm,
                    service: params.remove("service"),
                    scope: params.remove("scope"),
                })
            }
            _ => None,
        }
    }
}

/// Splits `key="value", key=value` pairs, honouring commas inside quotes.
/// Keys are lower-cased; values keep their case.
fn parse_params(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = raw.trim();

    while !rest.is_empty() {
        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after_key = after_key.trim_start();

        let (value, remaining) = if let Some(quoted) = after_key.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };

        params.insert(key, value.trim().to_string());
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }
    params
}
