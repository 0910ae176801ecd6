//! Target URL normalization.

use crate::error::{CoreError, Result};
use url::{ParseError, Url};

const DEFAULT_SCHEME: &str = "https://";

/// Normalizes a user-supplied target URL.
///
/// Scheme-less input such as `example.com` gets an explicit `https://` prefix.
/// The result must parse as an absolute `http` or `https` URL with a host. The
/// string is returned as written (apart from trimming and the added scheme) so
/// that redirects point exactly where the caller asked.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("URL cannot be empty".to_string()));
    }

    let (candidate, parsed) = match Url::parse(trimmed) {
        Ok(parsed) if !is_host_and_port(trimmed, &parsed) => (trimmed.to_string(), parsed),
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => {
            let candidate = format!("{DEFAULT_SCHEME}{trimmed}");
            let parsed = Url::parse(&candidate)
                .map_err(|e| CoreError::InvalidUrl(format!("'{trimmed}': {e}")))?;
            (candidate, parsed)
        }
        Err(e) => return Err(CoreError::InvalidUrl(format!("'{trimmed}': {e}"))),
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CoreError::InvalidUrl(format!(
            "URL scheme must be http or https: {}",
            parsed.scheme()
        )));
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => {
            return Err(CoreError::InvalidUrl(format!(
                "URL must have a host: {trimmed}"
            )))
        }
    }

    Ok(candidate)
}

/// `localhost:8080` parses with `localhost` as its scheme; a port right after
/// the colon means a scheme-less host was meant.
fn is_host_and_port(raw: &str, parsed: &Url) -> bool {
    raw.get(parsed.scheme().len()..)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}
