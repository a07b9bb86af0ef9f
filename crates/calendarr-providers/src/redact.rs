//! Scrubbing credentials from URLs before they are logged.
//!
//! Sonarr and Radarr put their API key in the feed URL query string, and
//! webhook URLs embed their token in the path. Feed URLs are logged only in
//! redacted form; webhook URLs are never logged at all.

use url::Url;

/// Drops userinfo, query and fragment from a URL.
///
/// Unparseable input is replaced entirely so that nothing leaks.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let had_query = url.query().is_some();
            // These only fail for cannot-be-a-base URLs, which carry no credentials here.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.set_query(None);
            url.set_fragment(None);

            let mut out = url.to_string();
            if had_query {
                out.push_str("?…");
            }
            out
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
