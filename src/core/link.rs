use crate::core::error::SessionError;
use url::Url;

/// Accepts http(s) URLs whose host is, or is a subdomain of, an allowed host.
pub fn validate_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, SessionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SessionError::Validation("empty url".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| SessionError::Validation(format!("{}: {}", raw, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SessionError::Validation(format!("unsupported scheme {}", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| SessionError::Validation(format!("{}: missing host", raw)))?
        .to_ascii_lowercase();
    let known = allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    });
    if !known {
        return Err(SessionError::Validation(format!("unrecognized host {}", host)));
    }
    Ok(url)
}

/// Best-effort media id: `youtu.be/<id>`, `?v=<id>`, `/shorts/<id>`, `?list=<id>`.
pub fn media_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.ends_with("youtu.be") {
        return url.path_segments()?.next().filter(|s| !s.is_empty()).map(str::to_string);
    }
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return Some(v.to_string());
    }
    let mut segs = url.path_segments()?;
    if let (Some("shorts" | "live" | "embed"), Some(id)) = (segs.next(), segs.next()) {
        return Some(id.to_string());
    }
    url.query_pairs().find(|(k, _)| k == "list").map(|(_, v)| v.to_string())
}
