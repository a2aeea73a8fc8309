use anyhow::anyhow;
use std::net::{SocketAddr, ToSocketAddrs};
use url::Url;

/// Normalize a `host:port` endpoint. A leading `http://` is tolerated and
/// stripped; paths, queries and missing ports are rejected.
pub fn sanitize_addr(addr: &str) -> anyhow::Result<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("address cannot be empty"));
    }

    if addr.contains('\0') || addr.contains('\r') || addr.contains('\n') {
        return Err(anyhow!("address contains invalid control characters"));
    }

    let rest = match addr.split_once("://") {
        Some(("http", rest)) => rest,
        Some((scheme, _)) => return Err(anyhow!("unsupported scheme in address: {}", scheme)),
        None => addr,
    };
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    if rest.contains(['/', '?', '#', ' ']) {
        return Err(anyhow!("address must be host:port, got {}", addr));
    }

    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing port in address {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing host in address {}", addr));
    }
    let port: u16 = port
        .parse()
        .map_err(|e| anyhow!("invalid port in address {}: {}", addr, e))?;

    Ok(format!("{}:{}", host, port))
}

/// Base URL for control RPCs served at `addr`.
pub fn control_url(addr: &str, path: &str) -> String {
    let addr = addr.trim_start_matches("http://").trim_end_matches('/');
    format!("http://{}{}", addr, path)
}

/// The address peers should dial to reach a listener bound at `local`.
/// A wildcard bind has no such address.
pub fn advertised_addr(local: SocketAddr) -> anyhow::Result<String> {
    if local.ip().is_unspecified() {
        return Err(anyhow!(
            "{} is a wildcard address, bind a specific interface instead",
            local
        ));
    }
    Ok(local.to_string())
}

pub fn parse_socket_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    let url = if addr.starts_with("http://") || addr.starts_with("https://") {
        Url::parse(addr)?
    } else {
        Url::parse(&format!("http://{}", addr))?
    };

    let host = url
        .host_str()
        .ok_or(anyhow!("missing host in {}", addr))?
        .to_string();

    let port = url.port().unwrap_or(80);

    // hostnames resolve here, once, at startup
    format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("{} resolves to no address", addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_accepts_host_port() {
        assert_eq!(sanitize_addr("127.0.0.1:7001").unwrap(), "127.0.0.1:7001");
        assert_eq!(sanitize_addr(" localhost:80 ").unwrap(), "localhost:80");
        assert_eq!(sanitize_addr("http://10.0.0.2:9000").unwrap(), "10.0.0.2:9000");
    }

    #[test]
    fn sanitize_rejects_garbage() {
        assert!(sanitize_addr("").is_err());
        assert!(sanitize_addr("127.0.0.1").is_err());
        assert!(sanitize_addr("127.0.0.1:7001/path").is_err());
        assert!(sanitize_addr("ftp://127.0.0.1:21").is_err());
        assert!(sanitize_addr("a\nb:1").is_err());
    }

    #[test]
    fn control_url_joins_path() {
        assert_eq!(
            control_url("127.0.0.1:7001", "/internal/save"),
            "http://127.0.0.1:7001/internal/save"
        );
    }

    #[test]
    fn parse_socket_addr_handles_both_forms() {
        let a = parse_socket_addr("127.0.0.1:7001").unwrap();
        let b = parse_socket_addr("http://127.0.0.1:7001").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wildcard_binds_are_not_advertised() {
        let local: SocketAddr = "127.0.0.1:4100".parse().unwrap();
        assert_eq!(advertised_addr(local).unwrap(), "127.0.0.1:4100");
        assert!(advertised_addr("0.0.0.0:4100".parse().unwrap()).is_err());
        assert!(advertised_addr("[::]:4100".parse().unwrap()).is_err());
    }
}
