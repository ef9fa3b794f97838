// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded HTTP client for caller-supplied attachment URLs.
//!
//! Attachment URLs come from untrusted callers, so downloads must not reach
//! loopback, private or link-local addresses. Hostnames are filtered at DNS
//! resolution time by [`PublicOnlyResolver`]; IP literals never hit the
//! resolver and are checked by [`check_url`], both up front and on every
//! redirect hop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use tracing::warn;
use url::Url;
use wirebridge_core::{AttachmentStep, WirebridgeError};

const MAX_REDIRECTS: usize = 5;

/// Loopback, RFC 1918, link-local, unspecified, broadcast, cloud metadata,
/// IPv6 unique-local and link-local.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || *v4 == Ipv4Addr::new(169, 254, 169, 254)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Resolver that drops private addresses from every lookup.
pub struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?
                .filter(|addr| {
                    let private = is_private_ip(&addr.ip());
                    if private {
                        warn!(ip = %addr.ip(), %host, "attachment host resolved to private address");
                    }
                    !private
                })
                .collect();

            if addrs.is_empty() {
                let err: Box<dyn std::error::Error + Send + Sync> =
                    format!("{host} resolves only to private addresses").into();
                return Err(err);
            }
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Only http(s) is accepted; IP-literal hosts must be public unless
/// `allow_private` is set.
pub fn check_url(raw: &str, allow_private: bool) -> Result<Url, WirebridgeError> {
    let url = Url::parse(raw).map_err(|e| {
        WirebridgeError::attachment(AttachmentStep::Download, format!("invalid attachment url: {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WirebridgeError::attachment(
            AttachmentStep::Download,
            format!("unsupported attachment url scheme: {}", url.scheme()),
        ));
    }
    if !allow_private && let Some(ip) = literal_ip(&url) && is_private_ip(&ip) {
        warn!(%ip, "attachment url targets private address");
        return Err(WirebridgeError::attachment(
            AttachmentStep::Download,
            format!("attachment url targets private address {ip}"),
        ));
    }
    Ok(url)
}

fn literal_ip(url: &Url) -> Option<IpAddr> {
    match url.host()? {
        url::Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
        url::Host::Ipv6(v6) => Some(IpAddr::V6(v6)),
        url::Host::Domain(d) if d.eq_ignore_ascii_case("localhost") => {
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }
        url::Host::Domain(_) => None,
    }
}

/// Client for attachment downloads.
pub fn build_download_client(
    allow_private: bool,
    timeout: Duration,
) -> Result<reqwest::Client, WirebridgeError> {
    let policy = redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let blocked = !allow_private
            && literal_ip(attempt.url()).is_some_and(|ip| is_private_ip(&ip));
        if blocked {
            attempt.error("redirect to private address")
        } else {
            attempt.follow()
        }
    });

    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(policy)
        .user_agent("Mozilla/5.0");
    if !allow_private {
        builder = builder.dns_resolver(Arc::new(PublicOnlyResolver));
    }
    builder.build().map_err(|e| WirebridgeError::Internal(format!(
        "failed to build download client: {e}"
    )))
}
