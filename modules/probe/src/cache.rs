//! Run-scoped memoization of DNS and geolocation lookups.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use sift_core::net::{bare_host, is_blocked};
use sift_core::{GeoInfo, LookupError};
use tracing::{debug, trace};

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;
}

#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<GeoInfo, LookupError>;
}

/// Resolver backed by the system's `getaddrinfo` through tokio.
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| LookupError::Dns { host: host.to_string(), reason: e.to_string() })?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Geolocation turned off.
pub struct NoGeo;

#[async_trait]
impl GeoProvider for NoGeo {
    async fn locate(&self, _ip: IpAddr) -> Result<GeoInfo, LookupError> {
        Err(LookupError::Disabled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub dns_entries: usize,
    pub geo_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Hostname → address and address → geo memo. Failures are remembered as
/// `None`; addresses in blocked ranges are never stored at all.
pub struct LookupCache {
    resolver: Arc<dyn Resolver>,
    geo: Arc<dyn GeoProvider>,
    dns: Mutex<HashMap<String, Option<IpAddr>>>,
    locations: Mutex<HashMap<IpAddr, Option<GeoInfo>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCache {
    pub fn new(resolver: Arc<dyn Resolver>, geo: Arc<dyn GeoProvider>) -> Self {
        LookupCache {
            resolver,
            geo,
            dns: Mutex::new(HashMap::new()),
            locations: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// First routable address for `host`, or `None`.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        let host = bare_host(host.trim()).to_ascii_lowercase();
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_blocked(ip) {
                debug!(%ip, "literal address in blocked range");
                return None;
            }
            return Some(ip);
        }

        let cached = self.dns.lock().unwrap_or_else(PoisonError::into_inner).get(&host).copied();
        if let Some(entry) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let entry = match self.resolver.lookup(&host).await {
            Ok(addrs) => match addrs.iter().copied().find(|ip| !is_blocked(*ip)) {
                Some(ip) => Some(ip),
                None if !addrs.is_empty() => {
                    debug!(%host, "resolved only to blocked addresses");
                    return None;
                }
                None => None,
            },
            Err(e) => {
                debug!(%host, error = %e, "dns lookup failed");
                None
            }
        };
        trace!(%host, ip = ?entry, "dns cached");
        self.dns.lock().unwrap_or_else(PoisonError::into_inner).insert(host, entry);
        entry
    }

    pub async fn geolocate(&self, ip: IpAddr) -> Option<GeoInfo> {
        let cached = self.locations.lock().unwrap_or_else(PoisonError::into_inner).get(&ip).cloned();
        if let Some(entry) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let entry = match self.geo.locate(ip).await {
            Ok(info) => Some(info),
            Err(LookupError::Disabled) => None,
            Err(e) => {
                debug!(%ip, error = %e, "geolocation failed");
                None
            }
        };
        self.locations.lock().unwrap_or_else(PoisonError::into_inner).insert(ip, entry.clone());
        entry
    }

    /// Address memoized for `host`, if a successful lookup was stored.
    pub fn cached_ip(&self, host: &str) -> Option<IpAddr> {
        let host = bare_host(host.trim()).to_ascii_lowercase();
        self.dns.lock().unwrap_or_else(PoisonError::into_inner).get(&host).copied().flatten()
    }

    /// Whether any entry, including a remembered failure, exists for `host`.
    pub fn is_cached(&self, host: &str) -> bool {
        let host = bare_host(host.trim()).to_ascii_lowercase();
        self.dns.lock().unwrap_or_else(PoisonError::into_inner).contains_key(&host)
    }

    pub fn clear(&self) {
        self.dns.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.locations.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            dns_entries: self.dns.lock().unwrap_or_else(PoisonError::into_inner).len(),
            geo_entries: self.locations.lock().unwrap_or_else(PoisonError::into_inner).len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
