//! DNS seed resolution.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use sonar_wire::Network;

use crate::config::DnsConfig;

/// Resolve every configured seed name and return the deduplicated set of
/// host literals. Seeds that fail to resolve are skipped; an empty result is
/// for the caller to judge.
pub async fn scan(config: &DnsConfig, network: Network) -> Vec<String> {
    let mut opts = ResolverOpts::default();
    opts.timeout = config.timeout();

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts);

    let seeds = config.seeds(network);
    let mut found = HashSet::new();
    let mut hosts = Vec::new();

    for seed in &seeds {
        info!("[dns] {seed}: asking for nodes");
        match resolver.lookup_ip(seed.as_str()).await {
            Ok(lookup) => {
                let mut fresh = 0;
                for ip in lookup {
                    if found.insert(ip) {
                        hosts.push(ip.to_string());
                        fresh += 1;
                    }
                }
                if fresh > 0 {
                    info!("[dns] {seed}: found {fresh} new nodes");
                } else {
                    debug!("[dns] {seed}: no new nodes");
                }
            }
            Err(err) => warn!("[dns] {seed}: lookup failed: {err}"),
        }
    }

    info!(
        "[dns] finished scan, got {} nodes from {} seeds",
        hosts.len(),
        seeds.len()
    );
    hosts
}
