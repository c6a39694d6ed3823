//! SolverRegistry (spec §4.7): a persistent, per-chain table of solver endpoints,
//! with EIP-191-signed registration/unregistration and SSRF-hardened endpoint
//! validation.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use alloy_primitives::Address;
use alloy_signer::Signature;
use serde::{Deserialize, Serialize};

use crate::chain_id::ChainId;
use crate::error::RegistryError;
use crate::types::EvmAddress;

const AUTH_SKEW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredSolver {
    pub address: EvmAddress,
    pub chain_id: ChainId,
    pub endpoint: String,
    pub name: String,
    pub registered_at_ms: u64,
    pub active: bool,
}

#[derive(Clone)]
pub struct SolverRegistry {
    tree: sled::Tree,
    max_per_chain: usize,
    dev_mode: bool,
}

fn registry_key(chain_id: ChainId, address: EvmAddress) -> Vec<u8> {
    format!("{chain_id}:{}", address.to_string().to_lowercase()).into_bytes()
}

impl SolverRegistry {
    pub fn new(tree: sled::Tree, max_per_chain: usize, dev_mode: bool) -> Self {
        SolverRegistry { tree, max_per_chain, dev_mode }
    }

    fn count_for_chain(&self, chain_id: ChainId) -> Result<usize, RegistryError> {
        let prefix = format!("{chain_id}:");
        let mut count = 0;
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Verifies an EIP-191 `personal_sign` registration message and validates
    /// the endpoint against SSRF rules, then upserts the record.
    pub fn register(
        &self,
        chain_id: ChainId,
        address: Address,
        endpoint: String,
        name: String,
        timestamp_ms: u64,
        signature: &[u8; 65],
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        let message = format!(
            "FirmSwap Solver Registration\nAddress: {}\nEndpoint: {}\nTimestamp: {}",
            format!("{address:#x}").to_lowercase(),
            endpoint,
            timestamp_ms
        );
        verify_auth(&message, signature, address, timestamp_ms, now_ms)?;
        validate_endpoint(&endpoint, self.dev_mode)?;

        let key = registry_key(chain_id, EvmAddress(address));
        let already_present = self.tree.contains_key(&key)?;
        if !already_present && self.count_for_chain(chain_id)? >= self.max_per_chain {
            return Err(RegistryError::AtCapacity);
        }

        let record = RegisteredSolver {
            address: EvmAddress(address),
            chain_id,
            endpoint,
            name,
            registered_at_ms: timestamp_ms,
            active: true,
        };
        self.tree.insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    pub fn unregister(
        &self,
        chain_id: ChainId,
        address: Address,
        timestamp_ms: u64,
        signature: &[u8; 65],
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        let message = format!(
            "FirmSwap Solver Unregistration\nAddress: {}\nTimestamp: {}",
            format!("{address:#x}").to_lowercase(),
            timestamp_ms
        );
        verify_auth(&message, signature, address, timestamp_ms, now_ms)?;
        let key = registry_key(chain_id, EvmAddress(address));
        self.tree.remove(&key)?;
        Ok(())
    }

    pub fn get(&self, chain_id: ChainId, address: Address) -> Result<Option<RegisteredSolver>, RegistryError> {
        let key = registry_key(chain_id, EvmAddress(address));
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All active solvers for a chain, in registration (insertion) order.
    pub fn active_for_chain(&self, chain_id: ChainId) -> Result<Vec<RegisteredSolver>, RegistryError> {
        let prefix = format!("{chain_id}:");
        let mut solvers = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            let record: RegisteredSolver = serde_json::from_slice(&bytes)?;
            if record.active {
                solvers.push(record);
            }
        }
        Ok(solvers)
    }
}

fn verify_auth(message: &str, signature: &[u8; 65], claimed: Address, timestamp_ms: u64, now_ms: u64) -> Result<(), RegistryError> {
    let drift = now_ms as i64 - timestamp_ms as i64;
    if drift.abs() > AUTH_SKEW_MS {
        return Err(RegistryError::BadAuth);
    }
    let sig = Signature::from_raw_array(signature).map_err(|_| RegistryError::BadAuth)?;
    let recovered = sig.recover_address_from_msg(message).map_err(|_| RegistryError::BadAuth)?;
    if recovered != claimed {
        return Err(RegistryError::BadAuth);
    }
    Ok(())
}

/// Cloud metadata endpoint hostnames, rejected outright regardless of how a
/// local resolver would answer them.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "metadata",
    "metadata.google.internal",
    "metadata.internal",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
];

fn is_blocked_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    BLOCKED_HOSTNAMES.contains(&host.as_str())
}

/// SSRF hardening: scheme must be https (http only in dev mode), the host must
/// not be a known cloud metadata hostname, and the resolved address must not
/// fall in a reserved/private/loopback/link-local range, for IPv4 or IPv6
/// (including IPv4-mapped IPv6).
pub fn validate_endpoint(endpoint: &str, dev_mode: bool) -> Result<(), RegistryError> {
    let url = url::Url::parse(endpoint).map_err(|e| RegistryError::UnsafeEndpoint(e.to_string()))?;
    match url.scheme() {
        "https" => {}
        "http" if dev_mode => {}
        other => return Err(RegistryError::UnsafeEndpoint(format!("scheme {other:?} not permitted"))),
    }
    let host = url.host_str().ok_or_else(|| RegistryError::UnsafeEndpoint("missing host".into()))?;
    if is_blocked_hostname(host) {
        return Err(RegistryError::UnsafeEndpoint(format!("{host} is a blocked metadata hostname")));
    }
    let port = url.port_or_known_default().unwrap_or(443);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| RegistryError::UnsafeEndpoint(format!("dns resolution failed: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(RegistryError::UnsafeEndpoint("host did not resolve".into()));
    }
    for addr in addrs {
        if is_reserved(addr.ip()) {
            return Err(RegistryError::UnsafeEndpoint(format!("{} resolves to a reserved address", host)));
        }
    }
    Ok(())
}

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4 == std::net::Ipv4Addr::new(169, 254, 169, 254)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_reserved(IpAddr::V4(v4));
            }
            v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn registry() -> SolverRegistry {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SolverRegistry::new(db.open_tree("solvers").unwrap(), 2, true)
    }

    fn sign_registration(signer: &PrivateKeySigner, endpoint: &str, timestamp_ms: u64) -> [u8; 65] {
        let message = format!(
            "FirmSwap Solver Registration\nAddress: {}\nEndpoint: {}\nTimestamp: {}",
            format!("{:#x}", signer.address()).to_lowercase(),
            endpoint,
            timestamp_ms
        );
        signer.sign_message_sync(message.as_bytes()).unwrap().as_bytes()
    }

    #[test]
    fn registers_with_valid_signature() {
        let registry = registry();
        let signer = PrivateKeySigner::random();
        let sig = sign_registration(&signer, "http://127.0.0.1:9999", 1_000);
        // dev mode permits http but SSRF still blocks loopback.
        let err = registry
            .register(ChainId::new(8453), signer.address(), "http://127.0.0.1:9999".into(), "solver-a".into(), 1_000, &sig, 1_000)
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnsafeEndpoint(_)));
    }

    #[test]
    fn rejects_wrong_signer() {
        let registry = registry();
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let sig = sign_registration(&other, "https://solver.example.com", 1_000);
        let err = registry
            .register(ChainId::new(8453), signer.address(), "https://solver.example.com".into(), "solver-a".into(), 1_000, &sig, 1_000)
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadAuth));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let registry = registry();
        let signer = PrivateKeySigner::random();
        let sig = sign_registration(&signer, "https://solver.example.com", 1_000);
        let err = registry
            .register(ChainId::new(8453), signer.address(), "https://solver.example.com".into(), "solver-a".into(), 1_000, &sig, 1_000 + (10 * 60 * 1000))
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadAuth));
    }

    #[test]
    fn reserved_hostnames_are_rejected_by_ssrf_check() {
        assert!(validate_endpoint("https://169.254.169.254/", false).is_err());
        assert!(validate_endpoint("http://example.com/", false).is_err());
    }

    #[test]
    fn blocked_metadata_hostnames_are_rejected_before_dns_resolution() {
        let err = validate_endpoint("https://metadata.google.internal/", false).unwrap_err();
        assert!(matches!(err, RegistryError::UnsafeEndpoint(_)));
        let err = validate_endpoint("https://metadata/", false).unwrap_err();
        assert!(matches!(err, RegistryError::UnsafeEndpoint(_)));
    }
}
