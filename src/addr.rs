//! Address allocation logic.
//!
//! This module contains the deterministic IP, MAC and CPU-core assignment
//! used when populating a network: a sequential address counter over a
//! configured CIDR base, MAC derivation from counter values, random
//! locally-administered MACs for link endpoints, and a cycling core index
//! for CPU pinning.

use crate::error::NetError;
use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Build a MAC from the low 48 bits of an integer, colon-hex style.
    pub fn from_u64(value: u64) -> Self {
        let b = value.to_be_bytes();
        MacAddr([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn to_u64(self) -> u64 {
        let [a, b, c, d, e, f] = self.0;
        u64::from_be_bytes([0, 0, a, b, c, d, e, f])
    }

    /// True if the multicast/broadcast bit (lowest bit of the first octet)
    /// is set.
    pub fn is_multicast(self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| NetError::Configuration(format!("invalid MAC address '{s}'")))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| NetError::Configuration(format!("invalid MAC address '{s}'")))?;
        }
        if parts.next().is_some() {
            return Err(NetError::Configuration(format!("invalid MAC address '{s}'")));
        }
        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: NetError| D::Error::custom(e.to_string()))
    }
}

/// An IPv4 address together with its prefix length, e.g. `10.0.0.1/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpSpec {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl IpSpec {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        IpSpec { addr, prefix_len }
    }

    /// The network part of the address under its own prefix.
    pub fn network(&self) -> u32 {
        u32::from(self.addr) & prefix_mask(self.prefix_len)
    }
}

impl fmt::Display for IpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for IpSpec {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| NetError::Configuration(format!("expected CIDR notation, got '{s}'")))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| NetError::Configuration(format!("invalid IPv4 address in '{s}'")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| NetError::Configuration(format!("invalid prefix length in '{s}'")))?;
        if prefix_len > 32 {
            return Err(NetError::Configuration(format!(
                "prefix length {prefix_len} out of range in '{s}'"
            )));
        }
        Ok(IpSpec { addr, prefix_len })
    }
}

impl Serialize for IpSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: NetError| D::Error::custom(e.to_string()))
    }
}

fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

/// Deterministic, stateful IP/MAC/core assignment for one network instance.
///
/// Addresses advance sequentially from the base prefix and are never
/// reused within the allocator's lifetime. Exhausting the address space is
/// the caller's responsibility (size the base prefix accordingly).
#[derive(Debug)]
pub struct AddressAllocator {
    base: u32,
    prefix_len: u8,
    next_ip: u32,
    num_cores: usize,
    next_core: usize,
}

impl AddressAllocator {
    /// Create an allocator over `ip_base` (CIDR, e.g. `10.0.0.0/8`).
    ///
    /// `num_cores` bounds the cycling core index used for CPU pinning.
    pub fn new(ip_base: &str, num_cores: usize) -> Result<Self, NetError> {
        let base: IpSpec = ip_base.parse()?;
        Ok(AddressAllocator {
            base: base.network(),
            prefix_len: base.prefix_len,
            next_ip: 1,
            num_cores: num_cores.max(1),
            next_core: 0,
        })
    }

    /// The counter value the next allocation will consume, then advance.
    ///
    /// Exposed so a host's default MAC can be derived from the same value
    /// as its default IP.
    pub fn next_index(&mut self) -> u32 {
        let index = self.next_ip;
        self.next_ip += 1;
        index
    }

    /// The address `index` steps into the base range.
    pub fn address_for(&self, index: u32) -> IpSpec {
        IpSpec {
            addr: Ipv4Addr::from(self.base.wrapping_add(index)),
            prefix_len: self.prefix_len,
        }
    }

    /// The next unused address in the base range; never reuses a value.
    pub fn next_address(&mut self) -> IpSpec {
        let index = self.next_index();
        self.address_for(index)
    }

    /// Deterministic MAC for an allocation counter value.
    pub fn mac_for(index: u32) -> MacAddr {
        MacAddr::from_u64(u64::from(index))
    }

    /// A random, non-multicast, locally-administered MAC address.
    pub fn rand_mac() -> MacAddr {
        let bits = rand::thread_rng().gen::<u64>() & 0xfe_ffff_ffff_ff | 0x02_0000_0000_00;
        MacAddr::from_u64(bits)
    }

    /// The next core index for CPU pinning, cycling over available cores.
    pub fn next_core(&mut self) -> usize {
        let core = self.next_core;
        self.next_core = (self.next_core + 1) % self.num_cores;
        core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_addresses_from_base() {
        let mut alloc = AddressAllocator::new("10.0.0.0/8", 4).unwrap();
        assert_eq!(alloc.next_address().to_string(), "10.0.0.1/8");
        assert_eq!(alloc.next_address().to_string(), "10.0.0.2/8");
        assert_eq!(alloc.next_address().to_string(), "10.0.0.3/8");
    }

    #[test]
    fn test_addresses_are_injective() {
        let mut alloc = AddressAllocator::new("192.168.0.0/24", 1).unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(alloc.next_address()));
        }
    }

    #[test]
    fn test_octet_carry() {
        let mut alloc = AddressAllocator::new("10.0.0.0/8", 1).unwrap();
        for _ in 0..255 {
            alloc.next_address();
        }
        assert_eq!(alloc.next_address().to_string(), "10.0.1.0/8");
    }

    #[test]
    fn test_base_host_bits_are_masked() {
        let mut alloc = AddressAllocator::new("10.9.8.7/8", 1).unwrap();
        assert_eq!(alloc.next_address().to_string(), "10.0.0.1/8");
    }

    #[test]
    fn test_mac_for_index() {
        assert_eq!(
            AddressAllocator::mac_for(1).to_string(),
            "00:00:00:00:00:01"
        );
        assert_eq!(
            AddressAllocator::mac_for(0x1234).to_string(),
            "00:00:00:00:12:34"
        );
    }

    #[test]
    fn test_rand_mac_never_multicast() {
        for _ in 0..10_000 {
            let mac = AddressAllocator::rand_mac();
            assert!(!mac.is_multicast(), "multicast MAC generated: {mac}");
            // Locally-administered bit is always set
            assert_eq!(mac.0[0] & 0x02, 0x02);
        }
    }

    #[test]
    fn test_core_cycling() {
        let mut alloc = AddressAllocator::new("10.0.0.0/8", 3).unwrap();
        let cores: Vec<usize> = (0..7).map(|_| alloc.next_core()).collect();
        assert_eq!(cores, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_mac_roundtrip_parse() {
        let mac: MacAddr = "02:ab:00:12:34:56".parse().unwrap();
        assert_eq!(mac.to_string(), "02:ab:00:12:34:56");
        assert!("02:ab:00:12:34".parse::<MacAddr>().is_err());
        assert!("zz:ab:00:12:34:56".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_ip_spec_parse() {
        let ip: IpSpec = "10.0.0.5/8".parse().unwrap();
        assert_eq!(ip.addr, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(ip.prefix_len, 8);
        assert!("10.0.0.5".parse::<IpSpec>().is_err());
        assert!("10.0.0.5/40".parse::<IpSpec>().is_err());
    }
}
