use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use thiserror::Error;

pub const DEFAULT_OVERLAY_POOL: &str = "10.100.0.0/22";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("no available addresses in {0}")]
    PoolExhausted(Ipv4Net),
}

/// Hands out `/32` overlay addresses from a fixed pool.
///
/// Allocation is lowest-free: hosts are scanned in ascending order from
/// `network + 1` up to (excluding) the broadcast address. The pool keeps no
/// state of its own; callers pass the addresses already in the registry and
/// must serialize allocate-then-insert themselves.
#[derive(Debug, Clone, Copy)]
pub struct OverlayIpam {
    pool: Ipv4Net,
}

impl OverlayIpam {
    pub fn new(pool: Ipv4Net) -> Self {
        Self { pool: pool.trunc() }
    }

    pub fn pool(&self) -> Ipv4Net {
        self.pool
    }

    /// Allocate the lowest free host given the CIDRs already held by workers.
    ///
    /// Entries that do not parse as `a.b.c.d[/len]` are ignored.
    pub fn allocate<'a, I>(&self, used: I) -> Result<String, AllocationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used: HashSet<Ipv4Addr> = used
            .into_iter()
            .filter_map(|cidr| cidr.split('/').next())
            .filter_map(|host| host.trim().parse().ok())
            .collect();

        let network = u32::from(self.pool.network());
        let broadcast = u32::from(self.pool.broadcast());

        (network..broadcast)
            .skip(1)
            .map(Ipv4Addr::from)
            .find(|ip| !used.contains(ip))
            .map(|ip| format!("{}/32", ip))
            .ok_or(AllocationError::PoolExhausted(self.pool))
    }
}

impl Default for OverlayIpam {
    fn default() -> Self {
        Self::new(Ipv4Net::new(Ipv4Addr::new(10, 100, 0, 0), 22).expect("valid prefix length"))
    }
}
