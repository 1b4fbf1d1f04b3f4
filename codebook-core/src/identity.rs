//! Document identity and session headers.
//!
//! A document is keyed by a name-based UUID of its path, so the same path
//! maps to the same storage key across process restarts regardless of the
//! file's content. The session header records who/where the document was
//! first observed; building it involves one best-effort network probe that
//! degrades to loopback instead of failing.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SessionHeader;

/// Namespace for path-derived document ids.
const PATH_NAMESPACE: Uuid = Uuid::from_u128(0x5c0d_eb00_c0de_4e57_a1f0_7e11_5ca9_7d1d);

/// Address reported when the outbound probe cannot resolve one.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Well-known external address used only to select the outbound interface.
pub const DEFAULT_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Stable, content-independent key for a document.
///
/// Renders as 32 lowercase hex digits, which is also the file stem used
/// by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Derive the identity of a document path (UUID v5 over the UTF-8 path).
    pub fn of_path(path: &str) -> Self {
        Self(Uuid::new_v5(&PATH_NAMESPACE, path.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self)
    }
}

/// Shorthand for [`DocumentId::of_path`].
pub fn identity_of(path: &str) -> DocumentId {
    DocumentId::of_path(path)
}

/// Outcome of the outbound address probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbedAddress {
    /// Local address of the interface that routes to the probe target.
    Resolved(IpAddr),
    /// Probe failed; callers get [`LOOPBACK`].
    Defaulted,
}

impl ProbedAddress {
    pub fn ip(&self) -> IpAddr {
        match self {
            ProbedAddress::Resolved(ip) => *ip,
            ProbedAddress::Defaulted => LOOPBACK,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ProbedAddress::Resolved(_))
    }
}

/// Find the local routable address by connecting an unbound UDP socket.
///
/// `connect` on a datagram socket only selects a route; nothing is sent,
/// so this never waits on the network.
pub fn probe_outbound_ip(target: SocketAddr) -> ProbedAddress {
    match local_addr_towards(target) {
        Ok(ip) if !ip.is_unspecified() => ProbedAddress::Resolved(ip),
        Ok(ip) => {
            log::debug!("Outbound probe towards {target} returned {ip}; using loopback");
            ProbedAddress::Defaulted
        }
        Err(e) => {
            log::debug!("Outbound probe towards {target} failed: {e}; using loopback");
            ProbedAddress::Defaulted
        }
    }
}

fn local_addr_towards(target: SocketAddr) -> io::Result<IpAddr> {
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Builds the one-time header for a newly seen document.
pub trait IdentityResolver {
    fn build_header(&self, path: &str) -> SessionHeader;
}

/// Header built from the local machine: login name, host name, outbound IP.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    probe_target: SocketAddr,
}

impl LocalIdentity {
    pub fn new(probe_target: SocketAddr) -> Self {
        Self { probe_target }
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TARGET)
    }
}

impl IdentityResolver for LocalIdentity {
    fn build_header(&self, path: &str) -> SessionHeader {
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".into());
        SessionHeader {
            user: whoami::username(),
            host,
            ip: probe_outbound_ip(self.probe_target).ip().to_string(),
            file: path.to_string(),
        }
    }
}
