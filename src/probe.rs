use crate::peers::ClusterNode;
use crate::types::{Measurement, ProbeOutcome};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use thiserror::Error;
use tokio::{net, time};
use tracing::{debug, trace, warn};

/// Same size as the default `ping` payload.
const PAYLOAD: [u8; 56] = [0; 56];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeParams {
    pub count: usize,
    pub interval: Duration,
    /// Upper bound per node, name resolution and all samples included
    pub timeout: Duration,
}

impl Default for ProbeParams {
    fn default() -> Self {
        Self {
            count: 5,
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("could not resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },
    #[error("icmp socket unavailable: {0}")]
    Setup(String),
    #[error("packet loss: {received} of {expected} samples answered")]
    PacketLoss { received: usize, expected: usize },
    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// Round-trip measurement against a single host.
///
/// Implementations return the mean round trip over every sample, or an error if
/// any sample went unanswered.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, ip: IpAddr) -> Result<Duration, ProbeError>;
}

/// Split a gossip address into host and port.
///
/// Accepts `host:port` with exactly one colon, or a bracketed IPv6 socket
/// address such as `[2001:db8::1]:8001`.
pub fn parse_gossip(gossip: &str) -> Result<(String, u16), ProbeError> {
    if let Ok(SocketAddr::V6(addr)) = gossip.parse::<SocketAddr>() {
        return Ok((addr.ip().to_string(), addr.port()));
    }
    let invalid = || ProbeError::InvalidAddress(gossip.to_string());
    let mut parts = gossip.split(':');
    let (host, port) = match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) if !host.is_empty() => (host, port),
        _ => return Err(invalid()),
    };
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

async fn resolve(host: &str, port: u16) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolve_err = |source| ProbeError::Resolve {
        host: host.to_string(),
        source,
    };
    net::lookup_host((host, port))
        .await
        .map_err(resolve_err)?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| resolve_err(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

/// Probe one cluster node, turning every failure into a `Failed` outcome.
///
/// `timeout` covers name resolution and the echo exchange together, so a stuck
/// resolver cannot hold the caller's limiter slot past it.
pub async fn probe_node<P: Prober + ?Sized>(
    prober: &P,
    node: ClusterNode,
    timeout: Duration,
) -> ProbeOutcome {
    let address = node.gossip_or_empty().to_string();
    let result = async {
        let (host, port) = parse_gossip(&address)?;
        let measure = async {
            let ip = resolve(&host, port).await?;
            prober.probe(ip).await
        };
        let latency = time::timeout(timeout, measure)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;
        Ok::<_, ProbeError>((host, latency))
    }
    .await;

    match result {
        Ok((ip, latency)) => ProbeOutcome::Measured(Measurement { latency, ip, node }),
        Err(reason) => ProbeOutcome::Failed { address, reason },
    }
}

/// Mean of the answered samples, or packet loss if fewer than `expected` came back.
pub fn average_rtt(rtts: &[Duration], expected: usize) -> Result<Duration, ProbeError> {
    if expected == 0 || rtts.len() < expected {
        return Err(ProbeError::PacketLoss {
            received: rtts.len(),
            expected,
        });
    }
    let total: Duration = rtts.iter().sum();
    Ok(total / rtts.len() as u32)
}

/// Take `count` samples, starting sample `n` at `n * interval` whether or not
/// earlier ones have been answered. Returns the answered round trips.
pub async fn sample_on_schedule<F, Fut, E>(count: usize, interval: Duration, sample: F) -> Vec<Duration>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<Duration, E>>,
    E: Display,
{
    let sample = &sample;
    let samples = (0..count).map(|n| async move {
        time::sleep(interval * n as u32).await;
        sample(n).await.map_err(|e| trace!("sample {} lost: {}", n, e)).ok()
    });
    join_all(samples).await.into_iter().flatten().collect()
}

/// Hands out blocks of ICMP sequence numbers.
///
/// Unprivileged ICMP sockets match replies on (host, sequence) only, so two
/// measurements of the same host in flight must never share a sequence number.
#[derive(Debug, Default)]
pub struct Sequences(AtomicU16);

impl Sequences {
    /// First number of a fresh block of `count`; the block may wrap past `u16::MAX`.
    pub fn reserve(&self, count: usize) -> u16 {
        self.0.fetch_add(count as u16, Ordering::Relaxed)
    }
}

/// ICMP echo prober backed by one shared socket per address family.
pub struct IcmpProber {
    params: ProbeParams,
    v4: Result<Client, String>,
    v6: Result<Client, String>,
    next_ident: AtomicU16,
    sequences: Sequences,
}

fn open_client(kind: ICMP) -> Result<Client, String> {
    Client::new(&Config::builder().kind(kind).build()).map_err(|e| e.to_string())
}

impl IcmpProber {
    /// Open the ICMP sockets. Must be called from within the tokio runtime.
    ///
    /// Failing to open a socket is not an error here: every probe on that family
    /// then fails on its own, and the run carries on with whatever is left.
    pub fn new(params: ProbeParams) -> Self {
        let v4 = open_client(ICMP::V4);
        if let Err(e) = &v4 {
            warn!("Cannot open ICMPv4 socket: {}", e);
            if unsafe { libc::geteuid() } != 0 {
                warn!("Not running as root; allow unprivileged ping via net.ipv4.ping_group_range or run with CAP_NET_RAW");
            }
        }
        let v6 = open_client(ICMP::V6);
        if let Err(e) = &v6 {
            debug!("Cannot open ICMPv6 socket: {}", e);
        }
        Self {
            params,
            v4,
            v6,
            next_ident: AtomicU16::new(std::process::id() as u16),
            sequences: Sequences::default(),
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, ip: IpAddr) -> Result<Duration, ProbeError> {
        let client = match ip {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => &self.v6,
        }
        .as_ref()
        .map_err(|e| ProbeError::Setup(e.clone()))?;

        let params = self.params;
        let ident = self.next_ident.fetch_add(1, Ordering::Relaxed);
        let first_seq = self.sequences.reserve(params.count);

        let rtts = sample_on_schedule(params.count, params.interval, |n| async move {
            // every sample has to be answered before the overall deadline
            let remaining = params.timeout.saturating_sub(params.interval * n as u32);
            let mut pinger = client.pinger(ip, PingIdentifier(ident)).await;
            pinger.timeout(remaining);
            let seq = PingSequence(first_seq.wrapping_add(n as u16));
            pinger.ping(seq, &PAYLOAD).await.map(|(_, rtt)| rtt)
        })
        .await;
        if rtts.len() < params.count {
            trace!("{} answered {} of {} samples", ip, rtts.len(), params.count);
        }
        average_rtt(&rtts, params.count)
    }
}
