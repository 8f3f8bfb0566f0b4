use crate::peers::ClusterNode;
use crate::probe::ProbeError;
use std::time::Duration;

/// A peer that answered every probe sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Mean round trip over all samples
    pub latency: Duration,
    /// Host part of the gossip address, as it was probed
    pub ip: String,
    pub node: ClusterNode,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Measured(Measurement),
    Failed { address: String, reason: ProbeError },
}
