//! softfork.rs — BIP9-style soft-fork deployment engine
//!
//! Each deployment signals on one header-version bit. State advances only at
//! window boundaries and is a pure function of the header chain, so the
//! cache is keyed by (deployment, window start) and entries survive until a
//! disconnect touches their window.

use std::collections::BTreeMap;

use crate::consensus::{median_u64, NetworkParams};
use crate::errors::NodeError;
use crate::BlockHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl ThresholdState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdState::Defined => "DEFINED",
            ThresholdState::Started => "STARTED",
            ThresholdState::LockedIn => "LOCKED_IN",
            ThresholdState::Active => "ACTIVE",
            ThresholdState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ThresholdState::Active | ThresholdState::Failed)
    }
}

/// One soft-fork deployment. Window size and threshold are network-wide
/// parameters (`miner_window` / `activation_threshold`).
#[derive(Debug, Clone)]
pub struct Deployment {
    pub name: &'static str,
    /// Header version bit used for signaling.
    pub bit: u8,
    /// Median-time-past at which signaling may begin.
    pub start_time: u64,
    /// Median-time-past after which an unlocked deployment fails.
    pub timeout: u64,
}

impl Deployment {
    pub fn signals(&self, version: u32) -> bool {
        version & (1u32 << self.bit) != 0
    }
}

/// Per-window introspection numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentStats {
    pub elapsed: u32,
    pub count: u32,
    pub possible: bool,
}

/// Threshold states pinned to window boundaries.
#[derive(Debug, Default)]
pub struct DeploymentCache {
    /// (deployment name, window start height) -> (state, since height).
    states: BTreeMap<(&'static str, u32), (ThresholdState, u32)>,
}

/// Median time past over the trailing `median_window` headers ending at
/// `height` inclusive.
pub fn median_time_past(headers: &[BlockHeader], height: u32, net: &NetworkParams) -> u64 {
    if headers.is_empty() {
        return 0;
    }
    let height = (height as usize).min(headers.len() - 1);
    let from = height.saturating_sub(net.median_window.saturating_sub(1));
    let ts: Vec<u64> = headers[from..=height].iter().map(|h| h.time).collect();
    median_u64(&ts)
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threshold state governing the block at `height` (the state computed
    /// at the last window boundary at or below it). `headers` is the main
    /// chain indexed by height; entries above `height` are ignored.
    pub fn state_for_block(
        &mut self,
        headers: &[BlockHeader],
        dep: &Deployment,
        net: &NetworkParams,
        height: u32,
    ) -> Result<(ThresholdState, u32), NodeError> {
        let window = net.miner_window;
        let boundary = height - height % window;
        self.state_at_boundary(headers, dep, net, boundary)
    }

    fn state_at_boundary(
        &mut self,
        headers: &[BlockHeader],
        dep: &Deployment,
        net: &NetworkParams,
        boundary: u32,
    ) -> Result<(ThresholdState, u32), NodeError> {
        let window = net.miner_window;
        if boundary % window != 0 {
            return Err(NodeError::SoftForkState(format!(
                "boundary {} not aligned to window {}",
                boundary, window
            )));
        }
        if let Some(cached) = self.states.get(&(dep.name, boundary)) {
            return Ok(*cached);
        }

        // Walk back to the closest cached (or genesis) boundary, then roll
        // states forward one window at a time.
        let mut start = boundary;
        while start > 0 && !self.states.contains_key(&(dep.name, start - window)) {
            start -= window;
        }

        let (mut state, mut since) = if start == 0 {
            (ThresholdState::Defined, 0)
        } else {
            *self
                .states
                .get(&(dep.name, start - window))
                .expect("cached boundary just located")
        };

        let mut b = start;
        loop {
            if b == 0 {
                // Genesis boundary: DEFINED by definition.
                self.states.insert((dep.name, 0), (ThresholdState::Defined, 0));
                state = ThresholdState::Defined;
                since = 0;
            } else {
                // Transition decided by the chain up to the boundary's parent.
                let parent = b - 1;
                if parent as usize >= headers.len() {
                    return Err(NodeError::MissingData(format!(
                        "header at height {} required for deployment {}",
                        parent, dep.name
                    )));
                }
                let mtp = median_time_past(headers, parent, net);
                let next = match state {
                    ThresholdState::Defined => {
                        if mtp >= dep.timeout {
                            ThresholdState::Failed
                        } else if mtp >= dep.start_time {
                            ThresholdState::Started
                        } else {
                            ThresholdState::Defined
                        }
                    }
                    ThresholdState::Started => {
                        if mtp >= dep.timeout {
                            ThresholdState::Failed
                        } else {
                            let from = b - window;
                            let count = headers[from as usize..b as usize]
                                .iter()
                                .filter(|h| dep.signals(h.version))
                                .count() as u32;
                            if count >= net.activation_threshold {
                                ThresholdState::LockedIn
                            } else {
                                ThresholdState::Started
                            }
                        }
                    }
                    ThresholdState::LockedIn => ThresholdState::Active,
                    terminal => terminal,
                };
                if next != state {
                    since = b;
                }
                state = next;
                self.states.insert((dep.name, b), (state, since));
            }
            if b == boundary {
                break;
            }
            b += window;
        }
        Ok((state, since))
    }

    /// Drop entries invalidated by disconnecting back to `height`: any
    /// boundary whose computation saw a now-disconnected header.
    pub fn invalidate_from(&mut self, height: u32) {
        self.states.retain(|(_, boundary), _| *boundary <= height);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Signal statistics for the window containing `height`.
pub fn deployment_stats(
    headers: &[BlockHeader],
    dep: &Deployment,
    net: &NetworkParams,
    height: u32,
) -> DeploymentStats {
    let window = net.miner_window;
    let window_start = height - height % window;
    let upto = (height as usize).min(headers.len().saturating_sub(1));
    let count = headers[window_start as usize..=upto]
        .iter()
        .filter(|h| dep.signals(h.version))
        .count() as u32;
    let elapsed = upto as u32 - window_start + 1;
    let possible = count + (window - elapsed) >= net.activation_threshold;
    DeploymentStats { elapsed, count, possible }
}
