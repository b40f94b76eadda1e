//! Per-peer resend statistics.
//!
//! Tracks how many transmissions each acknowledgement costs, derives the
//! proactive repetition rate from that ratio, and turns recent round-trip
//! samples into a resend timeout.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tuning for [`ResendStats`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResendPolicy {
    /// Upper bound of the resend rate
    pub max_resend_rate: u32,
    /// Counters are halved once the ack count exceeds this
    pub ack_halving_threshold: u32,
    /// Number of RTT samples kept
    pub rtt_window: usize,
    /// Timeout used before any RTT sample exists
    pub initial_resend_timeout: Duration,
    /// Upper bound of the timeout
    pub max_resend_timeout: Duration,
    /// Fixed margin added to the scaled RTT
    pub rtt_margin: Duration,
}

impl Default for ResendPolicy {
    fn default() -> Self {
        Self {
            max_resend_rate: 3,
            ack_halving_threshold: 32,
            rtt_window: 16,
            initial_resend_timeout: Duration::from_secs(1),
            max_resend_timeout: Duration::from_secs(2),
            rtt_margin: Duration::from_millis(30),
        }
    }
}

/// Send/ack accounting, RTT window and liveness timestamps of one peer
#[derive(Debug, Clone)]
pub struct ResendStats {
    policy: ResendPolicy,
    send_count: u32,
    ack_count: u32,
    last_timed_out_seq: Option<u32>,
    last_resend_request_seq: Option<u32>,
    rtt_samples: VecDeque<Duration>,
    first_probe_at: Option<Instant>,
    last_ack_at: Option<Instant>,
}

impl ResendStats {
    /// Fresh statistics
    #[must_use]
    pub fn new(policy: ResendPolicy) -> Self {
        Self {
            policy,
            send_count: 0,
            ack_count: 0,
            last_timed_out_seq: None,
            last_resend_request_seq: None,
            rtt_samples: VecDeque::with_capacity(policy.rtt_window),
            first_probe_at: None,
            last_ack_at: None,
        }
    }

    /// Number of copies worth sending per payload, in `1..=max_resend_rate`.
    ///
    /// 1 while every send is matched by an ack, otherwise the send/ack
    /// ratio rounded to the nearest integer (the raw send count before the
    /// first ack). With one ack per `k` sends this settles at `k`.
    #[must_use]
    pub fn resend_rate(&self) -> u32 {
        let rate = if self.send_count <= self.ack_count {
            1
        } else if self.ack_count == 0 {
            self.send_count
        } else {
            let (send, ack) = (u64::from(self.send_count), u64::from(self.ack_count));
            u32::try_from((send + ack / 2) / ack).unwrap_or(u32::MAX)
        };
        rate.clamp(1, self.policy.max_resend_rate.max(1))
    }

    /// Account for one transmission
    pub fn record_send(&mut self) {
        self.send_count = self.send_count.saturating_add(1);
    }

    /// Account for one acknowledgement
    pub fn record_ack(&mut self) {
        self.ack_count = self.ack_count.saturating_add(1);
        if self.ack_count > self.policy.ack_halving_threshold {
            self.send_count /= 2;
            self.ack_count /= 2;
        }
    }

    /// Current `(send_count, ack_count)`
    #[must_use]
    pub fn counters(&self) -> (u32, u32) {
        (self.send_count, self.ack_count)
    }

    /// Add a round-trip sample, evicting the oldest beyond the window
    pub fn add_rtt_sample(&mut self, rtt: Duration) {
        if self.rtt_samples.len() == self.policy.rtt_window.max(1) {
            self.rtt_samples.pop_front();
        }
        self.rtt_samples.push_back(rtt);
    }

    /// Most recent round-trip sample
    #[must_use]
    pub fn last_rtt(&self) -> Option<Duration> {
        self.rtt_samples.back().copied()
    }

    /// Resend timeout: 90th percentile RTT × 1.1 + margin, capped
    #[must_use]
    pub fn resend_timeout(&self) -> Duration {
        if self.rtt_samples.is_empty() {
            return self
                .policy
                .initial_resend_timeout
                .min(self.policy.max_resend_timeout);
        }

        let mut sorted: Vec<Duration> = self.rtt_samples.iter().copied().collect();
        sorted.sort_unstable();
        let p90 = sorted[(sorted.len() - 1) * 9 / 10];

        (p90.mul_f64(1.1) + self.policy.rtt_margin).min(self.policy.max_resend_timeout)
    }

    /// Record that `seq` missed its deadline. Returns true the first time.
    pub fn note_timeout(&mut self, seq: u32) -> bool {
        if self.last_timed_out_seq.is_some_and(|last| last >= seq) {
            return false;
        }
        self.last_timed_out_seq = Some(seq);
        true
    }

    /// Forget sequence bookkeeping after the link's sequence space restarts
    pub fn restart_sequences(&mut self) {
        self.last_timed_out_seq = None;
        self.last_resend_request_seq = None;
    }

    /// Record the last sequence covered by a resend request
    pub fn note_resend_request(&mut self, seq: u32) {
        self.last_resend_request_seq = Some(seq);
    }

    /// Last sequence covered by a resend request
    #[must_use]
    pub fn last_resend_request_seq(&self) -> Option<u32> {
        self.last_resend_request_seq
    }

    /// Start the liveness clock on the first probe
    pub fn mark_probe_sent(&mut self, now: Instant) {
        self.first_probe_at.get_or_insert(now);
    }

    /// Record liveness evidence
    pub fn mark_alive(&mut self, now: Instant) {
        self.last_ack_at = Some(now);
    }

    /// Whether the peer has been silent for longer than `timeout`.
    ///
    /// Measured from the last ack, or from the first probe if no ack ever
    /// arrived. A peer never probed is not considered dead.
    #[must_use]
    pub fn is_dead(&self, now: Instant, timeout: Duration) -> bool {
        self.last_ack_at
            .or(self.first_probe_at)
            .is_some_and(|since| now.saturating_duration_since(since) > timeout)
    }
}

impl Default for ResendStats {
    fn default() -> Self {
        Self::new(ResendPolicy::default())
    }
}
