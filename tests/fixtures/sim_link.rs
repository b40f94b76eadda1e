//! Simulated link between two tunnels
//!
//! Both tunnels share a virtual clock that only moves when the test says so.
//! Datagrams are exchanged in memory; an optional filter decides which ones
//! the "network" loses.
//!
//! # Example
//!
//! ```no_run
//! use lanlink_core::{Action, TunnelConfig};
//! use lanlink_integration_tests::fixtures::{Side, SimLink};
//!
//! let mut link = SimLink::new(TunnelConfig::default(), TunnelConfig::default());
//! link.send(Side::A, Action::TcpData, b"hello");
//! link.pump();
//! assert_eq!(link.deliveries(Side::B).len(), 2); // HELLO + payload
//! ```

use lanlink_core::{Action, ChannelHandler, Datagram, Delivery, PeerId, Tunnel, TunnelConfig};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Peer id A uses for B
pub const B_ID: PeerId = 2;

/// Peer id B uses for A
pub const A_ID: PeerId = 1;

/// Clock step used by [`SimLink::run_for`]
pub const TICK: Duration = Duration::from_millis(10);

/// Upper bound on exchange rounds in one [`SimLink::pump`]
const MAX_PUMP_ROUNDS: usize = 10_000;

/// One end of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First tunnel
    A,
    /// Second tunnel
    B,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Loss predicate: sender side and datagram, true to drop
pub type DropFilter = Box<dyn FnMut(Side, &Datagram<'_>) -> bool>;

struct Timers {
    next_resend: Instant,
    next_reenable: Instant,
    next_ping: Instant,
}

struct End {
    tunnel: Tunnel,
    addr: SocketAddr,
    remote_id: PeerId,
    deliveries: UnboundedReceiver<Delivery>,
    timers: Timers,
    sent: usize,
}

/// Two tunnels connected to each other
pub struct SimLink {
    ends: [End; 2],
    start: Instant,
    elapsed: Duration,
    filter: Option<DropFilter>,
    dropped: usize,
}

impl SimLink {
    /// Build both tunnels and connect them to each other at time zero
    pub fn new(config_a: TunnelConfig, config_b: TunnelConfig) -> Self {
        let start = Instant::now();
        let end = |config: TunnelConfig, addr: SocketAddr, remote_id: PeerId| {
            let timers = Timers {
                next_resend: start + config.resend_interval,
                next_reenable: start + config.resend_request_interval,
                next_ping: start + config.ping_interval,
            };
            let mut tunnel = Tunnel::new(config, addr.port());
            let (handler, deliveries) = ChannelHandler::new();
            tunnel.set_handler(handler);
            End {
                tunnel,
                addr,
                remote_id,
                deliveries,
                timers,
                sent: 0,
            }
        };

        let a_addr = SocketAddr::from(([10, 0, 0, 1], 47624));
        let b_addr = SocketAddr::from(([10, 0, 0, 2], 47624));
        let mut link = Self {
            ends: [end(config_a, a_addr, B_ID), end(config_b, b_addr, A_ID)],
            start,
            elapsed: Duration::ZERO,
            filter: None,
            dropped: 0,
        };

        let now = link.now();
        link.ends[0]
            .tunnel
            .connect_to_peer(b_addr.ip(), b_addr.port(), B_ID, now);
        link.ends[1]
            .tunnel
            .connect_to_peer(a_addr.ip(), a_addr.port(), A_ID, now);
        link
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.start + self.elapsed
    }

    /// Virtual time since construction
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Tunnel of one side
    pub fn tunnel(&mut self, side: Side) -> &mut Tunnel {
        &mut self.ends[side.index()].tunnel
    }

    /// Id under which `side` knows its counterpart
    pub fn remote_id(&self, side: Side) -> PeerId {
        self.ends[side.index()].remote_id
    }

    /// Forward a payload from `side` to its counterpart
    pub fn send(&mut self, side: Side, action: Action, data: &[u8]) {
        let now = self.now();
        let end = &mut self.ends[side.index()];
        end.tunnel.forward_data(end.remote_id, action, data, now);
    }

    /// Install a loss predicate
    pub fn set_drop_filter<F>(&mut self, filter: F)
    where
        F: FnMut(Side, &Datagram<'_>) -> bool + 'static,
    {
        self.filter = Some(Box::new(filter));
    }

    /// Remove the loss predicate
    pub fn clear_drop_filter(&mut self) {
        self.filter = None;
    }

    /// Datagrams sent by `side` so far, including dropped ones
    pub fn sent(&self, side: Side) -> usize {
        self.ends[side.index()].sent
    }

    /// Datagrams lost so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Payloads delivered to `side` since the last call
    pub fn deliveries(&mut self, side: Side) -> Vec<Delivery> {
        let rx = &mut self.ends[side.index()].deliveries;
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    /// Move queued datagrams between the ends until both are quiet.
    ///
    /// Returns the number of datagrams that arrived.
    pub fn pump(&mut self) -> usize {
        let mut arrived = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let moved = self.carry(Side::A) + self.carry(Side::B);
            if moved == 0 {
                return arrived;
            }
            arrived += moved;
        }
        panic!("link did not settle after {MAX_PUMP_ROUNDS} rounds");
    }

    /// Move everything `from` has queued to the other end
    fn carry(&mut self, from: Side) -> usize {
        let now = self.now();
        let sender = from.index();
        let source = self.ends[sender].addr;
        let transmits: Vec<_> = self.ends[sender].tunnel.drain_transmits().collect();
        if transmits.is_empty() {
            return 0;
        }
        self.ends[sender].sent += transmits.len();

        let receiver = &mut self.ends[from.other().index()];
        let mut moved = 0;
        for transmit in transmits {
            assert_eq!(transmit.destination, receiver.addr);
            let lost = match (self.filter.as_mut(), Datagram::parse(&transmit.contents)) {
                (Some(filter), Ok(datagram)) => filter(from, &datagram),
                _ => false,
            };
            if lost {
                self.dropped += 1;
                continue;
            }
            receiver
                .tunnel
                .handle_datagram(source, &transmit.contents, now);
            moved += 1;
        }
        receiver.tunnel.finish_receive();
        moved
    }

    /// Advance the clock, firing due timers and pumping after every tick
    pub fn run_for(&mut self, duration: Duration) {
        let until = self.elapsed + duration;
        while self.elapsed < until {
            self.elapsed += TICK;
            let now = self.now();
            for end in &mut self.ends {
                let config = end.tunnel.config().clone();
                if now >= end.timers.next_resend {
                    end.tunnel.on_resend_timer(now);
                    end.timers.next_resend = now + config.resend_interval;
                }
                if now >= end.timers.next_reenable {
                    end.tunnel.on_resend_request_timer();
                    end.timers.next_reenable = now + config.resend_request_interval;
                }
                if now >= end.timers.next_ping {
                    end.tunnel.on_ping_timer(now);
                    end.timers.next_ping = now + config.ping_interval;
                }
            }
            self.pump();
        }
    }

    /// Advance the clock without firing timers
    pub fn advance(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}
