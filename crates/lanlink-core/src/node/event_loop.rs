//! Event loop driving the tunnel from the socket, the timers and the
//! command channel

use crate::tunnel::Tunnel;
use lanlink_transport::{MAX_DATAGRAM_SIZE, Transport, TransportError, UdpTransport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

/// Work sent to the event loop by the node API
pub(crate) type Command = Box<dyn FnOnce(&mut Tunnel, Instant) + Send>;

/// Run until `shutdown` fires or the transport closes, then hand the tunnel
/// back.
///
/// Every wake-up ends with a flush of the tunnel's queued datagrams.
pub(crate) async fn run_event_loop(
    mut tunnel: Tunnel,
    transport: Arc<UdpTransport>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: oneshot::Receiver<()>,
) -> Tunnel {
    let mut resend = interval(tunnel.config().resend_interval);
    let mut reenable = interval(tunnel.config().resend_request_interval);
    let mut ping = interval(tunnel.config().ping_interval);
    for timer in [&mut resend, &mut reenable, &mut ping] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            result = transport.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    let now = Instant::now();
                    tunnel.handle_datagram(from, &buf[..len], now);
                    drain_socket(&mut tunnel, &transport, &mut buf, now);
                    tunnel.finish_receive();
                }
                Err(TransportError::Closed) => break,
                Err(e) => tracing::warn!("Error receiving datagram: {}", e),
            },
            command = commands.recv() => match command {
                Some(command) => command(&mut tunnel, Instant::now()),
                None => break,
            },
            _ = resend.tick() => tunnel.on_resend_timer(Instant::now()),
            _ = reenable.tick() => tunnel.on_resend_request_timer(),
            _ = ping.tick() => tunnel.on_ping_timer(Instant::now()),
        }

        flush(&mut tunnel, &transport);
    }

    tracing::debug!("Event loop exited");
    tunnel
}

/// Feed every datagram already queued on the socket to the tunnel
fn drain_socket(tunnel: &mut Tunnel, transport: &UdpTransport, buf: &mut [u8], now: Instant) {
    loop {
        match transport.try_recv_from(buf) {
            Ok(Some((len, from))) => tunnel.handle_datagram(from, &buf[..len], now),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Error draining socket: {}", e);
                break;
            }
        }
    }
}

/// Send every datagram the tunnel has queued without waiting on the socket
fn flush(tunnel: &mut Tunnel, transport: &UdpTransport) {
    for transmit in tunnel.drain_transmits() {
        match transport.try_send_to(&transmit.contents, transmit.destination) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(
                "Socket busy, dropping {} bytes to {}",
                transmit.contents.len(),
                transmit.destination
            ),
            Err(e) => tracing::warn!(
                "Failed to send {} bytes to {}: {}",
                transmit.contents.len(),
                transmit.destination,
                e
            ),
        }
    }
}
