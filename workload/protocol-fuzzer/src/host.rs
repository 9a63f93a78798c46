//! Ephemeral libp2p host: a tokio-driven swarm with the raw-stream
//! behaviour. The fuzzer speaks arbitrary protocol IDs with arbitrary
//! bytes, so no typed codec sits between an attack and the wire.

use std::time::Duration;

use futures::StreamExt;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::{noise, tcp, yamux, Multiaddr, PeerId, Stream, StreamProtocol, SwarmBuilder};
use libp2p_stream as stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub const EXCHANGE_PROTOCOL: StreamProtocol = StreamProtocol::new("/fil/chain/xchg/0.0.1");
pub const HELLO_PROTOCOL: StreamProtocol = StreamProtocol::new("/fil/hello/1.0.0");

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to build host: {0}")]
    Build(String),
    #[error("stream open failed: {0}")]
    OpenStream(String),
    #[error("protocol already registered: {0}")]
    Accept(String),
    #[error("dial timed out")]
    DialTimeout,
}

enum HostCommand {
    Dial { peer: PeerId, addr: Multiaddr },
}

/// One ephemeral peer identity with its own swarm task.
pub struct FuzzHost {
    peer_id: PeerId,
    control: stream::Control,
    commands: mpsc::UnboundedSender<HostCommand>,
    task: JoinHandle<()>,
}

impl FuzzHost {
    /// Creates a host with a fresh ed25519 identity, listening on an
    /// ephemeral TCP port.
    pub fn spawn() -> Result<Self, HostError> {
        let mut swarm = SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|err| HostError::Build(err.to_string()))?
            .with_behaviour(|_| stream::Behaviour::new())
            .map_err(|err| HostError::Build(err.to_string()))?
            .with_swarm_config(|config| {
                config.with_idle_connection_timeout(Duration::from_secs(60))
            })
            .build();

        swarm
            .listen_on(
                "/ip4/0.0.0.0/tcp/0"
                    .parse()
                    .expect("static multiaddr parses"),
            )
            .map_err(|err| HostError::Build(err.to_string()))?;

        let peer_id = *swarm.local_peer_id();
        let control = swarm.behaviour().new_control();
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(HostCommand::Dial { peer, addr }) => {
                            swarm.add_peer_address(peer, addr.clone());
                            let opts = DialOpts::peer_id(peer)
                                .condition(PeerCondition::DisconnectedAndNotDialing)
                                .addresses(vec![addr])
                                .build();
                            if let Err(err) = swarm.dial(opts) {
                                trace!(target: "fuzzer::host", %peer, %err, "dial rejected");
                            }
                        }
                        None => break,
                    },
                    event = swarm.select_next_some() => {
                        trace!(target: "fuzzer::host", ?event, "swarm event");
                    }
                }
            }
        });

        debug!(target: "fuzzer::host", peer = %peer_id, "host spawned");
        Ok(Self {
            peer_id,
            control,
            commands,
            task,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Registers the target's address and kicks off a dial. Connection
    /// establishment completes in the background; `open_stream` retries
    /// until the connection is usable.
    pub fn dial(&self, peer: PeerId, addr: Multiaddr) {
        let _ = self.commands.send(HostCommand::Dial { peer, addr });
    }

    /// Opens a raw stream for `protocol`, dialing first when necessary.
    pub async fn open_stream(
        &self,
        peer: PeerId,
        addr: Multiaddr,
        protocol: StreamProtocol,
    ) -> Result<Stream, HostError> {
        self.dial(peer, addr);

        let mut control = self.control.clone();
        let open = async {
            loop {
                match control.open_stream(peer, protocol.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(stream::OpenStreamError::UnsupportedProtocol(p)) => {
                        return Err(HostError::OpenStream(format!(
                            "target does not speak {p}"
                        )));
                    }
                    Err(err) => {
                        trace!(target: "fuzzer::host", %peer, %err, "open retry");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                }
            }
        };
        match tokio::time::timeout(DIAL_TIMEOUT + STREAM_OPEN_TIMEOUT, open).await {
            Ok(result) => result,
            Err(_) => Err(HostError::DialTimeout),
        }
    }

    /// Inbound stream source for `protocol`. Each protocol can be accepted
    /// once per host.
    pub fn accept(&self, protocol: StreamProtocol) -> Result<stream::IncomingStreams, HostError> {
        self.control
            .clone()
            .accept(protocol)
            .map_err(|err| HostError::Accept(err.to_string()))
    }

    /// Tears the swarm down. Dropping the host leaks the driver task, so
    /// every owner must close explicitly or hold it for process lifetime.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for FuzzHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hosts_get_distinct_identities() {
        let a = FuzzHost::spawn().expect("host a");
        let b = FuzzHost::spawn().expect("host b");
        assert_ne!(a.peer_id(), b.peer_id());
        a.close();
        b.close();
    }

    #[tokio::test]
    async fn accept_registers_each_protocol_once() {
        let host = FuzzHost::spawn().expect("host");
        assert!(host.accept(EXCHANGE_PROTOCOL).is_ok());
        assert!(host.accept(EXCHANGE_PROTOCOL).is_err());
        assert!(host.accept(HELLO_PROTOCOL).is_ok());
        host.close();
    }
}
