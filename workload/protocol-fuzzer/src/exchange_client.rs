//! Block-exchange client attacks: the fuzzer opens a stream to the victim
//! and writes a malformed (or adversarially-timed) request, then drains
//! whatever response comes back under a deadline.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::{AsyncReadExt, AsyncWriteExt};
use libp2p::Stream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use squall_chain_client::cbor;

use crate::context::FuzzerContext;
use crate::discovery::TargetNode;
use crate::host::{FuzzHost, EXCHANGE_PROTOCOL};
use crate::wire::{build_exchange_request, RawCid};

/// Request length the protocol accepts; one above must be rejected.
pub const MAX_REQUEST_LENGTH: u64 = 900;

const RESPONSE_READ_LIMIT: usize = 64 * 1024;
const RESPONSE_DEADLINE: Duration = Duration::from_secs(10);
const BURST_STREAMS: usize = 50;
const SLOW_READ_SECONDS: u64 = 65;
const HANG_SECONDS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAttack {
    EmptyHead,
    HugeHead,
    ZeroLength,
    MaxLength,
    ZeroOptions,
    BadOptions,
    TruncatedCbor,
    OversizedCbor,
    WrongCborType,
    SlowRead,
    StreamBurst,
    HalfRead,
    DuplicateCids,
    MaxRequestLength,
    OverMaxLength,
    HangNoClose,
}

impl ClientAttack {
    pub const ALL: [ClientAttack; 16] = [
        ClientAttack::EmptyHead,
        ClientAttack::HugeHead,
        ClientAttack::ZeroLength,
        ClientAttack::MaxLength,
        ClientAttack::ZeroOptions,
        ClientAttack::BadOptions,
        ClientAttack::TruncatedCbor,
        ClientAttack::OversizedCbor,
        ClientAttack::WrongCborType,
        ClientAttack::SlowRead,
        ClientAttack::StreamBurst,
        ClientAttack::HalfRead,
        ClientAttack::DuplicateCids,
        ClientAttack::MaxRequestLength,
        ClientAttack::OverMaxLength,
        ClientAttack::HangNoClose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClientAttack::EmptyHead => "exch-empty-head",
            ClientAttack::HugeHead => "exch-huge-head",
            ClientAttack::ZeroLength => "exch-zero-length",
            ClientAttack::MaxLength => "exch-max-length",
            ClientAttack::ZeroOptions => "exch-zero-options",
            ClientAttack::BadOptions => "exch-bad-options",
            ClientAttack::TruncatedCbor => "exch-truncated-cbor",
            ClientAttack::OversizedCbor => "exch-oversized-cbor",
            ClientAttack::WrongCborType => "exch-wrong-cbor-type",
            ClientAttack::SlowRead => "exch-slow-read",
            ClientAttack::StreamBurst => "exch-stream-burst",
            ClientAttack::HalfRead => "exch-half-read",
            ClientAttack::DuplicateCids => "exch-dup-cids",
            ClientAttack::MaxRequestLength => "exch-max-req-len",
            ClientAttack::OverMaxLength => "exch-over-max-len",
            ClientAttack::HangNoClose => "exch-hang-no-close",
        }
    }

    pub async fn execute(self, ctx: &FuzzerContext) {
        let host = match ctx.pool.get_for_stream() {
            Ok(host) => host,
            Err(err) => {
                debug!(target: "fuzzer::exchange", attack = self.name(), %err, "no host");
                return;
            }
        };
        let target = ctx.pick_target().clone();

        match self {
            ClientAttack::EmptyHead => {
                send_request(&host, &target, build_exchange_request(&[], 1, 1), self.name()).await;
            }
            ClientAttack::HugeHead => {
                let cids: Vec<RawCid> =
                    (0..100).map(|_| RawCid::random(&ctx.rng)).collect();
                send_request(&host, &target, build_exchange_request(&cids, 1, 1), self.name())
                    .await;
            }
            ClientAttack::ZeroLength => {
                let payload =
                    build_exchange_request(&[RawCid::random(&ctx.rng)], 0, 1);
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::MaxLength => {
                let payload =
                    build_exchange_request(&[RawCid::random(&ctx.rng)], u64::MAX, 1);
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::ZeroOptions => {
                let payload = build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 0);
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::BadOptions => {
                let payload =
                    build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 0xDEAD);
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::TruncatedCbor => {
                let valid = build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 1);
                let payload = valid[..valid.len() / 2].to_vec();
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::OversizedCbor => {
                // An array header claiming 100 million elements, then junk.
                let mut payload = Vec::new();
                cbor::write_header(&mut payload, cbor::MAJ_ARRAY, 100_000_000);
                payload.extend_from_slice(&ctx.rng.fill_bytes(1024));
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::WrongCborType => {
                send_request(&host, &target, cbor::text("hello"), self.name()).await;
            }
            ClientAttack::SlowRead => {
                slow_read(&host, &target, ctx, self.name()).await;
            }
            ClientAttack::StreamBurst => {
                stream_burst(&host, &target, ctx).await;
            }
            ClientAttack::HalfRead => {
                half_read(&host, &target, ctx, self.name()).await;
            }
            ClientAttack::DuplicateCids => {
                let cid = RawCid::random(&ctx.rng);
                let payload = build_exchange_request(&[cid.clone(), cid], 1, 1);
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::MaxRequestLength => {
                let payload = build_exchange_request(
                    &[RawCid::random(&ctx.rng)],
                    MAX_REQUEST_LENGTH,
                    1,
                );
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::OverMaxLength => {
                let payload = build_exchange_request(
                    &[RawCid::random(&ctx.rng)],
                    MAX_REQUEST_LENGTH + 1,
                    1,
                );
                send_request(&host, &target, payload, self.name()).await;
            }
            ClientAttack::HangNoClose => {
                hang_no_close(&host, &target, ctx, self.name()).await;
            }
        }
    }
}

async fn open(host: &FuzzHost, target: &TargetNode, name: &str) -> Option<Stream> {
    match host
        .open_stream(target.peer_id, target.addr.clone(), EXCHANGE_PROTOCOL)
        .await
    {
        Ok(stream) => Some(stream),
        Err(err) => {
            debug!(target: "fuzzer::exchange", attack = name, %err, "stream open failed");
            None
        }
    }
}

/// Writes the payload, half-closes, and drains the response.
async fn send_request(host: &FuzzHost, target: &TargetNode, payload: Vec<u8>, name: &str) {
    let Some(mut stream) = open(host, target, name).await else {
        return;
    };
    let _ = stream.write_all(&payload).await;
    let _ = stream.close().await;
    read_response(&mut stream).await;
}

/// Drains up to 64 KiB under the response deadline, discarding the data.
async fn read_response(stream: &mut Stream) {
    let drain = async {
        let mut buf = [0u8; 4096];
        let mut total = 0usize;
        while total < RESPONSE_READ_LIMIT {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
    };
    let _ = timeout(RESPONSE_DEADLINE, drain).await;
}

/// Valid request, then a one-byte-per-second read to pin the victim's
/// write side open.
async fn slow_read(host: &FuzzHost, target: &TargetNode, ctx: &FuzzerContext, name: &str) {
    let Some(mut stream) = open(host, target, name).await else {
        return;
    };
    let payload = build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 1);
    let _ = stream.write_all(&payload).await;
    let _ = stream.close().await;

    let mut buf = [0u8; 1];
    for _ in 0..SLOW_READ_SECONDS {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => sleep(Duration::from_secs(1)).await,
        }
    }
}

/// 50 concurrent valid requests through one host.
async fn stream_burst(host: &Arc<FuzzHost>, target: &TargetNode, ctx: &FuzzerContext) {
    let payloads: Vec<Vec<u8>> = (0..BURST_STREAMS)
        .map(|_| build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 1))
        .collect();

    let tasks = payloads.into_iter().map(|payload| {
        let host = host.clone();
        let target = target.clone();
        async move {
            let Some(mut stream) = open(&host, &target, "exch-stream-burst").await else {
                return;
            };
            let _ = stream.write_all(&payload).await;
            let _ = stream.close().await;
            read_response(&mut stream).await;
        }
    });
    join_all(tasks).await;
}

/// Reads a few bytes of the response then abandons the stream without a
/// clean close. Dropping resets it.
async fn half_read(host: &FuzzHost, target: &TargetNode, ctx: &FuzzerContext, name: &str) {
    let Some(mut stream) = open(host, target, name).await else {
        return;
    };
    let payload = build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 1);
    let _ = stream.write_all(&payload).await;
    let _ = stream.close().await;

    let mut buf = [0u8; 10];
    let _ = timeout(RESPONSE_DEADLINE, stream.read(&mut buf)).await;
    drop(stream);
}

/// Writes a valid request and never closes the write half.
async fn hang_no_close(host: &FuzzHost, target: &TargetNode, ctx: &FuzzerContext, name: &str) {
    let Some(mut stream) = open(host, target, name).await else {
        return;
    };
    let payload = build_exchange_request(&[RawCid::random(&ctx.rng)], 1, 1);
    let _ = stream.write_all(&payload).await;
    // The write half stays open for the full hang window.
    sleep(Duration::from_secs(HANG_SECONDS)).await;
    let _ = stream.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sixteen_attacks_have_distinct_names() {
        let mut names: Vec<&str> = ClientAttack::ALL.iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn boundary_lengths_sit_either_side_of_the_protocol_max() {
        assert_eq!(MAX_REQUEST_LENGTH, 900);
        assert_eq!(MAX_REQUEST_LENGTH + 1, 901);
    }
}
