//! Hello protocol attacks: malformed greetings, absurd chain claims, and
//! connection-churn abuse.

use std::time::Duration;

use futures::future::join_all;
use futures::AsyncWriteExt;
use libp2p::Stream;
use tokio::time::sleep;
use tracing::debug;

use crate::context::FuzzerContext;
use crate::discovery::TargetNode;
use crate::host::{FuzzHost, HELLO_PROTOCOL};
use crate::wire::{build_hello_message, RawCid};

const SPAM_HOSTS: usize = 50;
const PARTIAL_HANG_SECONDS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloAttack {
    EmptyTipset,
    HugeTipset,
    InflatedWeight,
    FutureHeight,
    ImmediateDisconnect,
    PartialCbor,
    WrongGenesis,
    SpamStorm,
}

impl HelloAttack {
    pub const ALL: [HelloAttack; 8] = [
        HelloAttack::EmptyTipset,
        HelloAttack::HugeTipset,
        HelloAttack::InflatedWeight,
        HelloAttack::FutureHeight,
        HelloAttack::ImmediateDisconnect,
        HelloAttack::PartialCbor,
        HelloAttack::WrongGenesis,
        HelloAttack::SpamStorm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HelloAttack::EmptyTipset => "hello-empty-tipset",
            HelloAttack::HugeTipset => "hello-huge-tipset",
            HelloAttack::InflatedWeight => "hello-inflated-weight",
            HelloAttack::FutureHeight => "hello-future-height",
            HelloAttack::ImmediateDisconnect => "hello-immediate-disconnect",
            HelloAttack::PartialCbor => "hello-partial-cbor",
            HelloAttack::WrongGenesis => "hello-wrong-genesis",
            HelloAttack::SpamStorm => "hello-spam-storm",
        }
    }

    pub async fn execute(self, ctx: &FuzzerContext) {
        if self == HelloAttack::SpamStorm {
            spam_storm(ctx).await;
            return;
        }

        let host = match ctx.pool.get_for_stream() {
            Ok(host) => host,
            Err(err) => {
                debug!(target: "fuzzer::hello", attack = self.name(), %err, "no host");
                return;
            }
        };
        let target = ctx.pick_target().clone();
        let Some(mut stream) = open(&host, &target, self.name()).await else {
            return;
        };

        match self {
            HelloAttack::EmptyTipset => {
                let payload = build_hello_message(&[], 1, 100, &ctx.genesis_cid());
                let _ = stream.write_all(&payload).await;
                let _ = stream.close().await;
            }
            HelloAttack::HugeTipset => {
                let cids: Vec<RawCid> = (0..50).map(|_| RawCid::random(&ctx.rng)).collect();
                let payload = build_hello_message(&cids, 1, 100, &ctx.genesis_cid());
                let _ = stream.write_all(&payload).await;
                let _ = stream.close().await;
            }
            HelloAttack::InflatedWeight => {
                let payload = build_hello_message(
                    &[RawCid::random(&ctx.rng)],
                    1,
                    i64::MAX as u64,
                    &ctx.genesis_cid(),
                );
                let _ = stream.write_all(&payload).await;
                let _ = stream.close().await;
            }
            HelloAttack::FutureHeight => {
                let payload = build_hello_message(
                    &[RawCid::random(&ctx.rng)],
                    100_000,
                    100,
                    &ctx.genesis_cid(),
                );
                let _ = stream.write_all(&payload).await;
                let _ = stream.close().await;
            }
            HelloAttack::ImmediateDisconnect => {
                let payload =
                    build_hello_message(&[RawCid::random(&ctx.rng)], 1, 100, &ctx.genesis_cid());
                let _ = stream.write_all(&payload).await;
                // Dropping without close resets the stream mid-greeting.
                drop(stream);
            }
            HelloAttack::PartialCbor => {
                let payload =
                    build_hello_message(&[RawCid::random(&ctx.rng)], 1, 100, &ctx.genesis_cid());
                let _ = stream.write_all(&payload[..payload.len() / 2]).await;
                sleep(Duration::from_secs(PARTIAL_HANG_SECONDS)).await;
                let _ = stream.close().await;
            }
            HelloAttack::WrongGenesis => {
                let fake_genesis = RawCid::random(&ctx.rng);
                let payload =
                    build_hello_message(&[RawCid::random(&ctx.rng)], 1, 100, &fake_genesis);
                let _ = stream.write_all(&payload).await;
                let _ = stream.close().await;
            }
            HelloAttack::SpamStorm => unreachable!("dispatched above"),
        }
    }
}

async fn open(host: &FuzzHost, target: &TargetNode, name: &str) -> Option<Stream> {
    match host
        .open_stream(target.peer_id, target.addr.clone(), HELLO_PROTOCOL)
        .await
    {
        Ok(stream) => Some(stream),
        Err(err) => {
            debug!(target: "fuzzer::hello", attack = name, %err, "stream open failed");
            None
        }
    }
}

/// 50 fresh identities greeting the target at once.
async fn spam_storm(ctx: &FuzzerContext) {
    let target = ctx.pick_target().clone();

    // Hosts and payloads are prepared up front; only the network part runs
    // concurrently.
    let mut hosts = Vec::with_capacity(SPAM_HOSTS);
    for _ in 0..SPAM_HOSTS {
        match ctx.pool.get_fresh() {
            Ok(host) => hosts.push(host),
            Err(err) => {
                debug!(target: "fuzzer::hello", %err, "fresh host failed");
                break;
            }
        }
    }
    let payloads: Vec<Vec<u8>> = hosts
        .iter()
        .map(|_| build_hello_message(&[RawCid::random(&ctx.rng)], 1, 100, &ctx.genesis_cid()))
        .collect();

    let tasks = hosts.iter().zip(payloads).map(|(host, payload)| {
        let target = target.clone();
        async move {
            let Some(mut stream) = open(host, &target, "hello-spam-storm").await else {
                return;
            };
            let _ = stream.write_all(&payload).await;
            let _ = stream.close().await;
        }
    });
    join_all(tasks).await;

    for host in hosts {
        host.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_eight_attacks_have_distinct_names() {
        let mut names: Vec<&str> = HelloAttack::ALL.iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 8);
    }
}
