//! Pool of ephemeral peer identities.
//!
//! Stream protocols (exchange, hello) carry no peer-scoring penalty, so one
//! host is reused indefinitely. Gossip-class protocols charge heavy score
//! per invalid message, so those hosts carry a message budget and rotate
//! through a bounded FIFO pool. Spam and churn attacks take a fresh host
//! per call.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::host::{FuzzHost, HostError};

struct BudgetedHost {
    host: Arc<FuzzHost>,
    remaining: u32,
}

pub struct IdentityPool {
    max_pool: usize,
    stream_host: Mutex<Option<Arc<FuzzHost>>>,
    gossip_hosts: Mutex<Vec<BudgetedHost>>,
}

impl IdentityPool {
    pub fn new(max_pool: usize) -> Self {
        Self {
            max_pool,
            stream_host: Mutex::new(None),
            gossip_hosts: Mutex::new(Vec::new()),
        }
    }

    /// Reusable host for stream protocols.
    pub fn get_for_stream(&self) -> Result<Arc<FuzzHost>, HostError> {
        let mut slot = self.stream_host.lock();
        if let Some(host) = slot.as_ref() {
            return Ok(host.clone());
        }
        let host = Arc::new(FuzzHost::spawn()?);
        debug!(target: "fuzzer::identity", peer = %host.peer_id(), "created stream host");
        *slot = Some(host.clone());
        Ok(host)
    }

    /// Host with remaining gossip budget; rotates to a new identity when
    /// every pooled host is exhausted, evicting FIFO at capacity.
    pub fn get_for_gossip(&self, budget: u32) -> Result<Arc<FuzzHost>, HostError> {
        let mut hosts = self.gossip_hosts.lock();

        if let Some(entry) = hosts.iter_mut().find(|entry| entry.remaining > 0) {
            entry.remaining -= 1;
            return Ok(entry.host.clone());
        }

        if hosts.len() >= self.max_pool {
            let evicted = hosts.remove(0);
            evicted.host.close();
        }

        let host = Arc::new(FuzzHost::spawn()?);
        debug!(
            target: "fuzzer::identity",
            peer = %host.peer_id(),
            budget = budget.saturating_sub(1),
            "created gossip host"
        );
        hosts.push(BudgetedHost {
            host: host.clone(),
            remaining: budget.saturating_sub(1),
        });
        Ok(host)
    }

    /// Always a brand-new identity; the caller owns its lifetime.
    pub fn get_fresh(&self) -> Result<FuzzHost, HostError> {
        FuzzHost::spawn()
    }

    pub fn close_all(&self) {
        if let Some(host) = self.stream_host.lock().take() {
            host.close();
        }
        for entry in self.gossip_hosts.lock().drain(..) {
            entry.host.close();
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.gossip_hosts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_host_is_reused() {
        let pool = IdentityPool::new(4);
        let a = pool.get_for_stream().expect("host");
        let b = pool.get_for_stream().expect("host");
        assert_eq!(a.peer_id(), b.peer_id());
        pool.close_all();
    }

    #[tokio::test]
    async fn gossip_budget_is_consumed_before_rotating() {
        let pool = IdentityPool::new(4);
        let first = pool.get_for_gossip(3).expect("host");
        let second = pool.get_for_gossip(3).expect("host");
        let third = pool.get_for_gossip(3).expect("host");
        // Budget 3 serves three calls from the same identity.
        assert_eq!(first.peer_id(), second.peer_id());
        assert_eq!(second.peer_id(), third.peer_id());

        let fourth = pool.get_for_gossip(3).expect("host");
        assert_ne!(third.peer_id(), fourth.peer_id());
        assert_eq!(pool.pooled(), 2);
        pool.close_all();
    }

    #[tokio::test]
    async fn pool_evicts_fifo_at_capacity() {
        let pool = IdentityPool::new(2);
        let first = pool.get_for_gossip(1).expect("host");
        let _second = pool.get_for_gossip(1).expect("host");
        let _third = pool.get_for_gossip(1).expect("host");
        assert_eq!(pool.pooled(), 2);
        // The oldest identity was evicted; a new one takes its slot.
        let fourth = pool.get_for_gossip(1).expect("host");
        assert_ne!(first.peer_id(), fourth.peer_id());
        pool.close_all();
    }

    #[tokio::test]
    async fn fresh_hosts_are_unique() {
        let pool = IdentityPool::new(2);
        let a = pool.get_fresh().expect("host");
        let b = pool.get_fresh().expect("host");
        assert_ne!(a.peer_id(), b.peer_id());
        a.close();
        b.close();
        pool.close_all();
    }
}
