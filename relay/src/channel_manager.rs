//! Channel subscriptions for the relay
//!
//! This module tracks which addresses listen on which session channel:
//! - Subscribe and unsubscribe, keyed by channel and subscriber address
//! - Liveness tracking from any packet a subscriber sends
//! - Timeout sweeps that drop silent subscribers
//! - Per-channel capacity limits
//!
//! The relay never looks inside events when fanning them out; it only needs
//! to know the current subscriber addresses of a channel.

use log::info;
use shared::{PlayerId, SessionCode};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One address listening on a channel
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Client-generated id, used for logging and timeout reports
    pub id: PlayerId,
    /// Where deliveries go
    pub addr: SocketAddr,
    /// Last time we received any packet from this address
    pub last_seen: Instant,
}

impl Subscriber {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing arrived from this subscriber within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Why a subscription was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    ChannelFull,
}

/// Subscriber lists for every open channel
///
/// Subscribing twice from the same address, or with the same id from a new
/// address, updates the existing entry instead of adding a second one, so a
/// client that reconnects is never delivered the same event twice.
pub struct ChannelManager {
    /// Subscribers per channel, in subscription order
    channels: HashMap<SessionCode, Vec<Subscriber>>,
    /// Maximum subscribers on a single channel
    max_subscribers: usize,
    /// Silence after which a subscriber is dropped
    timeout: Duration,
}

impl ChannelManager {
    pub fn new(max_subscribers: usize, timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            max_subscribers,
            timeout,
        }
    }

    /// Adds or refreshes a subscription
    pub fn subscribe(
        &mut self,
        channel: &str,
        subscriber_id: &str,
        addr: SocketAddr,
    ) -> Result<(), SubscribeError> {
        let subscribers = self.channels.entry(channel.to_string()).or_default();

        if let Some(existing) = subscribers
            .iter_mut()
            .find(|s| s.addr == addr || s.id == subscriber_id)
        {
            existing.id = subscriber_id.to_string();
            existing.addr = addr;
            existing.last_seen = Instant::now();
            return Ok(());
        }

        if subscribers.len() >= self.max_subscribers {
            if subscribers.is_empty() {
                self.channels.remove(channel);
            }
            return Err(SubscribeError::ChannelFull);
        }

        info!("{} subscribed to {} from {}", subscriber_id, channel, addr);
        subscribers.push(Subscriber::new(subscriber_id.to_string(), addr));
        Ok(())
    }

    /// Removes the subscription of `addr`. Returns true if one existed.
    ///
    /// Channels without subscribers are dropped.
    pub fn unsubscribe(&mut self, channel: &str, addr: SocketAddr) -> bool {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.addr != addr);
        let removed = subscribers.len() != before;
        if removed {
            info!("{} unsubscribed from {}", addr, channel);
        }
        if subscribers.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    /// Marks every subscription of `addr` as alive
    pub fn touch(&mut self, addr: SocketAddr) {
        let now = Instant::now();
        for subscriber in self.channels.values_mut().flatten() {
            if subscriber.addr == addr {
                subscriber.last_seen = now;
            }
        }
    }

    pub fn is_subscribed(&self, channel: &str, addr: SocketAddr) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|subs| subs.iter().any(|s| s.addr == addr))
    }

    /// Current delivery addresses for a channel, in subscription order
    pub fn subscriber_addrs(&self, channel: &str) -> Vec<SocketAddr> {
        self.channels
            .get(channel)
            .map(|subs| subs.iter().map(|s| s.addr).collect())
            .unwrap_or_default()
    }

    /// Drops subscribers that went silent
    ///
    /// Returns `(channel, subscriber_id)` for every removal so the caller
    /// can clean up lobbies whose channel emptied.
    pub fn check_timeouts(&mut self) -> Vec<(SessionCode, PlayerId)> {
        let mut timed_out = Vec::new();

        for (channel, subscribers) in self.channels.iter_mut() {
            subscribers.retain(|s| {
                if s.is_timed_out(self.timeout) {
                    info!("{} on {} timed out", s.id, channel);
                    timed_out.push((channel.clone(), s.id.clone()));
                    false
                } else {
                    true
                }
            });
        }
        self.channels.retain(|_, subs| !subs.is_empty());

        timed_out
    }

    pub fn remove_channel(&mut self, channel: &str) -> bool {
        self.channels.remove(channel).is_some()
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channel_len(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Number of open channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn manager() -> ChannelManager {
        ChannelManager::new(4, Duration::from_secs(10))
    }

    #[test]
    fn test_subscribe_and_fan_out_addresses() {
        let mut channels = manager();
        channels.subscribe("WXYZ", "host", addr(9000)).unwrap();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();
        channels.subscribe("ABCD", "bo", addr(9002)).unwrap();

        assert_eq!(channels.subscriber_addrs("WXYZ"), vec![addr(9000), addr(9001)]);
        assert_eq!(channels.subscriber_addrs("ABCD"), vec![addr(9002)]);
        assert!(channels.subscriber_addrs("NONE").is_empty());
        assert_eq!(channels.len(), 2);
    }

    #[test]
    fn test_resubscribe_does_not_duplicate() {
        let mut channels = manager();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();
        assert_eq!(channels.channel_len("WXYZ"), 1);

        // Same id from a new port replaces the old address
        channels.subscribe("WXYZ", "ana", addr(9005)).unwrap();
        assert_eq!(channels.subscriber_addrs("WXYZ"), vec![addr(9005)]);
    }

    #[test]
    fn test_channel_capacity() {
        let mut channels = ChannelManager::new(2, Duration::from_secs(10));
        channels.subscribe("WXYZ", "a", addr(1)).unwrap();
        channels.subscribe("WXYZ", "b", addr(2)).unwrap();
        assert_eq!(
            channels.subscribe("WXYZ", "c", addr(3)),
            Err(SubscribeError::ChannelFull)
        );
        // Known subscribers can still refresh
        assert!(channels.subscribe("WXYZ", "a", addr(1)).is_ok());
    }

    #[test]
    fn test_unsubscribe_drops_empty_channel() {
        let mut channels = manager();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();

        assert!(channels.unsubscribe("WXYZ", addr(9001)));
        assert!(!channels.has_channel("WXYZ"));
        assert!(!channels.unsubscribe("WXYZ", addr(9001)));
    }

    #[test]
    fn test_is_subscribed() {
        let mut channels = manager();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();
        assert!(channels.is_subscribed("WXYZ", addr(9001)));
        assert!(!channels.is_subscribed("WXYZ", addr(9002)));
        assert!(!channels.is_subscribed("ABCD", addr(9001)));
    }

    #[test]
    fn test_subscriber_timeout() {
        let mut subscriber = Subscriber::new("ana".to_string(), addr(9001));
        assert!(!subscriber.is_timed_out(Duration::from_secs(1)));

        subscriber.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(subscriber.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_check_timeouts_removes_silent_subscribers() {
        let mut channels = ChannelManager::new(4, Duration::from_secs(1));
        channels.subscribe("WXYZ", "host", addr(9000)).unwrap();
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();

        if let Some(subs) = channels.channels.get_mut("WXYZ") {
            subs[1].last_seen = Instant::now() - Duration::from_secs(5);
        }

        let timed_out = channels.check_timeouts();
        assert_eq!(timed_out, vec![("WXYZ".to_string(), "ana".to_string())]);
        assert_eq!(channels.subscriber_addrs("WXYZ"), vec![addr(9000)]);
    }

    #[test]
    fn test_touch_refreshes_all_channels() {
        let mut channels = ChannelManager::new(4, Duration::from_secs(1));
        channels.subscribe("WXYZ", "ana", addr(9001)).unwrap();
        channels.subscribe("ABCD", "ana", addr(9001)).unwrap();

        for subs in channels.channels.values_mut() {
            subs[0].last_seen = Instant::now() - Duration::from_secs(5);
        }
        channels.touch(addr(9001));

        assert!(channels.check_timeouts().is_empty());
        assert_eq!(channels.len(), 2);
    }
}
