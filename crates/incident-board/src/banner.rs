//! Transient operator-facing banners.
//!
//! Failures at the boundary surface here; each banner expires after the
//! configured TTL. Rollbacks of optimistic moves never raise one.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
    pub raised_at: Instant,
}

#[derive(Debug)]
pub struct BannerQueue {
    ttl: Duration,
    banners: Vec<Banner>,
}

impl BannerQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            banners: Vec::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Raise a banner. Expired ones are dropped first, so a queue nobody
    /// reads stays bounded by what the TTL lets through.
    pub fn push(&mut self, kind: BannerKind, message: impl Into<String>, now: Instant) {
        self.prune(now);
        self.banners.push(Banner {
            kind,
            message: message.into(),
            raised_at: now,
        });
    }

    pub fn error(&mut self, message: impl Into<String>, now: Instant) {
        self.push(BannerKind::Error, message, now);
    }

    pub fn info(&mut self, message: impl Into<String>, now: Instant) {
        self.push(BannerKind::Info, message, now);
    }

    /// Drop expired banners and return the rest, oldest first.
    pub fn active(&mut self, now: Instant) -> Vec<Banner> {
        self.prune(now);
        self.banners.clone()
    }

    /// Banners held, expired or not.
    pub fn len(&self) -> usize {
        self.banners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banners.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.banners
            .retain(|b| now.saturating_duration_since(b.raised_at) < ttl);
    }

    pub fn clear(&mut self) {
        self.banners.clear();
    }
}
