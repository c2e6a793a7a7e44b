//! One-shot cancellation token shared between a watch subscription and
//! whoever armed it.
//!
//! The token ends up in the "done" state exactly once: either it is
//! cancelled by the owner, or it is claimed by the event that fires. Only
//! the first of the two wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable flag that can be cancelled or claimed once.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    done: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, unclaimed token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Whether the token was cancelled or already claimed.
    pub fn is_cancelled(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Atomically claim the token.
    ///
    /// Returns `true` only for the first caller, and only if the token has
    /// not been cancelled.
    pub fn claim(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_claim_succeeds_once() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.claim());
        assert!(!other.claim());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_claim_after_cancel_fails() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!token.claim());
    }

    #[test]
    fn test_claim_races_across_threads() {
        let token = CancellationToken::new();
        let winners: usize = (0..8)
            .map(|_| {
                let token = token.clone();
                std::thread::spawn(move || token.claim())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }
}
