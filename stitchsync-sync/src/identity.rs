//! Identity provider seam.

use stitchsync_types::AuthIdentity;
use tokio::sync::watch;

/// Source of truth for who is signed in.
pub trait IdentitySource: Send + Sync {
    /// The identity right now.
    fn current(&self) -> AuthIdentity;

    /// A change feed, if the provider can push. Otherwise the controller polls
    /// [`current`](IdentitySource::current).
    fn watch(&self) -> Option<watch::Receiver<AuthIdentity>> {
        None
    }
}

/// An identity source driven by the application (e.g. from an auth callback).
#[derive(Debug)]
pub struct IdentityChannel {
    tx: watch::Sender<AuthIdentity>,
    push: bool,
}

impl IdentityChannel {
    /// A source that pushes every change.
    pub fn new(initial: AuthIdentity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, push: true }
    }

    /// A source that only supports polling.
    pub fn polled(initial: AuthIdentity) -> Self {
        Self {
            push: false,
            ..Self::new(initial)
        }
    }

    /// Publishes a new identity.
    pub fn set(&self, identity: AuthIdentity) {
        self.tx.send_replace(identity);
    }
}

impl IdentitySource for IdentityChannel {
    fn current(&self) -> AuthIdentity {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> Option<watch::Receiver<AuthIdentity>> {
        self.push.then(|| self.tx.subscribe())
    }
}
