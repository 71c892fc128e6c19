use std::sync::Arc;
use std::time::Instant;

use crate::actions::VoteActions;
use crate::composer::Composer;
use crate::contract::ContractGateway;
use crate::reconciler::Reconciler;
use crate::wallet::{WalletBridge, WalletProvider};

pub struct AppState<P, G> {
    pub wallet: Arc<WalletBridge<P>>,
    pub reconciler: Arc<Reconciler<G>>,
    pub composer: Arc<Composer<G>>,
    pub actions: Arc<VoteActions<G>>,
    pub start_time: Instant,
}

impl<P: WalletProvider, G: ContractGateway> AppState<P, G> {
    pub fn new(wallet: Arc<WalletBridge<P>>, reconciler: Arc<Reconciler<G>>) -> Self {
        let composer = Arc::new(Composer::new(Arc::clone(&reconciler)));
        let actions = Arc::new(VoteActions::new(Arc::clone(&reconciler)));
        Self {
            wallet,
            reconciler,
            composer,
            actions,
            start_time: Instant::now(),
        }
    }
}

// Derived Clone would demand `P: Clone` and `G: Clone`.
impl<P, G> Clone for AppState<P, G> {
    fn clone(&self) -> Self {
        Self {
            wallet: Arc::clone(&self.wallet),
            reconciler: Arc::clone(&self.reconciler),
            composer: Arc::clone(&self.composer),
            actions: Arc::clone(&self.actions),
            start_time: self.start_time,
        }
    }
}
