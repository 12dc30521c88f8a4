use super::SpecStore;
use crate::router::RouterSet;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// A store and the routers built from it, published together.
///
/// A request loads one snapshot and keeps it until the response is written,
/// so it never observes routers from one store and documents from another.
#[derive(Debug)]
pub struct Snapshot {
    pub store: Arc<SpecStore>,
    pub routers: Arc<RouterSet>,
}

impl Snapshot {
    /// Build routers for `store`.
    pub fn build(store: SpecStore) -> Self {
        let routers = RouterSet::build(&store);
        Self {
            store: Arc::new(store),
            routers: Arc::new(routers),
        }
    }

    /// Wrap in a shareable, swappable cell.
    pub fn into_shared(self) -> SharedSnapshot {
        Arc::new(ArcSwap::from_pointee(self))
    }
}

/// Process-wide handle to the current snapshot.
///
/// Readers call `load_full()`; hot reload calls `store()` with a new snapshot.
pub type SharedSnapshot = Arc<ArcSwap<Snapshot>>;
