use std::sync::Arc;

use derive_new::new;

use crate::cache::SlotCache;
use crate::model::StatsSnapshot;
use crate::stats::StatsRepository;

/// Shared state of the stats service.
///
/// The snapshot cache is process-wide and owned here, not ambient: every
/// handler reaches it through this struct, and invalidation happens only on
/// successful vote writes.
#[derive(Debug, Clone, new)]
pub struct App {
    pub stats: StatsRepository,
    pub cache: Arc<SlotCache<StatsSnapshot>>,
}

pub fn create_app(stats: StatsRepository) -> App {
    App {
        stats,
        cache: Arc::new(SlotCache::default()),
    }
}
