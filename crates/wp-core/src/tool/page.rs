//! The live page shared by actions, tools and the extractor

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::dom::{ExtractionError, PageExtractor, Snapshot};
use crate::driver::BrowserDriver;

/// Driver, extractor and latest snapshot of the single browser page.
///
/// The page lock is held for writing by extraction and by actions that
/// mutate or navigate, and for reading by read-only actions and by tools
/// that need the page.
pub struct PageContext {
    driver: Arc<dyn BrowserDriver>,
    extractor: PageExtractor,
    lock: Arc<RwLock<()>>,
    current: Option<Arc<Snapshot>>,
}

impl PageContext {
    pub fn new(driver: Arc<dyn BrowserDriver>, extractor: PageExtractor) -> Self {
        Self {
            driver,
            extractor,
            lock: Arc::new(RwLock::new(())),
            current: None,
        }
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Latest snapshot, if any has been taken
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    pub(crate) fn lock(&self) -> &Arc<RwLock<()>> {
        &self.lock
    }

    /// Extract a fresh snapshot under the page write lock
    pub async fn observe(&mut self) -> Result<Arc<Snapshot>, ExtractionError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.write().await;

        let snapshot = self.extractor.extract(self.driver.as_ref()).await?;
        self.current = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Forget element identities and the current snapshot
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.current = None;
    }
}
