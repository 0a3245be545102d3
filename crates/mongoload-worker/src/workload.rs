use async_trait::async_trait;

use mongoload_core::Result;

use crate::task::MongoTask;
use crate::worker::MongoWorker;

/// A concrete workload: worker state plus the operations it issues.
///
/// Implementors embed a [`MongoWorker`] and expose it through `base`.
#[async_trait]
pub trait Workload: Send + Sized + 'static {
    fn base(&self) -> &MongoWorker;

    fn base_mut(&mut self) -> &mut MongoWorker;

    /// Called once before the first task; typically provisions collections.
    ///
    /// An error here stops the worker.
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Operations the runner picks from, by weight.
    fn tasks() -> Vec<MongoTask<Self>>;
}
