use super::IoContext;
use crate::error::Result;

/// Settings for a new [`IoContext`].
///
/// ```
/// let ctx = arkio::IoContext::builder().event_capacity(64).build()?;
/// # Ok::<(), arkio::ErrorCode>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
  pub(super) event_capacity: usize,
  pub(super) op_capacity: usize,
}

impl Default for Builder {
  fn default() -> Self {
    Self { event_capacity: 256, op_capacity: 64 }
  }
}

impl Builder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Maximum number of readiness events taken from the OS per wait.
  /// Values below one are raised to one.
  pub fn event_capacity(mut self, capacity: usize) -> Self {
    self.event_capacity = capacity.max(1);
    self
  }

  /// Initial capacity of the operation table. The table grows on demand.
  pub fn op_capacity(mut self, capacity: usize) -> Self {
    self.op_capacity = capacity;
    self
  }

  pub fn build(self) -> Result<IoContext> {
    IoContext::with_config(&self)
  }
}
