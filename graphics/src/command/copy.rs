//! Copy queue context.

use std::ops::{Deref, DerefMut};

use crate::command::CommandContext;
use crate::error::GraphicsError;

/// A context recording on the copy queue.
///
/// Only barriers between copy states, copies and debug markers are valid on
/// it; everything else is rejected when recorded.
pub struct CopyContext(CommandContext);

impl CopyContext {
    pub(crate) fn new(context: CommandContext) -> Self {
        Self(context)
    }

    /// Submit and return the context to the pool.
    pub fn finish(self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        self.0.finish(wait_for_completion)
    }
}

impl Deref for CopyContext {
    type Target = CommandContext;

    fn deref(&self) -> &CommandContext {
        &self.0
    }
}

impl DerefMut for CopyContext {
    fn deref_mut(&mut self) -> &mut CommandContext {
        &mut self.0
    }
}

impl std::fmt::Debug for CopyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CopyContext").field(&self.0).finish()
    }
}

static_assertions::assert_impl_all!(CopyContext: Send);
