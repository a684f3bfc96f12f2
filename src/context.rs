// ============================================================================
// context.rs — the per-target runtime hand
// ============================================================================
//
// Frozen once constructed by the runtime and passed into every lifecycle
// method a component implements, plus the component constructor itself.
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

/// A component announcing it attached a new output stream. Currently the
/// only event shape; the queue is a forward-looking affordance kept even
/// though nothing consumes it yet.
#[derive(Debug, Clone)]
pub struct EventNewOutputStream {
    pub name: String,
}

pub type EventSender = mpsc::UnboundedSender<EventNewOutputStream>;

#[derive(Clone)]
pub struct Context {
    pub target_name: String,
    /// Directory in which the target file defining this target lives.
    pub cwd: PathBuf,
    /// The project directory from which overrun was invoked.
    pub cwp: PathBuf,
    pub event_queue: Arc<EventSender>,
}
