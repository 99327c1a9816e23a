//! Marker trait for values carried through process state.
//!
//! Process nodes are re-entered many times: a suspended node is offered every
//! incoming event, replay rebuilds it from scratch, and `both` keeps the node of
//! an idle branch around while the other branch advances. Domain state and step
//! results therefore have to be cheap to copy and safe to move between threads.

/// Values that can live inside a `ProcessState` (domain state, step results,
/// instance identity).
///
/// ## Design Constraints
///
/// - **Clone**: a node may be resumed more than once, each resume gets its own copy
/// - **Send + Sync**: transitions are built inside effects running on a
///   multi-threaded executor
/// - **'static**: transition closures own everything they capture
///
/// The trait is blanket-implemented; it only exists to keep bounds readable.
pub trait ProcessData: Clone + Send + Sync + 'static {}

impl<T> ProcessData for T where T: Clone + Send + Sync + 'static {}
