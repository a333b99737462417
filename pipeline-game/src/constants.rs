//! Centralized constants for the progression engine.
//!
//! Storage keys and the sentinel marker are part of the persisted format;
//! changing them orphans existing saves.

// Persisted snapshot keys --------------------------------------------------
pub const KEY_PANEL: &str = "panel";
pub const KEY_HISTORY: &str = "history";
pub const KEY_STATS: &str = "stats";
pub const KEY_CLASSES: &str = "classes";

/// Every key the persistence layer owns, in write order.
pub const SNAPSHOT_KEYS: [&str; 4] = [KEY_PANEL, KEY_HISTORY, KEY_STATS, KEY_CLASSES];

// Trait conventions --------------------------------------------------------
/// Trait keys starting with this marker are internal bookkeeping.
pub const HIDDEN_KEY_PREFIX: char = '$';

// Transition timing --------------------------------------------------------
pub const DEFAULT_TRANSITION_DELAY_MS: u64 = 500;
pub const MAX_TRANSITION_DELAY_MS: u64 = 60_000;

// Notifications ------------------------------------------------------------
pub const MSG_NEXT_NODE_UNAVAILABLE: &str =
    "Could not load the next node. Please reload and try again.";

// RNG stream domains -------------------------------------------------------
pub(crate) const RNG_DOMAIN_HOOKS: &[u8] = b"pipeline-hooks";
