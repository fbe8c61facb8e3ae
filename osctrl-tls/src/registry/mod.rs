//! Periodically-refreshed, atomically-swapped snapshots of environments and
//! settings. Grounded on the same shape the teacher uses for its status
//! board: readers take a cheap `Arc` clone under a short-held read lock, and
//! a single background task owns the only write lock acquisition.

pub mod env;
pub mod settings;

pub use env::EnvRegistry;
pub use settings::SettingsRegistry;

use std::time::Duration;

/// Default refresh interval used when a `0`-valued setting requests "use the
/// default" (spec.md Design Notes: a `0` interval setting means "do not
/// override the baked-in default", not "refresh continuously").
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

pub(crate) fn refresh_interval(seconds: u64) -> Duration {
    if seconds == 0 {
        DEFAULT_REFRESH_INTERVAL
    } else {
        Duration::from_secs(seconds)
    }
}
