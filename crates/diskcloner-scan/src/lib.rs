//! Block device discovery for diskcloner.
//!
//! [`LsblkEnumerator`] lists whole disks through `lsblk`'s JSON output;
//! [`StaticEnumerator`] serves a fixed list for dry runs.

mod enumerator;
mod lsblk;

pub use enumerator::{BoxFuture, DiskEnumerator, StaticEnumerator};
pub use lsblk::{parse_lsblk_json, LsblkEnumerator, DEFAULT_LSBLK_TIMEOUT};
