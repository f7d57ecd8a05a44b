//! The disk enumeration interface.

use std::future::Future;
use std::pin::Pin;

use diskcloner_core::{DiskInfo, EnumerationError};

/// Boxed future returned by enumerators.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lists the block devices that can be used as clone endpoints.
///
/// Enumeration never touches the operation controller; callers refresh their
/// device list on their own schedule.
pub trait DiskEnumerator: Send + Sync {
    /// Short name of the enumeration backend.
    fn name(&self) -> &'static str;

    /// List whole disks.
    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DiskInfo>, EnumerationError>>;
}

/// Enumerator returning a fixed list, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    disks: Vec<DiskInfo>,
}

impl StaticEnumerator {
    pub fn new(disks: Vec<DiskInfo>) -> Self {
        Self { disks }
    }
}

impl DiskEnumerator for StaticEnumerator {
    fn name(&self) -> &'static str {
        "static"
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DiskInfo>, EnumerationError>> {
        let disks = self.disks.iter().filter(|d| d.is_disk()).cloned().collect();
        Box::pin(async move { Ok(disks) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_enumerator_skips_non_disks() {
        let enumerator = StaticEnumerator::new(vec![
            DiskInfo::new("sda", 1 << 30, "disk"),
            DiskInfo::new("loop0", 4096, "loop"),
        ]);

        let disks = enumerator.enumerate().await.unwrap();
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].id, "/dev/sda");
    }
}
