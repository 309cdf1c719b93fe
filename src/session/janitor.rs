//! Ownership of every resource opened while setting up a session.
//!
//! Resources are released through `Box<Self>`, so a released resource no
//! longer exists and cannot be released a second time.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::CaptureError;

/// A hardware/OS/runtime handle that needs explicit release
pub trait AcquiredResource: Send {
    /// Label used in logs
    fn label(&self) -> String;

    fn release(self: Box<Self>) -> Result<()>;
}

/// Handle returned by [`ResourceJanitor::track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

/// Outcome of [`ResourceJanitor::release_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    pub failed: usize,
}

/// Ordered set of resources for the active session
#[derive(Default)]
pub struct ResourceJanitor {
    resources: Vec<(ResourceId, Box<dyn AcquiredResource>)>,
    next_id: u64,
}

impl ResourceJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, resource: Box<dyn AcquiredResource>) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        debug!("Tracking resource {:?}: {}", id, resource.label());
        self.resources.push((id, resource));
        id
    }

    /// Release a single resource ahead of the rest of the session.
    ///
    /// Returns false if the id is not tracked (already released).
    pub fn release(&mut self, id: ResourceId) -> bool {
        let Some(pos) = self.resources.iter().position(|(rid, _)| *rid == id) else {
            return false;
        };
        let (_, resource) = self.resources.remove(pos);
        release_one(resource);
        true
    }

    /// Release everything in registration order.
    ///
    /// A failing release is logged and does not stop the others.
    pub fn release_all(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.resources.is_empty() {
            return report;
        }

        for (_, resource) in self.resources.drain(..) {
            if release_one(resource) {
                report.released += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            "Released {} resources ({} failed)",
            report.released + report.failed,
            report.failed
        );
        report
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn release_one(resource: Box<dyn AcquiredResource>) -> bool {
    let label = resource.label();
    match resource.release() {
        Ok(()) => {
            debug!("Released {}", label);
            true
        }
        Err(e) => {
            let err = CaptureError::ResourceReleaseFailed {
                resource: label,
                reason: format!("{:#}", e),
            };
            warn!("{}", err);
            false
        }
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            warn!(
                "Janitor dropped with {} live resources, releasing",
                self.resources.len()
            );
            self.release_all();
        }
    }
}

/// Shared handle to the session's janitor.
///
/// The lock is only held for synchronous bookkeeping, never across an await.
#[derive(Clone, Default)]
pub struct JanitorHandle(Arc<Mutex<ResourceJanitor>>);

impl JanitorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResourceJanitor> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&self, resource: Box<dyn AcquiredResource>) -> ResourceId {
        self.lock().track(resource)
    }

    pub fn release(&self, id: ResourceId) -> bool {
        self.lock().release(id)
    }

    pub fn release_all(&self) -> ReleaseReport {
        self.lock().release_all()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: &'static str,
        fail: bool,
        releases: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl AcquiredResource for Probe {
        fn label(&self) -> String {
            self.name.to_string()
        }

        fn release(self: Box<Self>) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.name);
            if self.fail {
                anyhow::bail!("device busy");
            }
            Ok(())
        }
    }

    fn probe(
        name: &'static str,
        fail: bool,
        releases: &Arc<AtomicUsize>,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<Probe> {
        Box::new(Probe {
            name,
            fail,
            releases: Arc::clone(releases),
            order: Arc::clone(order),
        })
    }

    #[test]
    fn test_release_all_in_registration_order() {
        let releases = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut janitor = ResourceJanitor::new();

        janitor.track(probe("mic", false, &releases, &order));
        janitor.track(probe("context", false, &releases, &order));
        janitor.track(probe("tab", false, &releases, &order));

        let report = janitor.release_all();

        assert_eq!(report, ReleaseReport { released: 3, failed: 0 });
        assert_eq!(*order.lock().unwrap(), vec!["mic", "context", "tab"]);
        assert!(janitor.is_empty());
    }

    #[test]
    fn test_failing_release_does_not_block_others() {
        let releases = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut janitor = ResourceJanitor::new();

        janitor.track(probe("a", false, &releases, &order));
        janitor.track(probe("b", true, &releases, &order));
        janitor.track(probe("c", false, &releases, &order));

        let report = janitor.release_all();

        assert_eq!(report.released, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(releases.load(Ordering::SeqCst), 3);
        assert!(janitor.is_empty());
    }

    #[test]
    fn test_release_all_twice_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut janitor = ResourceJanitor::new();
        janitor.track(probe("mic", false, &releases, &order));

        janitor.release_all();
        let second = janitor.release_all();

        assert_eq!(second, ReleaseReport::default());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_single_resource_early() {
        let releases = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut janitor = ResourceJanitor::new();

        janitor.track(probe("mic", false, &releases, &order));
        let video = janitor.track(probe("video", false, &releases, &order));

        assert!(janitor.release(video));
        assert!(!janitor.release(video));
        assert_eq!(janitor.len(), 1);

        janitor.release_all();
        assert_eq!(*order.lock().unwrap(), vec!["video", "mic"]);
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_releases_leftovers() {
        let releases = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let handle = JanitorHandle::new();
            handle.track(probe("mic", false, &releases, &order));
            assert_eq!(handle.len(), 1);
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
