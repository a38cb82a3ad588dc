//! Shared-memory-backed regions that carry one edge's tensor.
//!
//! A region is named, fixed-size, and fixed-shape. Exactly one plugin
//! writes to it (the edge's producer); any number of plugins may read it
//! (the edge's consumers, after fan-out). The mutex exists to stop a reader
//! observing a torn write — within a single process the runner is
//! single-threaded so contention is only theoretical, but regions are
//! OS-level shared memory and may in principle be attached from another
//! process.

use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use shared_memory::{Shmem, ShmemConf, ShmemError};

use crate::error::{Result, TrnxError};
use crate::port::{ElemType, PortDescriptor, Shape, Tensor};

/// Most platforms cap shared-memory object names well below this; names
/// longer than it are hashed (see [`region_os_name`]).
const MAX_OS_NAME_LEN: usize = 30;

/// Derive the deterministic region name for a producer output:
/// `"<producer_class>_<output_port>"`.
pub fn region_name(producer_class: &str, output_port: &str) -> String {
    format!("{producer_class}_{output_port}")
}

/// Map a logical region name to the name actually used for the OS shared
/// memory object. Names matching `^[A-Za-z0-9_]+$` and within the platform
/// length budget pass through unchanged; oversized names are replaced with
/// a short hash so platforms with strict length limits (e.g. macOS) still
/// work. Callers that need the original name for diagnostics keep it
/// alongside in [`crate::graph::Graph`]'s region name table.
pub fn region_os_name(logical_name: &str) -> String {
    if logical_name.len() <= MAX_OS_NAME_LEN {
        return logical_name.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(logical_name.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("trnx_{hex}")
}

struct Inner {
    /// `None` once `unlink()` has run. Held inside the same mutex that
    /// guards reads/writes rather than a bare `Shmem` so that dropping it
    /// early (forcing the OS object to go away now, not whenever every
    /// `SharedRegion` clone across every plugin binding happens to be
    /// dropped) is a single atomic swap.
    state: Mutex<Option<Shmem>>,
    unread_write: std::sync::atomic::AtomicBool,
}

// Safety: `Shmem` wraps a raw mapping that is `Send` across threads; all
// access to its bytes goes through `Inner::state`.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// A named, mutex-guarded shared-memory region backing exactly one edge (or
/// one fanned-out output).
#[derive(Clone)]
pub struct SharedRegion {
    name: String,
    shape: Shape,
    elem_type: ElemType,
    inner: Arc<Inner>,
}

impl SharedRegion {
    /// Create, or attach to, the OS shared-memory object for `name`. If a
    /// region with that name already exists in the OS it is attached to
    /// (and left with whatever contents it already has); otherwise it is
    /// created and zero-initialized.
    pub fn create(name: &str, shape: Shape, elem_type: ElemType) -> Result<Self> {
        let descriptor = PortDescriptor::new(shape.clone(), elem_type);
        let size = descriptor.size_bytes().max(1);
        let os_name = region_os_name(name);

        let (shmem, created) = match ShmemConf::new().size(size).os_id(&os_name).create() {
            Ok(shmem) => (shmem, true),
            Err(ShmemError::MappingIdExists) => {
                let shmem = ShmemConf::new().os_id(&os_name).open().map_err(|e| {
                    TrnxError::RegionAllocationFailed {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                (shmem, false)
            }
            Err(e) => {
                return Err(TrnxError::RegionAllocationFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if created {
            // Safety: we just created this mapping and hold the only
            // handle to it; zeroing `size` bytes is in-bounds.
            unsafe {
                std::ptr::write_bytes(shmem.as_ptr(), 0, size);
            }
        }

        tracing::debug!(region = %name, os_name = %os_name, size, created, "shared region ready");

        Ok(Self {
            name: name.to_string(),
            shape,
            elem_type,
            inner: Arc::new(Inner {
                state: Mutex::new(Some(shmem)),
                unread_write: std::sync::atomic::AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn elem_type(&self) -> ElemType {
        self.elem_type
    }

    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::new(self.shape.clone(), self.elem_type)
    }

    /// Write `tensor` into the region. Fails with `ShapeMismatch` if the
    /// tensor's shape or element type differs from the region's.
    pub fn write(&self, tensor: &Tensor) -> Result<()> {
        let expected = self.descriptor();
        if tensor.descriptor() != &expected {
            return Err(TrnxError::ShapeMismatch {
                expected: expected.to_string(),
                actual: tensor.descriptor().to_string(),
            });
        }

        let guard = self.inner.state.lock();
        let shmem = guard.as_ref().expect("region was already unlinked");
        let bytes = tensor.as_bytes();
        // Safety: `bytes.len()` equals the region's size (checked above),
        // and we hold the mutex across the whole copy.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), shmem.as_ptr(), bytes.len());
        }
        drop(guard);
        self.inner
            .unread_write
            .store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Read the region's current contents as a freshly allocated tensor.
    /// Readers never observe a torn write.
    pub fn read(&self) -> Tensor {
        let descriptor = self.descriptor();
        let size = descriptor.size_bytes().max(1);
        let guard = self.inner.state.lock();
        let shmem = guard.as_ref().expect("region was already unlinked");
        let mut bytes = vec![0u8; size];
        // Safety: `size` is the region's allocated size; we hold the
        // mutex across the whole copy.
        unsafe {
            std::ptr::copy_nonoverlapping(shmem.as_ptr(), bytes.as_mut_ptr(), size);
        }
        drop(guard);
        self.inner
            .unread_write
            .store(false, std::sync::atomic::Ordering::Relaxed);
        Tensor::from_bytes(descriptor, bytes)
    }

    /// Whether a write has landed since the last read. Not consulted by the
    /// execution loop — exposed purely for introspection/diagnostics.
    pub fn has_unread_write(&self) -> bool {
        self.inner
            .unread_write
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Detach this region from the process without removing the OS object.
    /// A no-op beyond dropping the handle: the underlying `Shmem` detaches
    /// on drop, and `Arc` reference counting means other clones (other
    /// consumers of a fanned-out output) keep it mapped until they, too,
    /// are dropped.
    pub fn close(self) {
        drop(self);
    }

    /// Remove the OS-level shared-memory object. Idempotent: unlinking an
    /// already-unlinked region is a no-op, not an error.
    ///
    /// `shared_memory::Shmem` unlinks the underlying OS object on drop for
    /// whichever handle created the mapping (and simply detaches for one
    /// that only attached to an existing mapping). Dropping the `Shmem`
    /// here, rather than waiting for every `SharedRegion` clone across
    /// every plugin binding to fall out of scope naturally, is what makes
    /// unlinking happen now instead of whenever the graph itself is
    /// dropped — and it's portable, unlike reaching into the filesystem
    /// for a platform-specific shared-memory path.
    pub fn unlink(&self) {
        self.inner.state.lock().take();
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("elem_type", &self.elem_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "trnx_test_{tag}_{}",
            std::process::id().wrapping_add(line!() as u32)
        )
    }

    #[test]
    fn region_name_follows_deterministic_rule() {
        assert_eq!(region_name("Alpha", "data"), "Alpha_data");
    }

    #[test]
    fn short_names_pass_through_unchanged() {
        assert_eq!(region_os_name("Alpha_data"), "Alpha_data");
    }

    #[test]
    fn oversized_names_are_hashed() {
        let long = "A".repeat(100);
        let os_name = region_os_name(&long);
        assert!(os_name.len() < long.len());
        assert!(os_name.starts_with("trnx_"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let region = SharedRegion::create(
            &unique_name("roundtrip"),
            Shape::new(vec![3]),
            ElemType::F64,
        )
        .unwrap();
        let tensor = Tensor::from_f64(Shape::new(vec![3]), &[1.0, 2.0, 3.0]);
        region.write(&tensor).unwrap();
        let read = region.read();
        assert_eq!(read.as_f64(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn write_rejects_shape_mismatch() {
        let region = SharedRegion::create(
            &unique_name("shapemismatch"),
            Shape::new(vec![3]),
            ElemType::F64,
        )
        .unwrap();
        let tensor = Tensor::from_f64(Shape::new(vec![2]), &[1.0, 2.0]);
        let err = region.write(&tensor).unwrap_err();
        assert_eq!(err.code(), "shape_mismatch");
    }

    #[test]
    fn fresh_region_reads_zeroed() {
        let region = SharedRegion::create(
            &unique_name("zeroed"),
            Shape::new(vec![2]),
            ElemType::F64,
        )
        .unwrap();
        assert_eq!(region.read().as_f64(), vec![0.0, 0.0]);
    }

    #[test]
    fn unread_write_flag_tracks_write_and_read() {
        let region = SharedRegion::create(
            &unique_name("unread"),
            Shape::new(vec![1]),
            ElemType::F64,
        )
        .unwrap();
        assert!(!region.has_unread_write());
        region
            .write(&Tensor::from_f64(Shape::new(vec![1]), &[5.0]))
            .unwrap();
        assert!(region.has_unread_write());
        region.read();
        assert!(!region.has_unread_write());
    }

    #[test]
    fn unlink_is_idempotent() {
        let region = SharedRegion::create(&unique_name("unlink"), Shape::new(vec![1]), ElemType::F64).unwrap();
        region.unlink();
        region.unlink();
    }

    #[test]
    #[should_panic(expected = "already unlinked")]
    fn reading_after_unlink_panics() {
        let region = SharedRegion::create(&unique_name("unlinkread"), Shape::new(vec![1]), ElemType::F64).unwrap();
        region.unlink();
        region.read();
    }

    #[test]
    fn clones_share_the_same_backing_region() {
        let region = SharedRegion::create(
            &unique_name("shared"),
            Shape::new(vec![1]),
            ElemType::F64,
        )
        .unwrap();
        let clone = region.clone();
        region
            .write(&Tensor::from_f64(Shape::new(vec![1]), &[9.0]))
            .unwrap();
        assert_eq!(clone.read().as_f64(), vec![9.0]);
    }
}
