//! Host-memory backend.
//!
//! Executes everything on the CPU. Used as the reference backend in tests and
//! for CPU-only kernels. Keeps a ledger of allocations and releases so
//! ownership rules can be checked.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use super::DeviceBackend;
use crate::error::{DeviceError, DeviceResult};

/// Allocation handle for [`HostDevice`]. Clones share the same memory.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    id: u64,
    label: Rc<str>,
    data: Rc<RefCell<Vec<u8>>>,
}

impl HostBuffer {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: Cell<u64>,
    live: RefCell<BTreeSet<u64>>,
    releases: Cell<usize>,
    double_releases: Cell<usize>,
    /// Remaining successful allocations before one is refused.
    allocation_budget: Cell<Option<usize>>,
}

/// Host-memory [`DeviceBackend`].
///
/// Clones share one ledger.
#[derive(Debug, Clone, Default)]
pub struct HostDevice {
    ledger: Rc<Ledger>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses every allocation after the next `count` succeed.
    pub fn fail_allocations_after(&self, count: usize) {
        self.ledger.allocation_budget.set(Some(count));
    }

    /// Allocations not yet released.
    pub fn live_count(&self) -> usize {
        self.ledger.live.borrow().len()
    }

    /// Successful allocations so far.
    pub fn allocation_count(&self) -> usize {
        self.ledger.next_id.get() as usize
    }

    pub fn release_count(&self) -> usize {
        self.ledger.releases.get()
    }

    /// Releases of buffers that were already released.
    pub fn double_releases(&self) -> usize {
        self.ledger.double_releases.get()
    }

    /// Creates a caller-owned buffer from typed data.
    ///
    /// The returned buffer is not released through the ledger unless the
    /// caller does so explicitly; it models memory owned outside the store.
    pub fn buffer_from<T: bytemuck::Pod>(&self, label: &str, data: &[T]) -> DeviceResult<HostBuffer> {
        self.create_buffer_init(label, bytemuck::cast_slice(data))
    }

    fn allocate(&self, label: &str, data: Vec<u8>) -> DeviceResult<HostBuffer> {
        if let Some(budget) = self.ledger.allocation_budget.get() {
            if budget == 0 {
                return Err(DeviceError::Allocation {
                    label: label.to_owned(),
                    size: data.len() as u64,
                    reason: "host allocation budget exhausted".to_owned(),
                });
            }
            self.ledger.allocation_budget.set(Some(budget - 1));
        }

        let id = self.ledger.next_id.get();
        self.ledger.next_id.set(id + 1);
        self.ledger.live.borrow_mut().insert(id);

        Ok(HostBuffer {
            id,
            label: Rc::from(label),
            data: Rc::new(RefCell::new(data)),
        })
    }
}

impl DeviceBackend for HostDevice {
    type Buffer = HostBuffer;

    fn name(&self) -> &str {
        "host"
    }

    fn create_buffer_init(&self, label: &str, contents: &[u8]) -> DeviceResult<HostBuffer> {
        self.allocate(label, contents.to_vec())
    }

    fn create_buffer(&self, label: &str, size: u64) -> DeviceResult<HostBuffer> {
        self.allocate(label, vec![0u8; size as usize])
    }

    fn write_buffer(&self, buffer: &HostBuffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let mut dst = buffer.data.borrow_mut();
        let start = offset as usize;
        let end = start + data.len();
        if end > dst.len() {
            return Err(DeviceError::Upload {
                label: buffer.label.to_string(),
                size: data.len() as u64,
                reason: format!("write of [{start}, {end}) past end ({} bytes)", dst.len()),
            });
        }
        dst[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &HostBuffer) -> DeviceResult<Vec<u8>> {
        Ok(buffer.data.borrow().clone())
    }

    fn buffer_size(&self, buffer: &HostBuffer) -> u64 {
        buffer.data.borrow().len() as u64
    }

    fn release(&self, buffer: &HostBuffer) {
        if self.ledger.live.borrow_mut().remove(&buffer.id) {
            self.ledger.releases.set(self.ledger.releases.get() + 1);
        } else {
            log::error!("buffer `{}` ({}) released twice", buffer.label, buffer.id);
            self.ledger
                .double_releases
                .set(self.ledger.double_releases.get() + 1);
        }
    }
}
