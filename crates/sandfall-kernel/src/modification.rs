//! Pending user edits batched into the next simulation step.
//!
//! A [`Modification`] never touches the grid directly. Edits are collected
//! in a [`ModificationQueue`] while input is sampled, drained once per step,
//! and handed to the kernel, which performs the actual cell writes in
//! enqueue order.

use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use sandfall_common::{GridPos, QueueError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cell::Material;

/// Default maximum number of pending modifications per step.
pub const DEFAULT_MAX_MODIFICATIONS: usize = 10_000;

/// Brush footprint of a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum BrushShape {
    /// Cells within `radius` (euclidean) of the centre
    #[default]
    Circle = 0,
    /// Cells within `radius` on both axes
    Square = 1,
}

impl BrushShape {
    /// Returns the other shape.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            BrushShape::Circle => BrushShape::Square,
            BrushShape::Square => BrushShape::Circle,
        }
    }

    /// Returns true if the offset `(dx, dy)` from the centre is covered.
    #[must_use]
    pub fn covers(self, dx: f32, dy: f32, radius: f32) -> bool {
        match self {
            BrushShape::Circle => dx * dx + dy * dy <= radius * radius,
            BrushShape::Square => dx.abs() <= radius && dy.abs() <= radius,
        }
    }
}

/// A single pending edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modification {
    /// Brush centre in grid coordinates
    pub pos: GridPos,
    /// Brush radius in cells
    pub radius: f32,
    /// Brush footprint
    pub shape: BrushShape,
    /// Material written into covered cells
    pub material: Material,
}

impl Modification {
    /// Creates a new modification.
    #[must_use]
    pub const fn new(pos: GridPos, radius: f32, shape: BrushShape, material: Material) -> Self {
        Self {
            pos,
            radius,
            shape,
            material,
        }
    }

    /// Returns true if this modification covers cell `(x, y)`.
    ///
    /// Offsets are taken in `f32`, as the step shader does, so a centre far
    /// off the grid cannot overflow.
    #[must_use]
    pub fn covers(&self, x: i32, y: i32) -> bool {
        let dx = x as f32 - self.pos.x as f32;
        let dy = y as f32 - self.pos.y as f32;
        self.shape.covers(dx, dy, self.radius)
    }

    /// Converts to the kernel wire layout.
    #[must_use]
    pub fn to_gpu(&self) -> GpuModification {
        GpuModification {
            x: self.pos.x,
            y: self.pos.y,
            radius: self.radius,
            shape: self.shape as u32,
            material: self.material.id(),
        }
    }
}

/// Kernel wire layout of a modification.
///
/// # Layout (20 bytes, stride 20)
/// ```text
/// ┌─────────┬─────────┬──────────────┬─────────────┬────────────────┐
/// │ x (i32) │ y (i32) │ radius (f32) │ shape (u32) │ material (u32) │
/// └─────────┴─────────┴──────────────┴─────────────┴────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuModification {
    /// Brush centre X
    pub x: i32,
    /// Brush centre Y
    pub y: i32,
    /// Brush radius
    pub radius: f32,
    /// Shape tag (0 = circle, 1 = square)
    pub shape: u32,
    /// Material tag
    pub material: u32,
}

/// Bounded, ordered queue of modifications pending for the next step.
///
/// When full, [`enqueue`](Self::enqueue) rejects the new modification and
/// reports [`QueueError::CapacityExceeded`]; queued entries are kept. Only the
/// first rejection between drains is logged as a warning.
/// The queue is internally locked so a producer on another thread cannot
/// interleave with [`drain_for_step`](Self::drain_for_step).
#[derive(Debug)]
pub struct ModificationQueue {
    pending: Mutex<Vec<Modification>>,
    capacity: usize,
    overflow_logged: AtomicBool,
}

impl Default for ModificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MODIFICATIONS)
    }
}

impl ModificationQueue {
    /// Creates a queue holding at most `capacity` modifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating modification queue (capacity: {capacity})");
        Self {
            pending: Mutex::new(Vec::new()),
            capacity,
            overflow_logged: AtomicBool::new(false),
        }
    }

    /// Appends a modification.
    pub fn enqueue(&self, modification: Modification) -> Result<(), QueueError> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            if self.overflow_logged.swap(true, Ordering::Relaxed) {
                trace!("Modification queue full, edit dropped");
            } else {
                warn!(
                    "Modification queue full ({} pending), rejecting edit at ({}, {})",
                    self.capacity, modification.pos.x, modification.pos.y
                );
            }
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        pending.push(modification);
        Ok(())
    }

    /// Takes every pending modification in enqueue order and empties the queue.
    pub fn drain_for_step(&self) -> Vec<Modification> {
        let drained = std::mem::take(&mut *self.pending.lock());
        self.overflow_logged.store(false, Ordering::Relaxed);
        drained
    }

    /// Discards all pending modifications.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.overflow_logged.store(false, Ordering::Relaxed);
    }

    /// Number of pending modifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Returns whether the next enqueue would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Maximum number of pending modifications.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn brush(x: i32, y: i32) -> Modification {
        Modification::new(GridPos::new(x, y), 1.0, BrushShape::Circle, Material::Sand)
    }

    #[test]
    fn test_gpu_modification_size() {
        assert_eq!(std::mem::size_of::<GpuModification>(), 20);
    }

    #[test]
    fn test_to_gpu() {
        let m = Modification::new(GridPos::new(5, 7), 2.5, BrushShape::Square, Material::Water);
        let gpu = m.to_gpu();
        assert_eq!(gpu.x, 5);
        assert_eq!(gpu.y, 7);
        assert!((gpu.radius - 2.5).abs() < f32::EPSILON);
        assert_eq!(gpu.shape, 1);
        assert_eq!(gpu.material, 2);
    }

    #[test]
    fn test_shape_coverage() {
        let circle = Modification::new(GridPos::new(0, 0), 1.0, BrushShape::Circle, Material::Sand);
        assert!(circle.covers(0, 0));
        assert!(circle.covers(1, 0));
        assert!(!circle.covers(1, 1));

        let square = Modification::new(GridPos::new(0, 0), 1.0, BrushShape::Square, Material::Sand);
        assert!(square.covers(1, 1));
        assert!(square.covers(-1, 1));
        assert!(!square.covers(2, 0));

        assert_eq!(BrushShape::Circle.toggled(), BrushShape::Square);
    }

    #[test]
    fn test_far_off_grid_centre_covers_nothing() {
        for pos in [GridPos::new(i32::MIN, 0), GridPos::new(i32::MAX, i32::MIN)] {
            for shape in [BrushShape::Circle, BrushShape::Square] {
                let m = Modification::new(pos, 64.0, shape, Material::Sand);
                assert!(!m.covers(0, 0));
                assert!(!m.covers(i32::MAX, i32::MAX));
            }
        }
    }

    #[test]
    fn test_drain_preserves_order() {
        let queue = ModificationQueue::new(16);
        for i in 0..5 {
            queue.enqueue(brush(i, 0)).expect("capacity");
        }
        assert_eq!(queue.len(), 5);

        let drained = queue.drain_for_step();
        let xs: Vec<i32> = drained.iter().map(|m| m.pos.x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.drain_for_step().is_empty());
    }

    #[test]
    fn test_capacity_rejects_newest() {
        let queue = ModificationQueue::new(2);
        assert!(queue.enqueue(brush(0, 0)).is_ok());
        assert!(queue.enqueue(brush(1, 0)).is_ok());
        assert!(queue.is_full());
        assert_eq!(
            queue.enqueue(brush(2, 0)),
            Err(QueueError::CapacityExceeded { capacity: 2 })
        );

        let drained = queue.drain_for_step();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].pos.x, 1);
        assert!(queue.enqueue(brush(3, 0)).is_ok());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = ModificationQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_concurrent_enqueue_and_drain() {
        let queue = Arc::new(ModificationQueue::new(10_000));
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        queue.enqueue(brush(t, i)).expect("capacity");
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for producer in producers {
            drained.extend(queue.drain_for_step());
            producer.join().expect("producer thread");
        }
        drained.extend(queue.drain_for_step());

        assert_eq!(drained.len(), 2000);
        // Per-producer order survives interleaving
        for t in 0..4 {
            let ys: Vec<i32> = drained
                .iter()
                .filter(|m| m.pos.x == t)
                .map(|m| m.pos.y)
                .collect();
            assert_eq!(ys, (0..500).collect::<Vec<_>>());
        }
    }
}
