//! The subscription tables.
//!
//! Two bitmaps track interest in event types. Module rows are the source of
//! truth and are consulted at delivery time, which is what makes
//! unsubscription instantaneous: an event already queued to a task is simply
//! skipped for a module whose bit has been cleared. Task rows cache the OR of
//! the owning task's module rows so `send` can select destination tasks with
//! one bit test per task; they are mutated from whichever task subscribes, so
//! they always use cross-thread bit ops.

use std::ops::Range;

use crate::bitmap::BitMatrix;

pub(crate) struct SubscriptionMatrix {
    /// One row per module. Written only by the module's owning task.
    module_rows: BitMatrix,
    /// One row per task: the cached OR of that task's module rows.
    task_rows: BitMatrix,
}

impl SubscriptionMatrix {
    pub(crate) fn new(num_modules: usize, num_tasks: usize, num_types: usize) -> Self {
        Self {
            module_rows: BitMatrix::new(num_modules, num_types),
            task_rows: BitMatrix::new(num_tasks, num_types),
        }
    }

    pub(crate) fn subscribe(&self, module: usize, task: usize, bit: usize) {
        self.module_rows.set(module, bit);
        self.task_rows.set(task, bit);
    }

    /// Clears the module bit, then drops the task bit if no sibling module in
    /// `task_modules` still subscribes. The recompute may race with a sibling
    /// subscribing from another context; the task row uses atomic ops so the
    /// outcome is one of the two serialized orders.
    pub(crate) fn unsubscribe(
        &self,
        module: usize,
        task: usize,
        task_modules: Range<usize>,
        bit: usize,
    ) {
        self.module_rows.clear_local(module, bit);
        let any_subscriber = task_modules.into_iter().any(|m| self.module_rows.test_local(m, bit));
        if !any_subscriber {
            self.task_rows.clear(task, bit);
        }
    }

    /// Delivery-time check; relaxed because only the owning task writes the
    /// row and delivery runs in that task.
    pub(crate) fn module_subscribed(&self, module: usize, bit: usize) -> bool {
        self.module_rows.test_local(module, bit)
    }

    pub(crate) fn task_subscribed(&self, task: usize, bit: usize) -> bool {
        self.task_rows.test(task, bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_sets_module_and_task_bits() {
        let matrix = SubscriptionMatrix::new(3, 2, 8);
        matrix.subscribe(1, 0, 5);
        assert!(matrix.module_subscribed(1, 5));
        assert!(matrix.task_subscribed(0, 5));
        assert!(!matrix.module_subscribed(0, 5));
        assert!(!matrix.task_subscribed(1, 5));
    }

    #[test]
    fn subscribe_then_unsubscribe_is_a_no_op_on_state() {
        let matrix = SubscriptionMatrix::new(2, 1, 4);
        matrix.subscribe(0, 0, 2);
        matrix.unsubscribe(0, 0, 0..2, 2);
        assert!(!matrix.module_subscribed(0, 2));
        assert!(!matrix.task_subscribed(0, 2));
    }

    #[test]
    fn task_bit_survives_while_a_sibling_subscribes() {
        let matrix = SubscriptionMatrix::new(2, 1, 4);
        matrix.subscribe(0, 0, 1);
        matrix.subscribe(1, 0, 1);
        matrix.unsubscribe(0, 0, 0..2, 1);
        assert!(!matrix.module_subscribed(0, 1));
        assert!(matrix.task_subscribed(0, 1));
        matrix.unsubscribe(1, 0, 0..2, 1);
        assert!(!matrix.task_subscribed(0, 1));
    }

    #[test]
    fn unsubscribing_one_type_leaves_others() {
        let matrix = SubscriptionMatrix::new(1, 1, 8);
        matrix.subscribe(0, 0, 3);
        matrix.subscribe(0, 0, 6);
        matrix.unsubscribe(0, 0, 0..1, 3);
        assert!(!matrix.module_subscribed(0, 3));
        assert!(matrix.module_subscribed(0, 6));
        assert!(matrix.task_subscribed(0, 6));
    }
}
