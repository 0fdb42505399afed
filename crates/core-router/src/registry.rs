//! The frozen task/module tables.
//!
//! Construction flattens the per-task module lists into one task-ordered
//! table: the first task's modules occupy the lowest indices, the next task's
//! follow, and so on. A [`ModuleId`] is an index into that table, which makes
//! producer lookups and ownership checks O(1) and keeps events free of
//! references into the registry.

use std::ops::Range;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::event::EventType;
use crate::module::{EventModule, ModuleId};
use crate::options::{TaskConfig, TaskHandle};

/// Dispatch uses a `u32` bitmask of destination tasks.
pub const MAX_TASKS: usize = 32;

pub(crate) struct TaskEntry {
    pub(crate) name: &'static str,
    pub(crate) handle: TaskHandle,
    pub(crate) queue_capacity: usize,
    /// Indices into the flattened module table.
    pub(crate) modules: Range<usize>,
}

pub(crate) struct ModuleEntry {
    pub(crate) module: Arc<dyn EventModule>,
    /// Index of the owning task.
    pub(crate) task: usize,
}

/// The contiguous range of routable event types.
pub(crate) struct TypeRange {
    first: i32,
    count: usize,
}

impl TypeRange {
    pub(crate) fn contains(&self, event_type: EventType) -> bool {
        let raw = event_type.raw();
        raw >= self.first && ((raw - self.first) as usize) < self.count
    }

    /// The bit index of `event_type` within a subscription row. Callers must
    /// check `contains` first.
    pub(crate) fn bit(&self, event_type: EventType) -> usize {
        (event_type.raw() - self.first) as usize
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }
}

pub(crate) struct Registry {
    tasks: Vec<TaskEntry>,
    modules: Vec<ModuleEntry>,
    types: TypeRange,
}

impl Registry {
    pub(crate) fn build(
        tasks: Vec<TaskConfig>,
        first_event_type: i32,
        num_event_types: usize,
    ) -> Result<Self, ConfigError> {
        if tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        if tasks.len() > MAX_TASKS {
            return Err(ConfigError::TooManyTasks(tasks.len()));
        }
        if num_event_types == 0 {
            return Err(ConfigError::EmptyTypeRange);
        }
        if first_event_type < 0 {
            return Err(ConfigError::NegativeFirstType(first_event_type));
        }
        for (index, task) in tasks.iter().enumerate() {
            if task.modules.is_empty() {
                return Err(ConfigError::EmptyTask(task.name));
            }
            for earlier in &tasks[..index] {
                if earlier.handle == task.handle {
                    return Err(ConfigError::DuplicateTaskHandle(
                        earlier.name,
                        task.name,
                        task.handle,
                    ));
                }
            }
        }

        let mut task_entries = Vec::with_capacity(tasks.len());
        let mut module_entries = Vec::new();
        for (task_index, task) in tasks.into_iter().enumerate() {
            let first_module = module_entries.len();
            for module in task.modules {
                tracing::debug!(
                    target: "router",
                    task = task.name,
                    module = module.name(),
                    id = module_entries.len(),
                    "registered module"
                );
                module_entries.push(ModuleEntry {
                    module,
                    task: task_index,
                });
            }
            task_entries.push(TaskEntry {
                name: task.name,
                handle: task.handle,
                queue_capacity: task.queue_capacity,
                modules: first_module..module_entries.len(),
            });
        }

        Ok(Self {
            tasks: task_entries,
            modules: module_entries,
            types: TypeRange {
                first: first_event_type,
                count: num_event_types,
            },
        })
    }

    pub(crate) fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn num_modules(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn task(&self, index: usize) -> &TaskEntry {
        &self.tasks[index]
    }

    pub(crate) fn tasks(&self) -> impl Iterator<Item = &TaskEntry> {
        self.tasks.iter()
    }

    /// Module indices owned by the task, in delivery order.
    pub(crate) fn task_modules(&self, task: usize) -> Range<usize> {
        self.tasks[task].modules.clone()
    }

    pub(crate) fn is_module(&self, id: ModuleId) -> bool {
        id.index() < self.modules.len()
    }

    pub(crate) fn module_entry(&self, index: usize) -> &ModuleEntry {
        &self.modules[index]
    }

    pub(crate) fn module_name(&self, id: ModuleId) -> &'static str {
        self.modules[id.index()].module.name()
    }

    /// Index of the task owning `id`. Callers must check `is_module` first.
    pub(crate) fn task_of(&self, id: ModuleId) -> usize {
        self.modules[id.index()].task
    }

    pub(crate) fn task_by_handle(&self, handle: TaskHandle) -> Option<usize> {
        self.tasks.iter().position(|task| task.handle == handle)
    }

    pub(crate) fn types(&self) -> &TypeRange {
        &self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use crate::event::EventRef;
    use crate::module::EventDisposition;

    struct Inert;

    impl EventModule for Inert {
        fn name(&self) -> &'static str {
            "inert"
        }

        fn handle(&self, _router: &Router, _event: EventRef) -> EventDisposition {
            EventDisposition::Handled
        }
    }

    fn task(name: &'static str, handle: u64, modules: usize) -> TaskConfig {
        TaskConfig {
            name,
            handle: TaskHandle::new(handle),
            queue_capacity: 4,
            modules: (0..modules)
                .map(|_| Arc::new(Inert) as Arc<dyn EventModule>)
                .collect(),
        }
    }

    #[test]
    fn flattens_modules_in_task_order() {
        let registry =
            Registry::build(vec![task("hi", 1, 2), task("lo", 2, 3)], 0, 4).unwrap();
        assert_eq!(registry.num_modules(), 5);
        assert_eq!(registry.task_modules(0), 0..2);
        assert_eq!(registry.task_modules(1), 2..5);
        assert_eq!(registry.task_of(ModuleId::new(1)), 0);
        assert_eq!(registry.task_of(ModuleId::new(2)), 1);
    }

    #[test]
    fn resolves_tasks_by_handle() {
        let registry =
            Registry::build(vec![task("hi", 7, 1), task("lo", 9, 1)], 0, 1).unwrap();
        assert_eq!(registry.task_by_handle(TaskHandle::new(9)), Some(1));
        assert_eq!(registry.task_by_handle(TaskHandle::new(8)), None);
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(matches!(
            Registry::build(vec![], 0, 1),
            Err(ConfigError::NoTasks)
        ));
        assert!(matches!(
            Registry::build(vec![task("t", 1, 0)], 0, 1),
            Err(ConfigError::EmptyTask("t"))
        ));
        assert!(matches!(
            Registry::build(vec![task("t", 1, 1)], 0, 0),
            Err(ConfigError::EmptyTypeRange)
        ));
        assert!(matches!(
            Registry::build(vec![task("t", 1, 1)], -2, 3),
            Err(ConfigError::NegativeFirstType(-2))
        ));
        assert!(matches!(
            Registry::build(vec![task("a", 1, 1), task("b", 1, 1)], 0, 1),
            Err(ConfigError::DuplicateTaskHandle("a", "b", _))
        ));
        let too_many: Vec<_> = (0..33).map(|i| task("t", i, 1)).collect();
        assert!(matches!(
            Registry::build(too_many, 0, 1),
            Err(ConfigError::TooManyTasks(33))
        ));
    }

    #[test]
    fn type_range_bounds_are_inclusive() {
        let registry = Registry::build(vec![task("t", 1, 1)], 17, 20).unwrap();
        let types = registry.types();
        assert!(!types.contains(EventType::new(16)));
        assert!(types.contains(EventType::new(17)));
        assert!(types.contains(EventType::new(36)));
        assert!(!types.contains(EventType::new(37)));
        assert_eq!(types.bit(EventType::new(17)), 0);
        assert_eq!(types.bit(EventType::new(36)), 19);
    }
}
