//! A small task list with AND-combinator dependencies.
//!
//! Tasks return [`TaskStatus`]; a task that reports `Incomplete` (the
//! receive poll) stays runnable and is re-polled on later sweeps. A task
//! becomes ready once every dependency has completed. Errors abort the run;
//! there is no partial recovery.

use crate::mesh_error::MeshForestError;

/// Outcome of one task invocation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TaskStatus {
    Complete,
    /// Not done yet; poll again later. Only suspending tasks return this.
    Incomplete,
}

/// Identifier of a task within one [`TaskList`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(usize);

type TaskFn<'a, S> = Box<dyn FnMut(&mut S) -> Result<TaskStatus, MeshForestError> + 'a>;

struct Task<'a, S> {
    deps: Vec<TaskId>,
    f: TaskFn<'a, S>,
    done: bool,
}

/// An ordered collection of interdependent tasks over shared state `S`.
pub struct TaskList<'a, S> {
    tasks: Vec<Task<'a, S>>,
}

impl<'a, S> Default for TaskList<'a, S> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<'a, S> TaskList<'a, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task that runs once all of `deps` have completed.
    ///
    /// # Errors
    /// `UnknownTask` if a dependency id was not issued by this list.
    pub fn add_task(
        &mut self,
        deps: &[TaskId],
        f: impl FnMut(&mut S) -> Result<TaskStatus, MeshForestError> + 'a,
    ) -> Result<TaskId, MeshForestError> {
        for d in deps {
            if d.0 >= self.tasks.len() {
                return Err(MeshForestError::UnknownTask(d.0));
            }
        }
        self.tasks.push(Task {
            deps: deps.to_vec(),
            f: Box::new(f),
            done: false,
        });
        Ok(TaskId(self.tasks.len() - 1))
    }

    /// Drive every task to completion, re-polling `Incomplete` tasks.
    ///
    /// # Errors
    /// The first task error, or `UnknownTask` if the dependency graph can
    /// make no progress (a cycle).
    pub fn run(&mut self, state: &mut S) -> Result<(), MeshForestError> {
        loop {
            let mut all_done = true;
            let mut progressed = false;
            for i in 0..self.tasks.len() {
                if self.tasks[i].done {
                    continue;
                }
                let ready = self.tasks[i]
                    .deps
                    .iter()
                    .all(|d| self.tasks[d.0].done);
                if !ready {
                    all_done = false;
                    continue;
                }
                match (self.tasks[i].f)(state)? {
                    TaskStatus::Complete => {
                        self.tasks[i].done = true;
                        progressed = true;
                    }
                    TaskStatus::Incomplete => {
                        all_done = false;
                        // polling counts as progress; the task may suspend
                        // for many sweeps (e.g. waiting on MPI)
                        progressed = true;
                    }
                }
            }
            if all_done {
                return Ok(());
            }
            if !progressed {
                return Err(MeshForestError::UnknownTask(usize::MAX));
            }
        }
    }
}
