//! # Explicit execution context.
//!
//! The task a piece of code is running on behalf of is carried as a plain
//! value, never as ambient global state. A [`ExecutionContext`] is cloned into
//! every thread or async task spawned while executing a task, so submissions
//! made from there still name the right parent.
//!
//! ```text
//! task T running
//!   ├─ ctx.spawn_thread(|ctx| producer.submit_task(Some(&ctx), ..))   parent = T
//!   └─ ctx.spawn(|ctx| async move { producer.submit_task(Some(&ctx), ..) })  parent = T
//!
//! actor A (max_concurrency > 1), creation task C, invocation I
//!   └─ submissions from I                                           parent = C
//! ```
//!
//! Concurrent actor invocations share one execution environment, so their
//! submissions are attributed to the actor's creation task.

use std::future::Future;
use std::thread;

use crate::model::{ActorId, JobId, TaskId};

/// Actor a task executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorBinding {
    pub actor_id: ActorId,
    pub creation_task_id: TaskId,
    pub max_concurrency: u32,
}

/// The task currently executing, captured by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub task_id: TaskId,
    pub job_id: Option<JobId>,
    pub actor: Option<ActorBinding>,
}

impl ExecutionContext {
    pub fn new(task_id: TaskId, job_id: Option<JobId>) -> Self {
        Self {
            task_id,
            job_id,
            actor: None,
        }
    }

    /// Binds the context to an actor.
    pub fn on_actor(mut self, binding: ActorBinding) -> Self {
        self.actor = Some(binding);
        self
    }

    /// Parent recorded for tasks submitted from this context.
    ///
    /// ```
    /// use tasklineage::{ActorBinding, ActorId, ExecutionContext, TaskId};
    ///
    /// let (call, creation) = (TaskId::new(), TaskId::new());
    /// let binding = ActorBinding {
    ///     actor_id: ActorId::new(),
    ///     creation_task_id: creation,
    ///     max_concurrency: 4,
    /// };
    /// let ctx = ExecutionContext::new(call, None).on_actor(binding);
    /// assert_eq!(ctx.submission_parent(), creation);
    /// ```
    pub fn submission_parent(&self) -> TaskId {
        match self.actor {
            Some(actor) if actor.max_concurrency > 1 => actor.creation_task_id,
            _ => self.task_id,
        }
    }

    /// Spawns an OS thread that receives a copy of this context.
    pub fn spawn_thread<F, T>(&self, f: F) -> thread::JoinHandle<T>
    where
        F: FnOnce(ExecutionContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let ctx = *self;
        thread::spawn(move || f(ctx))
    }

    /// Spawns a Tokio task that receives a copy of this context.
    pub fn spawn<F, Fut>(&self, f: F) -> tokio::task::JoinHandle<Fut::Output>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        tokio::spawn(f(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_actor_submits_under_the_invocation() {
        let call = TaskId::new();
        let ctx = ExecutionContext::new(call, None).on_actor(ActorBinding {
            actor_id: ActorId::new(),
            creation_task_id: TaskId::new(),
            max_concurrency: 1,
        });
        assert_eq!(ctx.submission_parent(), call);
    }

    #[test]
    fn thread_sees_spawning_task() {
        let task = TaskId::new();
        let ctx = ExecutionContext::new(task, None);
        let seen = ctx.spawn_thread(|ctx| ctx.submission_parent()).join().unwrap();
        assert_eq!(seen, task);
    }

    #[tokio::test]
    async fn async_task_sees_spawning_task() {
        let task = TaskId::new();
        let ctx = ExecutionContext::new(task, Some(JobId::new()));
        let seen = ctx.spawn(|ctx| async move { ctx.task_id }).await.unwrap();
        assert_eq!(seen, task);
    }
}
