//! Concurrent graph construction.
//!
//! Workers pop candidates off a shared stack, build their graphs and run a
//! per-graph step; results stream back to the calling thread through a
//! bounded channel, so at most a few graphs are alive at a time.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::channel;

use crate::graph::FragmentationGraph;
use crate::models::Decomposition;

use super::collaborators::{GraphBuilding, ScoringContext};

/// Candidates waiting for their graph, processed in input order.
pub struct GraphBuildingQueue<'a, B: GraphBuilding + ?Sized> {
    builder: &'a B,
    context: ScoringContext,
    stack: Mutex<Vec<Decomposition>>,
    threads: usize,
}

impl<'a, B: GraphBuilding + ?Sized> GraphBuildingQueue<'a, B> {
    pub fn new(
        builder: &'a B,
        context: ScoringContext,
        candidates: &[Decomposition],
        threads: usize,
    ) -> Self {
        // Reversed so that popping from the end yields input order.
        let stack = candidates.iter().rev().cloned().collect();
        Self {
            builder,
            context,
            stack: Mutex::new(stack),
            threads: threads.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Decomposition>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    pub fn pop(&self) -> Option<Decomposition> {
        self.lock().pop()
    }

    fn build(&self, candidate: &Decomposition) -> Result<FragmentationGraph, String> {
        self.builder.build_graph(candidate, &self.context)
    }

    /// Build every graph and hand it to `process` on a worker thread. The
    /// outputs are passed to `consume` on the calling thread, in completion
    /// order.
    ///
    /// An error from `consume` stops the workers and is returned once they
    /// have exited.
    pub fn run<T, E, P, C>(&self, process: P, mut consume: C) -> Result<(), E>
    where
        T: Send,
        P: Fn(&Decomposition, Result<FragmentationGraph, String>) -> T + Sync,
        C: FnMut(Decomposition, T) -> Result<(), E>,
    {
        if self.threads == 1 {
            while let Some(candidate) = self.pop() {
                let output = process(&candidate, self.build(&candidate));
                consume(candidate, output)?;
            }
            return Ok(());
        }

        std::thread::scope(|scope| {
            let (sender, receiver) = channel::bounded(self.threads);
            for _ in 0..self.threads {
                let sender = sender.clone();
                let process = &process;
                scope.spawn(move || {
                    while let Some(candidate) = self.pop() {
                        let output = process(&candidate, self.build(&candidate));
                        if sender.send((candidate, output)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(sender);

            while let Ok((candidate, output)) = receiver.recv() {
                if let Err(err) = consume(candidate, output) {
                    self.lock().clear();
                    // Unblocks workers waiting on a full channel.
                    drop(receiver);
                    return Err(err);
                }
            }
            Ok(())
        })
    }

    /// Build every graph and pass it to `consume` on the calling thread.
    pub fn for_each_graph<E>(
        &self,
        consume: impl FnMut(Decomposition, Result<FragmentationGraph, String>) -> Result<(), E>,
    ) -> Result<(), E> {
        self.run(|_, graph| graph, consume)
    }
}
