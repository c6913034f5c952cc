//! Index-aligned batch results.

use crate::error::{FetchError, PoolError};

/// Outputs and errors of one batch, both indexed like the job's inputs.
///
/// Slots of inputs that were never dispatched (cancelled batch) hold `None`
/// in both vectors.
#[derive(Debug)]
pub struct BatchResult<O, E> {
    /// `outputs[i]` is the output of `inputs[i]`, if it succeeded.
    pub outputs: Vec<Option<O>>,
    /// `errors[i]` is the error of `inputs[i]`, if it failed.
    pub errors: Vec<Option<E>>,
    /// Set when the batch stopped dispatching before every input ran.
    pub interrupted: Option<PoolError>,
}

impl<O, E> BatchResult<O, E> {
    /// Pre-sized result with every slot empty.
    pub(crate) fn with_len(len: usize) -> Self {
        Self {
            outputs: std::iter::repeat_with(|| None).take(len).collect(),
            errors: std::iter::repeat_with(|| None).take(len).collect(),
            interrupted: None,
        }
    }

    /// Store the outcome of the task at `index`.
    pub(crate) fn fill(&mut self, index: usize, result: Result<O, E>) {
        match result {
            Ok(output) => self.outputs[index] = Some(output),
            Err(err) => self.errors[index] = Some(err),
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Number of slots holding an error.
    pub fn failed_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.is_some()
    }

    /// Classify the batch for the refresh scheduler.
    ///
    /// `what` names the items in the notice, e.g. `"releases"`.
    pub fn classify(&self, what: &str) -> Result<(), FetchError> {
        if let Some(ref interrupted) = self.interrupted {
            return Err(FetchError::NoContent(interrupted.to_string()));
        }

        let total = self.len();
        let failed = self.failed_count();

        if total > 0 && failed == total {
            return Err(FetchError::NoContent(format!("all {total} {what} failed")));
        }

        if failed > 0 {
            return Err(FetchError::PartialContent {
                failed,
                total,
                what: what.to_string(),
            });
        }

        Ok(())
    }

    /// Consume the batch, yielding `(index, result)` for every filled slot.
    pub fn into_results(self) -> impl Iterator<Item = (usize, Result<O, E>)> {
        self.outputs
            .into_iter()
            .zip(self.errors)
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                (Some(output), _) => Some((index, Ok(output))),
                (None, Some(err)) => Some((index, Err(err))),
                (None, None) => None,
            })
    }

    /// Consume the batch, keeping only successful outputs in input order.
    pub fn into_outputs(self) -> Vec<O> {
        self.outputs.into_iter().flatten().collect()
    }
}
