use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use super::{Classifier, RawPrediction};
use crate::frame::Frame;

enum Step {
    Predict(RawPrediction),
    Fail(String),
}

/// Replays a queue of predictions, one per call. Once the queue is empty it
/// keeps returning the fallback prediction (non-present by default).
pub struct ScriptedClassifier {
    steps: VecDeque<Step>,
    fallback: RawPrediction,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: RawPrediction::default(),
        }
    }

    pub fn push(&mut self, pred: RawPrediction) {
        self.steps.push_back(Step::Predict(pred));
    }

    pub fn push_failure(&mut self, message: &str) {
        self.steps.push_back(Step::Fail(message.to_string()));
    }

    pub fn with_fallback(mut self, pred: RawPrediction) -> Self {
        self.fallback = pred;
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Default for ScriptedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<RawPrediction> for ScriptedClassifier {
    fn from_iter<I: IntoIterator<Item = RawPrediction>>(iter: I) -> Self {
        let mut scripted = Self::new();
        for pred in iter {
            scripted.push(pred);
        }
        scripted
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&mut self, _frame: &Frame) -> Result<RawPrediction> {
        match self.steps.pop_front() {
            Some(Step::Predict(pred)) => Ok(pred),
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
