//! Per-local variable records
//!
//! Every `GetLocal`/`SetLocal`/`Flush` of one local refers to the same
//! [`VariableAccessData`] through a [`VariableId`]. Merges mutate the table
//! entry, so a decision made while looking at one access is seen by all of
//! them.

use crate::speculation::SpeculatedType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the graph's variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(u32);

impl VariableId {
    pub const fn new(index: u32) -> Self {
        VariableId(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// Whether a variable is stored as an unboxed double
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DoubleFormatState {
    #[default]
    Empty,
    UsingDoubleFormat,
    NotUsingDoubleFormat,
    CantUseDoubleFormat,
}

impl DoubleFormatState {
    /// Lattice join: `CantUse` wins, then any disagreement, then `Using`
    pub fn merge(self, other: DoubleFormatState) -> DoubleFormatState {
        use DoubleFormatState::*;
        match (self, other) {
            (Empty, state) | (state, Empty) => state,
            (CantUseDoubleFormat, _) | (_, CantUseDoubleFormat) => CantUseDoubleFormat,
            (UsingDoubleFormat, UsingDoubleFormat) => UsingDoubleFormat,
            _ => NotUsingDoubleFormat,
        }
    }
}

/// Aggregate facts about one source-level local
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableAccessData {
    /// Operand in the frame; negative operands are arguments
    pub local: i32,
    #[serde(default)]
    prediction: SpeculatedType,
    #[serde(default)]
    argument_aware_prediction: SpeculatedType,
    #[serde(default)]
    double_format_state: DoubleFormatState,
    #[serde(default)]
    is_captured: bool,
    #[serde(default)]
    should_never_unbox: bool,
    #[serde(default)]
    is_profitable_to_unbox: bool,
}

impl VariableAccessData {
    pub fn new(local: i32) -> Self {
        Self {
            local,
            prediction: SpeculatedType::empty(),
            argument_aware_prediction: SpeculatedType::empty(),
            double_format_state: DoubleFormatState::Empty,
            is_captured: false,
            should_never_unbox: false,
            is_profitable_to_unbox: false,
        }
    }

    pub fn is_argument(&self) -> bool {
        self.local < 0
    }

    pub fn prediction(&self) -> SpeculatedType {
        self.prediction
    }

    /// Merge a prediction into both the plain and argument-aware prediction
    pub fn predict(&mut self, prediction: SpeculatedType) -> bool {
        let changed = !self.prediction.contains(prediction);
        self.prediction |= prediction;
        self.merge_argument_aware_prediction(prediction) || changed
    }

    pub fn argument_aware_prediction(&self) -> SpeculatedType {
        self.argument_aware_prediction
    }

    pub fn merge_argument_aware_prediction(&mut self, prediction: SpeculatedType) -> bool {
        let merged = self.argument_aware_prediction | prediction;
        let changed = merged != self.argument_aware_prediction;
        self.argument_aware_prediction = merged;
        changed
    }

    pub fn double_format_state(&self) -> DoubleFormatState {
        self.double_format_state
    }

    pub fn merge_double_format_state(&mut self, state: DoubleFormatState) -> bool {
        let merged = self.double_format_state.merge(state);
        let changed = merged != self.double_format_state;
        self.double_format_state = merged;
        changed
    }

    pub fn is_captured(&self) -> bool {
        self.is_captured
    }

    /// Captured variables live in the activation and are never unboxed
    pub fn mark_captured(&mut self) {
        self.is_captured = true;
        self.should_never_unbox = true;
    }

    pub fn should_never_unbox(&self) -> bool {
        self.should_never_unbox
    }

    pub fn merge_should_never_unbox(&mut self, should_never_unbox: bool) -> bool {
        let changed = should_never_unbox && !self.should_never_unbox;
        self.should_never_unbox |= should_never_unbox;
        changed
    }

    pub fn is_profitable_to_unbox(&self) -> bool {
        self.is_profitable_to_unbox
    }

    /// Monotone: the flag can be raised but never cleared. Returns whether it
    /// changed.
    pub fn merge_is_profitable_to_unbox(&mut self, profitable: bool) -> bool {
        let changed = profitable && !self.is_profitable_to_unbox;
        self.is_profitable_to_unbox |= profitable;
        changed
    }

    pub fn should_unbox_if_possible(&self) -> bool {
        !self.should_never_unbox && self.is_profitable_to_unbox
    }

    pub fn should_use_double_format(&self) -> bool {
        self.double_format_state == DoubleFormatState::UsingDoubleFormat
            && self.should_unbox_if_possible()
    }
}

/// Variables that alias one argument slot across inlined frames
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArgumentPosition {
    variables: Vec<VariableId>,
    #[serde(default)]
    prediction: SpeculatedType,
    #[serde(default)]
    is_profitable_to_unbox: bool,
    #[serde(default)]
    should_never_unbox: bool,
}

impl ArgumentPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, variable: VariableId) {
        self.variables.push(variable);
    }

    pub fn variables(&self) -> &[VariableId] {
        &self.variables
    }

    pub fn is_profitable_to_unbox(&self) -> bool {
        self.is_profitable_to_unbox
    }

    /// If any member is profitable to unbox, all members are. Returns whether
    /// any member's flag changed.
    pub fn merge_unboxing_awareness(&mut self, table: &mut [VariableAccessData]) -> bool {
        let mut changed = false;
        for variable in &self.variables {
            let profitable = table[variable.index()].is_profitable_to_unbox();
            changed |= profitable && !self.is_profitable_to_unbox;
            self.is_profitable_to_unbox |= profitable;
        }
        if !changed {
            return false;
        }

        let mut changed = false;
        for variable in &self.variables {
            changed |= table[variable.index()].merge_is_profitable_to_unbox(self.is_profitable_to_unbox);
        }
        changed
    }

    /// Share argument-aware predictions and the never-unbox bit among members
    pub fn merge_prediction_awareness(&mut self, table: &mut [VariableAccessData]) -> bool {
        let mut changed = false;
        for variable in &self.variables {
            let data = &table[variable.index()];
            let merged = self.prediction | data.argument_aware_prediction();
            changed |= merged != self.prediction;
            self.prediction = merged;
            changed |= data.should_never_unbox() && !self.should_never_unbox;
            self.should_never_unbox |= data.should_never_unbox();
        }
        if !changed {
            return false;
        }

        let mut changed = false;
        for variable in &self.variables {
            let data = &mut table[variable.index()];
            changed |= data.merge_argument_aware_prediction(self.prediction);
            changed |= data.merge_should_never_unbox(self.should_never_unbox);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profitability_is_monotone() {
        let mut data = VariableAccessData::new(1);
        assert!(!data.merge_is_profitable_to_unbox(false));
        assert!(data.merge_is_profitable_to_unbox(true));
        assert!(!data.merge_is_profitable_to_unbox(true));
        assert!(!data.merge_is_profitable_to_unbox(false));
        assert!(data.is_profitable_to_unbox());
    }

    #[test]
    fn test_captured_never_unboxes() {
        let mut data = VariableAccessData::new(0);
        data.mark_captured();
        data.merge_is_profitable_to_unbox(true);
        assert!(!data.should_unbox_if_possible());
    }

    #[test]
    fn test_double_format_requires_profitability() {
        let mut data = VariableAccessData::new(2);
        data.merge_double_format_state(DoubleFormatState::UsingDoubleFormat);
        assert!(!data.should_use_double_format());
        data.merge_is_profitable_to_unbox(true);
        assert!(data.should_use_double_format());
    }

    #[test]
    fn test_double_format_merge() {
        use DoubleFormatState::*;
        assert_eq!(Empty.merge(UsingDoubleFormat), UsingDoubleFormat);
        assert_eq!(UsingDoubleFormat.merge(NotUsingDoubleFormat), NotUsingDoubleFormat);
        assert_eq!(NotUsingDoubleFormat.merge(CantUseDoubleFormat), CantUseDoubleFormat);
    }

    #[test]
    fn test_argument_position_spreads_profitability() {
        let mut table = vec![VariableAccessData::new(-1), VariableAccessData::new(-1)];
        let mut position = ArgumentPosition::new();
        position.add_variable(VariableId::new(0));
        position.add_variable(VariableId::new(1));

        assert!(!position.merge_unboxing_awareness(&mut table));

        table[1].merge_is_profitable_to_unbox(true);
        assert!(position.merge_unboxing_awareness(&mut table));
        assert!(table[0].is_profitable_to_unbox());
        assert!(!position.merge_unboxing_awareness(&mut table));
    }

    #[test]
    fn test_argument_position_merges_predictions() {
        let mut table = vec![VariableAccessData::new(-2), VariableAccessData::new(-2)];
        table[0].predict(SpeculatedType::INT32);
        table[1].predict(SpeculatedType::DOUBLE_REAL);
        let mut position = ArgumentPosition::new();
        position.add_variable(VariableId::new(0));
        position.add_variable(VariableId::new(1));

        assert!(position.merge_prediction_awareness(&mut table));
        let expected = SpeculatedType::INT32 | SpeculatedType::DOUBLE_REAL;
        assert_eq!(table[0].argument_aware_prediction(), expected);
        assert_eq!(table[0].prediction(), SpeculatedType::INT32);
        assert!(!position.merge_prediction_awareness(&mut table));
    }
}
