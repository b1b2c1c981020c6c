//! Filter engine
//!
//! Combines every active predicate into the visible subset of one view:
//! - Range filters (strainers): `[min, max]` on a numeric variable, global
//! - Categorical filters: selected category codes of a variable, global
//! - Server filters: host-supplied allowed indices, per view
//!
//! The effective predicate is the AND of all of them. `recompute` is a pure
//! function of its inputs; pushing the result to a handle is the session's job.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::view::ViewId;

/// Numeric range predicate on one variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub variable: String,
    pub min: f64,
    pub max: f64,
}

impl RangeFilter {
    /// Create a range filter; reversed bounds are swapped
    pub fn new(variable: impl Into<String>, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            variable: variable.into(),
            min,
            max,
        }
    }

    /// Inclusive bounds test; NaN never passes
    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        let value = value as f64;
        value >= self.min && value <= self.max
    }
}

/// Set of point indices over a universe `[0, n_points)`
///
/// Keeps insertion order for iteration and a mask for O(1) membership.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSet {
    members: Vec<u32>,
    mask: Vec<bool>,
}

impl IndexSet {
    /// Build from arbitrary indices; duplicates and indices `>= n_points` are dropped
    pub fn from_indices<I>(indices: I, n_points: usize) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut mask = vec![false; n_points];
        let mut members = Vec::new();
        for index in indices {
            let slot = index as usize;
            if slot < n_points && !mask[slot] {
                mask[slot] = true;
                members.push(index);
            }
        }
        Self { members, mask }
    }

    /// Indices whose category value, rounded, is one of `codes`
    ///
    /// Only `min(n_points, values.len())` entries are inspected.
    pub fn from_categories(values: &[f32], codes: &BTreeSet<i64>, n_points: usize) -> Self {
        let indices = values
            .iter()
            .take(n_points)
            .enumerate()
            .filter(|(_, value)| value.is_finite() && codes.contains(&(value.round() as i64)))
            .map(|(index, _)| index as u32);
        Self::from_indices(indices, n_points)
    }

    #[inline]
    pub fn contains(&self, index: u32) -> bool {
        self.mask.get(index as usize).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in insertion order
    pub fn members(&self) -> &[u32] {
        &self.members
    }
}

/// Filter source update sent by the host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCommand {
    /// Set (`Some`) or remove (`None`) the strainer on `variable`
    Range {
        variable: String,
        bounds: Option<[f64; 2]>,
    },

    /// Replace the selected codes of `variable`; an empty set removes the filter
    Categorical {
        variable: String,
        codes: BTreeSet<i64>,
        /// View whose buffer defines the categories
        #[serde(default)]
        source_view: Option<ViewId>,
    },

    /// Replace a view's allowed indices; `None` or empty removes the filter
    Server {
        view_id: ViewId,
        #[serde(default)]
        allowed: Option<Vec<u32>>,
    },
}

/// How a legend click changes a categorical selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleMode {
    /// Select only this code; clicking the sole selected code clears the filter
    Only,
    /// Add or remove this code
    Toggle,
    /// Add every code between the last clicked one and this one
    Extend,
}

/// Result of a recompute
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// No filter applies; every point is drawn
    Unfiltered,
    /// Only these indices are drawn, in candidate order
    Filtered(Vec<u32>),
}

impl Visibility {
    /// Number of visible points
    pub fn count(&self, n_points: usize) -> usize {
        match self {
            Visibility::Unfiltered => n_points,
            Visibility::Filtered(indices) => indices.len(),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Visibility::Unfiltered)
    }
}

/// Global filter tables shared by every view
#[derive(Clone, Debug, Default)]
pub struct FilterState {
    strainers: BTreeMap<String, RangeFilter>,
    selections: BTreeMap<String, BTreeSet<i64>>,
    index_filters: BTreeMap<String, IndexSet>,
    last_clicked: BTreeMap<String, i64>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or remove the strainer on `variable`
    pub fn set_range(&mut self, variable: &str, bounds: Option<[f64; 2]>) {
        match bounds {
            Some([min, max]) => {
                self.strainers
                    .insert(variable.to_string(), RangeFilter::new(variable, min, max));
            }
            None => {
                self.strainers.remove(variable);
            }
        }
    }

    pub fn strainer(&self, variable: &str) -> Option<&RangeFilter> {
        self.strainers.get(variable)
    }

    pub fn strainers(&self) -> impl Iterator<Item = &RangeFilter> {
        self.strainers.values()
    }

    /// Replace the selected codes of `variable`
    ///
    /// An empty set deletes the selection and its index set.
    pub fn set_categories(&mut self, variable: &str, codes: BTreeSet<i64>) {
        if codes.is_empty() {
            self.selections.remove(variable);
            self.index_filters.remove(variable);
        } else {
            self.selections.insert(variable.to_string(), codes);
        }
    }

    /// Apply a legend click and return the resulting selection
    pub fn toggle_category(&mut self, variable: &str, code: i64, mode: ToggleMode) -> Option<&BTreeSet<i64>> {
        let anchor = self.last_clicked.get(variable).copied();
        let mut codes = self.selections.remove(variable).unwrap_or_default();

        match (mode, anchor) {
            (ToggleMode::Extend, Some(anchor)) => {
                codes.extend(anchor.min(code)..=anchor.max(code));
            }
            (ToggleMode::Toggle, _) => {
                if !codes.remove(&code) {
                    codes.insert(code);
                }
            }
            // Extend without an anchor behaves like a plain click
            (ToggleMode::Only, _) | (ToggleMode::Extend, None) => {
                if codes.len() == 1 && codes.contains(&code) {
                    codes.clear();
                } else {
                    codes = BTreeSet::from([code]);
                }
            }
        }

        self.last_clicked.insert(variable.to_string(), code);
        self.set_categories(variable, codes);
        self.selections.get(variable)
    }

    pub fn selection(&self, variable: &str) -> Option<&BTreeSet<i64>> {
        self.selections.get(variable)
    }

    /// Variables with a categorical selection
    pub fn selected_variables(&self) -> impl Iterator<Item = &str> {
        self.selections.keys().map(String::as_str)
    }

    /// Install or drop the member set backing a categorical selection
    pub fn set_index_filter(&mut self, variable: &str, members: Option<IndexSet>) {
        match members {
            Some(set) if self.selections.contains_key(variable) => {
                self.index_filters.insert(variable.to_string(), set);
            }
            _ => {
                self.index_filters.remove(variable);
            }
        }
    }

    pub fn index_filter(&self, variable: &str) -> Option<&IndexSet> {
        self.index_filters.get(variable)
    }

    /// Forget all range and categorical state
    pub fn clear(&mut self) {
        self.strainers.clear();
        self.selections.clear();
        self.index_filters.clear();
        self.last_clicked.clear();
    }

    /// Whether any global filter is set
    pub fn is_empty(&self) -> bool {
        self.strainers.is_empty() && self.index_filters.is_empty()
    }

    /// Visible subset of one view
    ///
    /// `buffers` are the view's variables; `server` is its server filter. A
    /// strainer whose buffer the view does not carry is skipped, and an index
    /// past the end of a short buffer fails that strainer.
    pub fn recompute(
        &self,
        n_points: usize,
        buffers: &BTreeMap<String, Vec<f32>>,
        server: Option<&IndexSet>,
    ) -> Visibility {
        let server = server.filter(|set| !set.is_empty());
        let ranges: Vec<(&RangeFilter, &[f32])> = self
            .strainers
            .values()
            .filter_map(|range| {
                buffers
                    .get(&range.variable)
                    .map(|values| (range, values.as_slice()))
            })
            .collect();
        let categories: Vec<&IndexSet> = self.index_filters.values().collect();

        if categories.is_empty() && server.is_none() && ranges.is_empty() {
            return Visibility::Unfiltered;
        }

        let smallest = categories.iter().copied().min_by_key(|set| set.len());
        let passes = |index: u32, from_server: bool| -> bool {
            categories.iter().all(|set| set.contains(index))
                && (from_server || server.map_or(true, |set| set.contains(index)))
                && ranges.iter().all(|(range, values)| {
                    values
                        .get(index as usize)
                        .map_or(false, |value| range.contains(*value))
                })
        };

        let indices = match (smallest, server) {
            (Some(set), _) => set
                .members()
                .iter()
                .copied()
                .filter(|&index| (index as usize) < n_points && passes(index, false))
                .collect(),
            (None, Some(set)) => set
                .members()
                .iter()
                .copied()
                .filter(|&index| (index as usize) < n_points && passes(index, true))
                .collect(),
            (None, None) => (0..n_points as u32)
                .filter(|&index| passes(index, false))
                .collect(),
        };

        Visibility::Filtered(indices)
    }
}
