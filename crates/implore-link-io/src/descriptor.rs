//! Dataset descriptors
//!
//! A `DatasetDescriptor` is what the host sends on every render of a view.
//! `decode()` turns it into a `DecodedDataset` with one `f32` column per
//! variable, ready to be handed to the coordination layer.

use crate::decode::{DecodeResult, EncodedBuffer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dataset descriptor as shipped by the host for one view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Number of points in this dataset generation
    pub n_points: usize,

    /// Original X data domain
    pub x_min: f64,
    pub x_max: f64,

    /// Original Y data domain
    pub y_min: f64,
    pub y_max: f64,

    /// Numeric variables used by range filters
    #[serde(default)]
    pub filter_data: BTreeMap<String, EncodedBuffer>,

    /// Name of the grouping (categorical) variable, if any
    #[serde(default)]
    pub group_var: Option<String>,

    /// Category codes for `group_var`
    #[serde(default)]
    pub group_data: Option<EncodedBuffer>,

    /// Name of the variable the points are colored by, if any
    #[serde(default)]
    pub color_var: Option<String>,

    /// Values for `color_var`
    #[serde(default)]
    pub color_data: Option<EncodedBuffer>,

    /// Server-side allowed indices to install on first render
    #[serde(default)]
    pub init_server_indices: Option<Vec<u32>>,

    /// Selection to restore on first render
    #[serde(default)]
    pub init_selected_indices: Option<Vec<u32>>,

    /// View whose camera seeds this one
    #[serde(default)]
    pub master_id: Option<String>,

    /// Session-wide sync switch carried with the render
    #[serde(default)]
    pub sync_enabled: Option<bool>,
}

impl DatasetDescriptor {
    /// Create a descriptor with the given point count and domains
    pub fn new(n_points: usize, x_domain: [f64; 2], y_domain: [f64; 2]) -> Self {
        Self {
            n_points,
            x_min: x_domain[0],
            x_max: x_domain[1],
            y_min: y_domain[0],
            y_max: y_domain[1],
            filter_data: BTreeMap::new(),
            group_var: None,
            group_data: None,
            color_var: None,
            color_data: None,
            init_server_indices: None,
            init_selected_indices: None,
            master_id: None,
            sync_enabled: None,
        }
    }

    /// Parse a descriptor from JSON
    pub fn from_json(json: &str) -> DecodeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a numeric filter variable
    pub fn with_variable(mut self, name: impl Into<String>, buffer: impl Into<EncodedBuffer>) -> Self {
        self.filter_data.insert(name.into(), buffer.into());
        self
    }

    /// Set the grouping variable and its category codes
    pub fn with_groups(mut self, name: impl Into<String>, codes: impl Into<EncodedBuffer>) -> Self {
        self.group_var = Some(name.into());
        self.group_data = Some(codes.into());
        self
    }

    /// Set the color variable and its values
    pub fn with_color(mut self, name: impl Into<String>, values: impl Into<EncodedBuffer>) -> Self {
        self.color_var = Some(name.into());
        self.color_data = Some(values.into());
        self
    }

    /// Install server-side allowed indices
    pub fn with_server_indices(mut self, indices: Vec<u32>) -> Self {
        self.init_server_indices = Some(indices);
        self
    }

    /// Restore a selection on render
    pub fn with_selection(mut self, indices: Vec<u32>) -> Self {
        self.init_selected_indices = Some(indices);
        self
    }

    /// Seed the camera from another view
    pub fn with_master(mut self, master_id: impl Into<String>) -> Self {
        self.master_id = Some(master_id.into());
        self
    }

    /// Decode every buffer into `f32` columns
    ///
    /// Filter variables are inserted first, then the group variable, then the
    /// color variable, so a color buffer wins over a filter buffer of the same
    /// name. Buffers are truncated to `n_points`.
    pub fn decode(&self) -> DecodeResult<DecodedDataset> {
        let n = self.n_points;
        let mut variables = BTreeMap::new();

        for (name, buffer) in &self.filter_data {
            let values = buffer
                .decode_truncated(n)
                .map_err(|e| e.for_variable(name.as_str()))?;
            variables.insert(name.clone(), values);
        }

        let paired = [
            (&self.group_var, &self.group_data),
            (&self.color_var, &self.color_data),
        ];
        for (name, buffer) in paired {
            if let (Some(name), Some(buffer)) = (name, buffer) {
                let values = buffer
                    .decode_truncated(n)
                    .map_err(|e| e.for_variable(name.as_str()))?;
                variables.insert(name.clone(), values);
            }
        }

        Ok(DecodedDataset {
            n_points: n,
            x_domain: [self.x_min, self.x_max],
            y_domain: [self.y_min, self.y_max],
            variables,
            init_server_indices: self.init_server_indices.clone(),
            init_selected_indices: self.init_selected_indices.clone(),
            master_id: self.master_id.clone(),
            sync_enabled: self.sync_enabled,
        })
    }
}

/// A descriptor with all buffers decoded
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedDataset {
    /// Number of points in this dataset generation
    pub n_points: usize,

    /// Original X data domain `[min, max]`
    pub x_domain: [f64; 2],

    /// Original Y data domain `[min, max]`
    pub y_domain: [f64; 2],

    /// Variable name to values, each at most `n_points` long
    pub variables: BTreeMap<String, Vec<f32>>,

    pub init_server_indices: Option<Vec<u32>>,
    pub init_selected_indices: Option<Vec<u32>>,
    pub master_id: Option<String>,
    pub sync_enabled: Option<bool>,
}

impl DecodedDataset {
    /// Create an empty dataset with the given point count and domains
    pub fn new(n_points: usize, x_domain: [f64; 2], y_domain: [f64; 2]) -> Self {
        Self {
            n_points,
            x_domain,
            y_domain,
            ..Default::default()
        }
    }

    /// Add a decoded variable, truncated to `n_points`
    pub fn with_variable(mut self, name: impl Into<String>, mut values: Vec<f32>) -> Self {
        values.truncate(self.n_points);
        self.variables.insert(name.into(), values);
        self
    }

    /// Look up a variable's values
    pub fn variable(&self, name: &str) -> Option<&[f32]> {
        self.variables.get(name).map(Vec::as_slice)
    }
}
