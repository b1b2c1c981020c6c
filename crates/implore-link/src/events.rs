//! Outbound notifications to the host application

use serde::{Deserialize, Serialize};

use crate::view::ViewId;

/// Event queued for the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Visible point count of the primary view after a recompute
    FilteredCount { view_id: ViewId, count: usize },

    /// A user selected or deselected points in a view
    SelectionChanged {
        view_id: ViewId,
        indices: Vec<u32>,
        count: usize,
    },
}

impl HostEvent {
    pub fn selection_changed(view_id: ViewId, indices: Vec<u32>) -> Self {
        let count = indices.len();
        HostEvent::SelectionChanged {
            view_id,
            indices,
            count,
        }
    }

    pub fn view_id(&self) -> &ViewId {
        match self {
            HostEvent::FilteredCount { view_id, .. } => view_id,
            HostEvent::SelectionChanged { view_id, .. } => view_id,
        }
    }

    /// Serialize as a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let event = HostEvent::FilteredCount {
            view_id: ViewId::from("p1"),
            count: 42,
        };
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"type":"filtered_count","view_id":"p1","count":42}"#
        );

        let event = HostEvent::selection_changed(ViewId::from("p2"), vec![3, 5]);
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"type":"selection_changed","view_id":"p2","indices":[3,5],"count":2}"#
        );
    }
}
