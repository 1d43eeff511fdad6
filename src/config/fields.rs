//! Survey layer field names.

use serde::{Deserialize, Serialize};

use crate::models::OutputKind;

/// Names of the survey layer fields this tool reads and writes.
///
/// Defaults match the Survey123 form the tool was built around. Tracking
/// fields may be set to an empty string when the layer does not have them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub global_id: String,
    pub fulfilled_date: String,
    pub utilities: String,
    pub email: String,
    pub folder: String,
    pub desired_output: String,
    pub creation_date: String,
    pub as_builts_fulfilled: String,
    pub gis_files_fulfilled: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            global_id: "GlobalID".to_string(),
            fulfilled_date: "FulfilledDate".to_string(),
            utilities: "utilities".to_string(),
            email: "email".to_string(),
            folder: "specify_desired_output_folder_n".to_string(),
            desired_output: "desired_output".to_string(),
            creation_date: "CreationDate".to_string(),
            as_builts_fulfilled: "as_builts_fulfilled".to_string(),
            gis_files_fulfilled: "gis_files_fulfilled".to_string(),
        }
    }
}

impl FieldNames {
    /// Per-output tracking field, or None when disabled.
    pub fn output_fulfilled(&self, kind: OutputKind) -> Option<&str> {
        let name = match kind {
            OutputKind::AsBuilts => &self.as_builts_fulfilled,
            OutputKind::GisFiles => &self.gis_files_fulfilled,
        };
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}
