//! Multi-row submissions from a spreadsheet.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Job, MediaItem, OutputSettings};

/// One spreadsheet row: produces exactly one output video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpreadsheetRow {
    /// Row number in the sheet (1-based); defaults to position + 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_number: Option<u32>,

    /// Ordered media items
    #[serde(default)]
    pub media_items: Vec<MediaItem>,

    /// Preferred output file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

/// A batch of rows sharing output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,

    #[serde(default)]
    pub rows: Vec<SpreadsheetRow>,

    #[serde(default)]
    pub output_settings: OutputSettings,
}

impl BatchRequest {
    /// Expand into one pending job per row.
    pub fn into_jobs(self) -> Vec<Job> {
        let settings = self.output_settings;
        self.rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let row_number = row.row_number.unwrap_or(index as u32 + 1);
                let job = Job::new(row_number, row.media_items, settings.clone());
                match row.output_name {
                    Some(name) => job.with_output_name(name),
                    None => job,
                }
            })
            .collect()
    }
}
