//! JSON persistence: version-1 documents carrying configuration and raw
//! cell inputs. Values are not persisted; loading replays every input
//! through evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ds_core::error::{Error, Result};

use crate::sheet::{Sheet, SheetConfig};

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    config: SheetConfig,
    cells: BTreeMap<String, String>,
}

impl Sheet {
    /// Serialize configuration and non-empty raw inputs.
    pub fn to_json(&self) -> Result<String> {
        let doc = Document {
            version: DOCUMENT_VERSION,
            config: self.config.clone(),
            cells: self
                .cells
                .iter()
                .filter(|(_, cell)| !cell.input.is_empty())
                .map(|(id, cell)| (id.clone(), cell.input.clone()))
                .collect(),
        };
        Ok(serde_json::to_string(&doc)?)
    }

    /// Clear the sheet and replay a serialized document, re-evaluating
    /// every input.
    pub async fn from_json(&mut self, json: &str) -> Result<()> {
        let doc: Document = serde_json::from_str(json)?;
        if doc.version != DOCUMENT_VERSION {
            return Err(Error::Validation(format!(
                "unsupported document version {} (expected {DOCUMENT_VERSION})",
                doc.version
            )));
        }
        self.cells.clear();
        self.config = doc.config;
        for (id, input) in doc.cells {
            self.set_input(&id, &input).await;
        }
        Ok(())
    }
}
