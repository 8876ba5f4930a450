//! Structured document model returned by the layout-analysis service.
//!
//! Only the fields the pipeline reads are modeled; geometry is carried for
//! completeness and unknown fields are ignored.

use serde::Deserialize;

/// Full extraction artifact for one document.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedDocument {
    /// Pages in document order.
    pub pages: Vec<Page>,
}

/// One page of the extracted document.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    /// 1-based page number.
    #[serde(default)]
    pub number: u32,
    /// Page width in layout units.
    #[serde(default)]
    pub width: f64,
    /// Page height in layout units.
    #[serde(default)]
    pub height: f64,
    /// Text regions in reading order.
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// One labeled text region on a page.
#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    /// Extracted text content.
    pub text: String,
    /// Structural label assigned by the layout model (for example `text`,
    /// `header`, `table`).
    #[serde(default)]
    pub label: String,
    /// Left edge of the region's bounding box.
    #[serde(default)]
    pub x_top_left: i64,
    /// Top edge of the region's bounding box.
    #[serde(default)]
    pub y_top_left: i64,
    /// Bounding box width.
    #[serde(default)]
    pub width: i64,
    /// Bounding box height.
    #[serde(default)]
    pub height: i64,
}

impl ExtractedDocument {
    /// Concatenate region text grouped by label, preserving document order.
    ///
    /// Groups appear in the order their label first occurs; within a group,
    /// text keeps page/region order. Regions whose text is blank are skipped.
    pub fn labeled_text(&self) -> Vec<(String, String)> {
        let mut groups: Vec<(String, String)> = Vec::new();
        for page in &self.pages {
            for region in &page.regions {
                if region.text.trim().is_empty() {
                    continue;
                }
                match groups.iter_mut().find(|(label, _)| *label == region.label) {
                    Some((_, text)) => text.push_str(&region.text),
                    None => groups.push((region.label.clone(), region.text.clone())),
                }
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(text: &str, label: &str) -> Region {
        Region {
            text: text.to_string(),
            label: label.to_string(),
            x_top_left: 0,
            y_top_left: 0,
            width: 0,
            height: 0,
        }
    }

    #[test]
    fn labeled_text_groups_in_document_order() {
        let document = ExtractedDocument {
            pages: vec![
                Page {
                    number: 1,
                    width: 0.0,
                    height: 0.0,
                    regions: vec![region("alpha ", "text"), region("HEAD ", "header")],
                },
                Page {
                    number: 2,
                    width: 0.0,
                    height: 0.0,
                    regions: vec![region("beta", "text")],
                },
            ],
        };

        let groups = document.labeled_text();
        assert_eq!(
            groups,
            vec![
                ("text".to_string(), "alpha beta".to_string()),
                ("header".to_string(), "HEAD ".to_string()),
            ]
        );
    }

    #[test]
    fn labeled_text_skips_blank_regions() {
        let document = ExtractedDocument {
            pages: vec![Page {
                number: 1,
                width: 0.0,
                height: 0.0,
                regions: vec![region("   ", "text"), region("kept", "text")],
            }],
        };
        assert_eq!(
            document.labeled_text(),
            vec![("text".to_string(), "kept".to_string())]
        );
    }

    #[test]
    fn report_json_parses_with_extra_fields() {
        let raw = serde_json::json!({
            "pages": [{
                "number": 1,
                "width": 612.0,
                "height": 792.0,
                "tables": [],
                "regions": [{
                    "text": "Hello",
                    "label": "text",
                    "x_top_left": 10,
                    "y_top_left": 20,
                    "width": 100,
                    "height": 12,
                    "font_name": "unused"
                }]
            }]
        });
        let document: ExtractedDocument =
            serde_json::from_value(raw).expect("report deserializes");
        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.pages[0].regions[0].text, "Hello");
    }
}
