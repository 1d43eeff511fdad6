//! Survey request records and the multi-choice fields they carry.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A utility network that can be requested from the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Utility {
    Water,
    Sanitary,
    Storm,
}

impl Utility {
    pub const ALL: [Utility; 3] = [Utility::Water, Utility::Sanitary, Utility::Storm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Water => "Water",
            Self::Sanitary => "Sanitary",
            Self::Storm => "Storm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "water" => Some(Self::Water),
            "sanitary" => Some(Self::Sanitary),
            "storm" => Some(Self::Storm),
            _ => None,
        }
    }
}

impl fmt::Display for Utility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of utilities selected on a request.
///
/// `All` or an empty field expands to every utility.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UtilitySet(BTreeSet<Utility>);

impl UtilitySet {
    /// Parse the comma-separated `utilities` survey field.
    ///
    /// Unknown entries are skipped. Returns `None` when the field has entries
    /// but none of them name a utility.
    pub fn parse(field: &str) -> Option<Self> {
        let mut set = BTreeSet::new();
        let mut tokens = 0;
        for token in field.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            tokens += 1;
            if token.eq_ignore_ascii_case("all") {
                return Some(Self::all());
            }
            match Utility::from_str(token) {
                Some(utility) => {
                    set.insert(utility);
                }
                None => tracing::debug!("Ignoring unknown utility '{}'", token),
            }
        }
        match (tokens, set.is_empty()) {
            (0, _) => Some(Self::all()),
            (_, true) => None,
            (_, false) => Some(Self(set)),
        }
    }

    pub fn all() -> Self {
        Self(Utility::ALL.into_iter().collect())
    }

    pub fn of(utilities: &[Utility]) -> Self {
        Self(utilities.iter().copied().collect())
    }

    pub fn is_all(&self) -> bool {
        self.0.len() == Utility::ALL.len()
    }

    pub fn contains(&self, utility: Utility) -> bool {
        self.0.contains(&utility)
    }

    pub fn iter(&self) -> impl Iterator<Item = Utility> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UtilitySet {
    /// Comma-separated names in a stable order, e.g. `Water,Storm`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Utility::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// An output a requester can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Copies of as-built drawings.
    AsBuilts,
    /// Clipped utility layers (geodatabase, shapefiles).
    GisFiles,
}

impl OutputKind {
    /// Token used in the `desired_output` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsBuilts => "as_builts",
            Self::GisFiles => "gis_files",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "as_builts" => Some(Self::AsBuilts),
            "gis_files" => Some(Self::GisFiles),
            _ => None,
        }
    }

    /// Subfolder of the request folder this output is written to.
    pub fn subfolder(&self) -> &'static str {
        match self {
            Self::AsBuilts => "As-Builts",
            Self::GisFiles => "GIS Files",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AsBuilts => "as-builts",
            Self::GisFiles => "GIS files",
        }
    }

    /// Parse the comma-separated `desired_output` survey field.
    pub fn parse_set(field: &str) -> BTreeSet<OutputKind> {
        field
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .filter_map(|token| {
                let kind = Self::from_str(token);
                if kind.is_none() {
                    tracing::debug!("Ignoring unknown output '{}'", token);
                }
                kind
            })
            .collect()
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One survey submission.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Request {
    /// Feature GlobalID, trimmed.
    pub global_id: String,
    /// Requester email address.
    pub email: String,
    /// Raw `specify_desired_output_folder_n` value.
    pub folder_name: String,
    /// Raw `desired_output` value.
    pub desired_output: String,
    /// Raw `utilities` value.
    pub utilities: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub fulfilled_date: Option<DateTime<Utc>>,
    pub as_builts_fulfilled: Option<DateTime<Utc>>,
    pub gis_files_fulfilled: Option<DateTime<Utc>>,
    /// Outputs whose tracking field exists on the feature.
    pub tracked_outputs: BTreeSet<OutputKind>,
}

impl Request {
    /// A request is new until its `FulfilledDate` is set.
    pub fn is_new(&self) -> bool {
        self.fulfilled_date.is_none()
    }

    pub fn outputs(&self) -> BTreeSet<OutputKind> {
        OutputKind::parse_set(&self.desired_output)
    }

    /// `None` when `utilities` names nothing recognisable.
    pub fn utility_set(&self) -> Option<UtilitySet> {
        UtilitySet::parse(&self.utilities)
    }

    /// When a single output was already delivered by an earlier run.
    pub fn output_fulfilled(&self, kind: OutputKind) -> Option<DateTime<Utc>> {
        match kind {
            OutputKind::AsBuilts => self.as_builts_fulfilled,
            OutputKind::GisFiles => self.gis_files_fulfilled,
        }
    }

    /// Whether the layer has a tracking field for `kind` on this feature.
    pub fn tracks(&self, kind: OutputKind) -> bool {
        self.tracked_outputs.contains(&kind)
    }

    /// Requested outputs that have not been delivered yet.
    pub fn pending_outputs(&self) -> BTreeSet<OutputKind> {
        self.outputs()
            .into_iter()
            .filter(|kind| self.output_fulfilled(*kind).is_none())
            .collect()
    }

    /// Folder name safe to create under the output directory.
    ///
    /// Falls back to the GlobalID when the requester left the field blank.
    pub fn folder(&self) -> String {
        let cleaned = sanitize_folder_name(&self.folder_name);
        if cleaned.is_empty() {
            sanitize_folder_name(self.global_id.trim_matches(|c| c == '{' || c == '}'))
        } else {
            cleaned
        }
    }

    /// Attribute rows for the unknown-requester email table.
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        let date = |d: Option<DateTime<Utc>>| {
            d.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        };
        vec![
            ("GlobalID", self.global_id.clone()),
            ("Email", self.email.clone()),
            ("Folder", self.folder_name.clone()),
            ("Desired output", self.desired_output.clone()),
            ("Utilities", self.utilities.clone()),
            ("Created", date(self.creation_date)),
        ]
    }
}

/// Replace characters that cannot appear in a single path component.
fn sanitize_folder_name(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    // Trailing dots and spaces are stripped by Windows.
    let trimmed = replaced.trim_end_matches(['.', ' ']);
    match trimmed {
        "" | "." | ".." => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(desired_output: &str, utilities: &str) -> Request {
        Request {
            global_id: "{ABC-123}".to_string(),
            email: "someone@example.com".to_string(),
            desired_output: desired_output.to_string(),
            utilities: utilities.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_utilities_subset() {
        let set = UtilitySet::parse("Water,Storm").unwrap();
        assert_eq!(set, UtilitySet::of(&[Utility::Water, Utility::Storm]));
        assert!(!set.contains(Utility::Sanitary));
        assert_eq!(set.to_string(), "Water,Storm");
    }

    #[test]
    fn test_utilities_all_and_empty() {
        assert!(UtilitySet::parse("All").unwrap().is_all());
        assert!(UtilitySet::parse("Water,All").unwrap().is_all());
        assert!(UtilitySet::parse("").unwrap().is_all());
        assert!(UtilitySet::parse(" , ").unwrap().is_all());
    }

    #[test]
    fn test_utilities_unrecognised() {
        assert_eq!(UtilitySet::parse("Fiber"), None);
        assert_eq!(UtilitySet::parse("Fiber, Gas"), None);
        assert_eq!(
            UtilitySet::parse("Fiber,Water"),
            Some(UtilitySet::of(&[Utility::Water]))
        );
    }

    #[test]
    fn test_utilities_whitespace_and_case() {
        let set = UtilitySet::parse(" sanitary , STORM ").unwrap();
        assert_eq!(set, UtilitySet::of(&[Utility::Sanitary, Utility::Storm]));
    }

    #[test]
    fn test_outputs_parse() {
        let both = request("as_builts,gis_files", "");
        assert_eq!(
            both.outputs().into_iter().collect::<Vec<_>>(),
            vec![OutputKind::AsBuilts, OutputKind::GisFiles]
        );

        let one = request("GIS_Files", "");
        assert_eq!(
            one.outputs().into_iter().collect::<Vec<_>>(),
            vec![OutputKind::GisFiles]
        );

        assert!(request("", "").outputs().is_empty());
        assert!(request("paper_maps", "").outputs().is_empty());
    }

    #[test]
    fn test_pending_outputs_skip_delivered() {
        let mut req = request("as_builts,gis_files", "All");
        req.gis_files_fulfilled = Some(Utc::now());
        assert_eq!(
            req.pending_outputs().into_iter().collect::<Vec<_>>(),
            vec![OutputKind::AsBuilts]
        );
    }

    #[test]
    fn test_is_new() {
        let mut req = request("as_builts", "Water");
        assert!(req.is_new());
        req.fulfilled_date = Some(Utc::now());
        assert!(!req.is_new());
    }

    #[test]
    fn test_folder_sanitized() {
        let mut req = request("as_builts", "Water");
        req.folder_name = "  Main St / Phase 2: Utilities. ".to_string();
        assert_eq!(req.folder(), "Main St _ Phase 2_ Utilities");

        req.folder_name = "..".to_string();
        assert_eq!(req.folder(), "ABC-123");

        req.folder_name = String::new();
        assert_eq!(req.folder(), "ABC-123");
    }
}
