//! Normalized analysis reports.
//!
//! The backend's post-processing endpoints return loosely-shaped JSON.
//! The normalizers here substitute documented defaults for every absent
//! (or `null`) field: counts default to zero, scores default to 100,
//! lists default to empty. Nothing else is validated client-side: a
//! member of the wrong shape falls back to its default instead of
//! failing the whole report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Score assumed when the server omits one.
pub const DEFAULT_SCORE: f64 = 100.0;

/// Signature shared by the per-workflow report normalizers.
pub type Normalizer = fn(Value) -> Result<AnalysisResult, CoreError>;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// Parse a server-supplied severity string (any case).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Info => "Info",
        }
    }
}

/// Issue counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityCounts {
    #[serde(deserialize_with = "lenient::count")]
    pub critical: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub high: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub medium: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub low: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub info: u32,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    fn increment(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        };
        *slot += 1;
    }

    /// `(severity, count)` pairs from most to least severe.
    pub fn entries(&self) -> [(Severity, u32); 5] {
        Severity::ALL.map(|s| (s, self.get(s)))
    }

    pub fn total(&self) -> u32 {
        Severity::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

// ---------------------------------------------------------------------------
// Consistency report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyCategoryCounts {
    #[serde(deserialize_with = "lenient::count")]
    pub case_alignment: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub cross_references: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub defined_terms: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub structural: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub numbering: u32,
}

impl ConsistencyCategoryCounts {
    pub fn entries(&self) -> [(&'static str, u32); 5] {
        [
            ("Case Alignment", self.case_alignment),
            ("Cross References", self.cross_references),
            ("Defined Terms", self.defined_terms),
            ("Structural", self.structural),
            ("Numbering", self.numbering),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueLocation {
    #[serde(deserialize_with = "lenient::text")]
    pub document: String,
    #[serde(deserialize_with = "lenient::count")]
    pub line: u32,
}

/// A single cross-document inconsistency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyIssue {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
    /// `success`, `error` or `warning`.
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(deserialize_with = "lenient::optional")]
    pub location: Option<IssueLocation>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub details: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub severity: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub agent: Option<String>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub confidence_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub suggested_fix: Option<String>,
    #[serde(deserialize_with = "lenient::texts")]
    pub affected_documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyReport {
    #[serde(deserialize_with = "lenient::count")]
    pub documents_analyzed: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub total_issues: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub issues_by_severity: SeverityCounts,
    #[serde(deserialize_with = "lenient::or_default")]
    pub issues_by_category: ConsistencyCategoryCounts,
    #[serde(deserialize_with = "lenient::list")]
    pub detailed_issues: Vec<ConsistencyIssue>,
    #[serde(deserialize_with = "lenient::texts")]
    pub recommendations: Vec<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub summary: String,
    #[serde(deserialize_with = "lenient::score")]
    pub consistency_score: f64,
    /// Raw tool findings, passed through untouched.
    pub detailed_findings: Value,
}

impl Default for ConsistencyReport {
    fn default() -> Self {
        Self {
            documents_analyzed: 0,
            total_issues: 0,
            issues_by_severity: SeverityCounts::default(),
            issues_by_category: ConsistencyCategoryCounts::default(),
            detailed_issues: Vec::new(),
            recommendations: Vec::new(),
            summary: String::new(),
            consistency_score: DEFAULT_SCORE,
            detailed_findings: Value::Object(Default::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Firm-standard (style) report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleIssueBreakdown {
    #[serde(deserialize_with = "lenient::count")]
    pub punctuation: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub capitalization: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub sentence_structure: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub word_choice: u32,
}

impl StyleIssueBreakdown {
    pub fn entries(&self) -> [(&'static str, u32); 4] {
        [
            ("Punctuation", self.punctuation),
            ("Capitalization", self.capitalization),
            ("Sentence Structure", self.sentence_structure),
            ("Word Choice", self.word_choice),
        ]
    }
}

/// Recommendations arrive either as bare strings or as objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recommendation {
    Text(String),
    Detailed {
        #[serde(deserialize_with = "lenient::text")]
        description: String,
        #[serde(default, deserialize_with = "lenient::opt_text")]
        details: Option<String>,
    },
}

impl Recommendation {
    pub fn description(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Detailed { description, .. } => description,
        }
    }

    /// Single-line form: `description (details)` when details exist.
    pub fn to_line(&self) -> String {
        match self {
            Self::Detailed {
                description,
                details: Some(details),
            } if !details.is_empty() => format!("{description} ({details})"),
            other => other.description().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleIssue {
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub severity: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub context: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub recommendation: Option<String>,
    #[serde(deserialize_with = "lenient::texts")]
    pub affected_documents: Vec<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub additional_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedAnalysis {
    #[serde(deserialize_with = "lenient::list")]
    pub punctuation_issues: Vec<StyleIssue>,
    #[serde(deserialize_with = "lenient::list")]
    pub capitalization_issues: Vec<StyleIssue>,
    #[serde(deserialize_with = "lenient::list")]
    pub structure_issues: Vec<StyleIssue>,
    #[serde(deserialize_with = "lenient::list")]
    pub word_choice_issues: Vec<StyleIssue>,
}

impl DetailedAnalysis {
    /// `(category label, issues)` in display order.
    pub fn categories(&self) -> [(&'static str, &[StyleIssue]); 4] {
        [
            ("Punctuation", self.punctuation_issues.as_slice()),
            ("Capitalization", self.capitalization_issues.as_slice()),
            ("Sentence Structure", self.structure_issues.as_slice()),
            ("Word Choice", self.word_choice_issues.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleMetadata {
    #[serde(deserialize_with = "lenient::opt_text")]
    pub processed_at: Option<String>,
    #[serde(deserialize_with = "lenient::count")]
    pub total_documents: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub documents_with_issues: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleReport {
    #[serde(deserialize_with = "lenient::score")]
    pub compliance_score: f64,
    #[serde(deserialize_with = "lenient::text")]
    pub compliance_level: String,
    #[serde(deserialize_with = "lenient::count")]
    pub total_issues: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub total_documents_analyzed: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub issue_breakdown: StyleIssueBreakdown,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<Recommendation>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub detailed_analysis: DetailedAnalysis,
    #[serde(deserialize_with = "lenient::text")]
    pub summary: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub metadata: StyleMetadata,
}

impl Default for StyleReport {
    fn default() -> Self {
        Self {
            compliance_score: DEFAULT_SCORE,
            compliance_level: String::new(),
            total_issues: 0,
            total_documents_analyzed: 0,
            issue_breakdown: StyleIssueBreakdown::default(),
            recommendations: Vec::new(),
            detailed_analysis: DetailedAnalysis::default(),
            summary: String::new(),
            metadata: StyleMetadata::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// Flattened view of one issue, independent of the report kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueView {
    pub category: String,
    pub description: String,
    pub severity: Option<Severity>,
    pub location: Option<String>,
    pub suggested_fix: Option<String>,
    pub affected_documents: Vec<String>,
}

/// The normalized report handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Consistency(ConsistencyReport),
    FirmStandard(StyleReport),
}

impl AnalysisResult {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Consistency(_) => "Consistency Analysis",
            Self::FirmStandard(_) => "Firm Standard Analysis",
        }
    }

    pub fn documents_analyzed(&self) -> u32 {
        match self {
            Self::Consistency(r) => r.documents_analyzed,
            Self::FirmStandard(r) => r.total_documents_analyzed,
        }
    }

    pub fn total_issues(&self) -> u32 {
        match self {
            Self::Consistency(r) => r.total_issues,
            Self::FirmStandard(r) => r.total_issues,
        }
    }

    /// `(label, score)`: consistency or compliance score.
    pub fn score(&self) -> (&'static str, f64) {
        match self {
            Self::Consistency(r) => ("Consistency Score", r.consistency_score),
            Self::FirmStandard(r) => ("Compliance Score", r.compliance_score),
        }
    }

    /// Severity breakdown. Style reports carry none, so it is derived
    /// from the severities of their detailed issues.
    pub fn severity_counts(&self) -> SeverityCounts {
        match self {
            Self::Consistency(r) => r.issues_by_severity,
            Self::FirmStandard(r) => {
                let mut counts = SeverityCounts::default();
                for (_, issues) in r.detailed_analysis.categories() {
                    for sev in issues
                        .iter()
                        .filter_map(|i| i.severity.as_deref().and_then(Severity::parse))
                    {
                        counts.increment(sev);
                    }
                }
                counts
            }
        }
    }

    pub fn category_counts(&self) -> Vec<(&'static str, u32)> {
        match self {
            Self::Consistency(r) => r.issues_by_category.entries().to_vec(),
            Self::FirmStandard(r) => r.issue_breakdown.entries().to_vec(),
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        match self {
            Self::Consistency(r) => r.recommendations.clone(),
            Self::FirmStandard(r) => r
                .recommendations
                .iter()
                .map(Recommendation::to_line)
                .collect(),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Self::Consistency(r) => &r.summary,
            Self::FirmStandard(r) => &r.summary,
        }
    }

    /// Every detailed issue, flattened.
    pub fn issues(&self) -> Vec<IssueView> {
        match self {
            Self::Consistency(r) => r
                .detailed_issues
                .iter()
                .map(|i| IssueView {
                    category: i.category.clone(),
                    description: i.description.clone(),
                    severity: i.severity.as_deref().and_then(Severity::parse),
                    location: i
                        .location
                        .as_ref()
                        .map(|l| format!("{}:{}", l.document, l.line)),
                    suggested_fix: i.suggested_fix.clone(),
                    affected_documents: i.affected_documents.clone(),
                })
                .collect(),
            Self::FirmStandard(r) => r
                .detailed_analysis
                .categories()
                .into_iter()
                .flat_map(|(label, issues)| {
                    issues.iter().map(move |i| IssueView {
                        category: label.to_string(),
                        description: i.description.clone(),
                        severity: i.severity.as_deref().and_then(Severity::parse),
                        location: i.location.clone(),
                        suggested_fix: i.recommendation.clone(),
                        affected_documents: i.affected_documents.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Issues whose category matches `filter` case-insensitively.
    ///
    /// `"all"` (or an empty filter) returns everything. Snake-case keys
    /// such as `word_choice_issues` match their display label.
    pub fn issues_in_category(&self, filter: &str) -> Vec<IssueView> {
        let wanted = normalize_category(filter);
        let all = self.issues();
        if wanted.is_empty() || wanted == "all" {
            return all;
        }
        all.into_iter()
            .filter(|i| normalize_category(&i.category) == wanted)
            .collect()
    }
}

fn normalize_category(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase().replace('_', " ");
    lowered
        .strip_suffix(" issues")
        .unwrap_or(&lowered)
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Normalizers
// ---------------------------------------------------------------------------

/// Normalize a processed coherence report.
pub fn normalize_consistency(processed_report: Value) -> Result<AnalysisResult, CoreError> {
    parse_report(processed_report, "coherence").map(AnalysisResult::Consistency)
}

/// Normalize a processed style report.
pub fn normalize_firm_standard(processed_report: Value) -> Result<AnalysisResult, CoreError> {
    parse_report(processed_report, "style").map(AnalysisResult::FirmStandard)
}

fn parse_report<T: serde::de::DeserializeOwned>(
    processed_report: Value,
    name: &str,
) -> Result<T, CoreError> {
    if !processed_report.is_object() {
        return Err(CoreError::Processing(format!(
            "Processed {name} report is missing or not an object"
        )));
    }
    serde_json::from_value(strip_nulls(processed_report))
        .map_err(|e| CoreError::Processing(format!("Malformed {name} report: {e}")))
}

/// Drop `null` object members so they fall back to field defaults.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Field deserializers that fall back to defaults instead of failing.
///
/// Every helper reads the member as a raw [`Value`] first, so none of
/// them can reject the surrounding report.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::DEFAULT_SCORE;

    /// Non-negative integer; accepts integral floats and numeric strings.
    pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_number(&value)
            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
            .map(|n| n as u32)
            .unwrap_or_default())
    }

    pub fn score<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_number(&value).unwrap_or(DEFAULT_SCORE))
    }

    pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_number(&value))
    }

    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_text(&value).unwrap_or_default())
    }

    pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_text(&value))
    }

    /// List of strings. Objects contribute their `description` member.
    pub fn texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Array(items) = value else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| {
                as_text(item).or_else(|| item.get("description").and_then(as_text))
            })
            .collect())
    }

    /// List of `T`; items of the wrong shape are dropped.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Array(items) = value else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping report entry of unexpected shape");
                    None
                }
            })
            .collect())
    }

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(serde_json::from_value(value).ok())
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
            _ => None,
        }
    }

    fn as_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
