pub mod workbook;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use castcheck_core::{Rule, Verdict, VerdictResult};

pub use workbook::{report_file_name, write_report, REPORT_PREFIX};

/// Notes placed on rules the model never answered.
pub const MISSING_VERDICT_NOTES: &str = "no evaluation returned";

/// Rows copied into the API summary.
pub const DETAIL_PREVIEW_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to build workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One line of the report: a rule and what the model said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub rule: Rule,
    pub result: VerdictResult,
    pub notes: String,
    /// False when the row was filled in because the model skipped the rule.
    pub evaluated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultTally {
    pub compliant: usize,
    pub non_compliant: usize,
    pub needs_review: usize,
}

impl ResultTally {
    fn count(&mut self, result: VerdictResult) {
        match result {
            VerdictResult::Compliant => self.compliant += 1,
            VerdictResult::NonCompliant => self.non_compliant += 1,
            VerdictResult::NeedsReview => self.needs_review += 1,
        }
    }
}

/// Preview row, keyed the way the report columns are titled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    #[serde(rename = "Rule ID")]
    pub rule_id: String,
    #[serde(rename = "Checklist Item")]
    pub checklist_item: String,
    #[serde(rename = "Result (Yes/No)")]
    pub result: String,
    #[serde(rename = "Notes / Observations")]
    pub notes: String,
}

impl From<&ReportRow> for DetailRow {
    fn from(row: &ReportRow) -> Self {
        Self {
            rule_id: row.rule.id.clone(),
            checklist_item: row.rule.checklist_item.clone(),
            result: row.result.report_label().to_string(),
            notes: row.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_checks: usize,
    pub successful_evaluations: usize,
    pub results: ResultTally,
    /// Set once the workbook is on disk.
    pub output_file: Option<String>,
    pub details: Vec<DetailRow>,
    /// Verdicts that matched no rule, or repeated one.
    pub unmatched_verdicts: usize,
}

/// Join verdicts onto rules in rule order. Rules without a verdict become
/// `NeedsReview`; the first verdict for a rule id wins.
pub fn aggregate(rules: &[Rule], verdicts: &[Verdict]) -> (Summary, Vec<ReportRow>) {
    let mut by_id: HashMap<&str, &Verdict> = HashMap::with_capacity(verdicts.len());
    for v in verdicts {
        by_id.entry(v.rule_id.as_str()).or_insert(v);
    }

    let mut tally = ResultTally::default();
    let mut matched = 0;
    let rows: Vec<ReportRow> = rules
        .iter()
        .map(|rule| {
            let row = match by_id.get(rule.id.as_str()) {
                Some(v) => {
                    matched += 1;
                    ReportRow {
                        rule: rule.clone(),
                        result: v.result,
                        notes: v.notes.clone(),
                        evaluated: true,
                    }
                }
                None => ReportRow {
                    rule: rule.clone(),
                    result: VerdictResult::NeedsReview,
                    notes: MISSING_VERDICT_NOTES.to_string(),
                    evaluated: false,
                },
            };
            tally.count(row.result);
            row
        })
        .collect();

    let summary = Summary {
        total_checks: rules.len(),
        successful_evaluations: matched,
        results: tally,
        output_file: None,
        details: rows.iter().take(DETAIL_PREVIEW_ROWS).map(DetailRow::from).collect(),
        unmatched_verdicts: verdicts.len() - matched,
    };
    if summary.successful_evaluations < summary.total_checks {
        tracing::warn!(
            missing = summary.total_checks - summary.successful_evaluations,
            "rules without a model verdict marked for review"
        );
    }
    (summary, rows)
}
