use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use castcheck_core::guidance::{filename_components, format_volume, recommended_action};
use castcheck_core::{CastingContext, VerdictResult};

use crate::{ReportError, ReportRow};

pub const REPORT_PREFIX: &str = "casting_analysis_";
const SHEET_NAME: &str = "Casting Analysis";

const HEADERS: [&str; 6] = [
    "Rule ID",
    "Category",
    "Checklist Item",
    "Result (Yes/No)",
    "Notes / Observations",
    "Recommended Actions",
];
const WIDTHS: [f64; 6] = [10.0, 25.0, 55.0, 15.0, 60.0, 70.0];
const HEADER_ROW: u32 = 4;
const RESULT_COL: u16 = 3;

/// `casting_analysis_{material}_{volume}parts_{YYYYmmdd_HHMMSSmmm}.xlsx`
pub fn report_file_name(ctx: &CastingContext, at: DateTime<Local>) -> String {
    format!("{}.xlsx", report_stem(ctx, at))
}

fn report_stem(ctx: &CastingContext, at: DateTime<Local>) -> String {
    let (material, volume) = filename_components(ctx);
    format!(
        "{REPORT_PREFIX}{material}_{volume}parts_{}",
        at.format("%Y%m%d_%H%M%S%3f")
    )
}

/// Lay out the "Casting Analysis" sheet: three title rows, a header, then one
/// row per rule.
pub fn render(
    ctx: &CastingContext,
    rows: &[ReportRow],
    generated_at: DateTime<Local>,
) -> Result<Workbook, ReportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let last_col = (HEADERS.len() - 1) as u16;
    let title = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center);
    let subtitle = Format::new().set_font_size(10).set_align(FormatAlign::Center);
    let caption = Format::new().set_font_size(9).set_align(FormatAlign::Center);

    sheet.merge_range(
        0,
        0,
        0,
        last_col,
        &format!("CASTING DESIGN ANALYSIS - {}", ctx.casting_type),
        &title,
    )?;
    sheet.merge_range(
        1,
        0,
        1,
        last_col,
        &format!(
            "Material: {} | Volume: {} parts | Process: {}",
            ctx.material,
            format_volume(ctx.volume),
            ctx.process
        ),
        &subtitle,
    )?;
    sheet.merge_range(
        2,
        0,
        2,
        last_col,
        &format!(
            "Tolerance: {} | Surface Finish: {} | Analysis Date: {}",
            ctx.tolerance,
            ctx.surface_finish,
            generated_at.format("%Y-%m-%d %H:%M")
        ),
        &caption,
    )?;

    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4472C4))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);
    for (col, text) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(HEADER_ROW, col as u16, *text, &header)?;
    }

    let cell = Format::new()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();
    let yes = cell.clone().set_background_color(Color::RGB(0xC6EFCE));
    let no = cell.clone().set_background_color(Color::RGB(0xFFC7CE));

    for (i, row) in rows.iter().enumerate() {
        let r = HEADER_ROW + 1 + i as u32;
        let action = recommended_action(&row.rule, row.result, ctx);
        let values = [
            row.rule.id.as_str(),
            row.rule.category.as_deref().unwrap_or(""),
            row.rule.checklist_item.as_str(),
            row.result.report_label(),
            row.notes.as_str(),
            action.as_str(),
        ];
        for (col, value) in values.iter().enumerate() {
            let col = col as u16;
            let format = match (col, row.result) {
                (RESULT_COL, VerdictResult::Compliant) => &yes,
                (RESULT_COL, VerdictResult::NonCompliant) => &no,
                _ => &cell,
            };
            sheet.write_string_with_format(r, col, *value, format)?;
        }
    }

    for (col, width) in WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;

    Ok(workbook)
}

/// Render and write the report into `dir`. Never overwrites: a taken name
/// gets `_1`, `_2`, ... appended.
pub fn write_report(
    dir: &Path,
    ctx: &CastingContext,
    rows: &[ReportRow],
    generated_at: DateTime<Local>,
) -> Result<PathBuf, ReportError> {
    let bytes = render(ctx, rows, generated_at)?.save_to_buffer()?;
    let stem = report_stem(ctx, generated_at);

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{stem}.xlsx")
        } else {
            format!("{stem}_{attempt}.xlsx")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&bytes).map_err(|source| ReportError::Write {
                    path: path.clone(),
                    source,
                })?;
                tracing::info!(path = %path.display(), rows = rows.len(), "report written");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => return Err(ReportError::Write { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use castcheck_core::{Rule, Verdict};

    fn ctx() -> CastingContext {
        CastingContext {
            casting_type: "Pump Housing".into(),
            material: "Gray Cast Iron".into(),
            volume: 5000,
            process: "Sand Casting".into(),
            tolerance: "Standard".into(),
            surface_finish: "As-cast".into(),
        }
    }

    fn rows() -> Vec<ReportRow> {
        let rules = vec![
            Rule {
                id: "R1".into(),
                checklist_item: "Feed heavy sections.".into(),
                category: Some("Feeding".into()),
                severity: Some("High".into()),
            },
            Rule {
                id: "R2".into(),
                checklist_item: "Fillet internal corners.".into(),
                category: Some("Corners".into()),
                severity: None,
            },
        ];
        let verdicts = vec![Verdict::new("R2", VerdictResult::NonCompliant, "sharp")];
        aggregate(&rules, &verdicts).1
    }

    #[test]
    fn file_name_follows_convention() {
        let name = report_file_name(&ctx(), Local::now());
        assert!(name.starts_with("casting_analysis_GrayFe_5Kparts_"), "{name}");
        assert!(name.ends_with(".xlsx"));
    }

    #[test]
    fn writes_an_xlsx_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), &ctx(), &rows(), Local::now()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    fn text(range: &calamine::Range<calamine::Data>, row: u32, col: u32) -> String {
        match range.get_value((row, col)) {
            Some(calamine::Data::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    #[test]
    fn sheet_lists_every_rule_in_order_below_the_header() {
        use calamine::{open_workbook, Reader, Xlsx};

        let rules: Vec<Rule> = (1..=22)
            .map(|i| Rule {
                id: format!("R{i}"),
                checklist_item: format!("check {i}"),
                category: None,
                severity: None,
            })
            .collect();
        let verdicts: Vec<Verdict> = (1..=20)
            .map(|i| Verdict::new(format!("R{i}"), VerdictResult::Compliant, "ok"))
            .collect();
        let rows = aggregate(&rules, &verdicts).1;

        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), &ctx(), &rows, Local::now()).unwrap();
        let mut book: Xlsx<_> = open_workbook(&path).unwrap();
        let range = book.worksheet_range(SHEET_NAME).unwrap();

        assert!(text(&range, 0, 0).contains("Pump Housing"));
        let header: Vec<String> = (0..6).map(|c| text(&range, HEADER_ROW, c)).collect();
        assert_eq!(header, HEADERS);

        let first = HEADER_ROW + 1;
        let ids: Vec<String> = (first..first + 22).map(|r| text(&range, r, 0)).collect();
        let expected: Vec<String> = (1..=22).map(|i| format!("R{i}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(range.end().map(|(r, _)| r), Some(first + 21));

        assert_eq!(text(&range, first, 3), "Yes");
        for r in [first + 20, first + 21] {
            assert_eq!(text(&range, r, 3), "Needs Review");
            assert_eq!(text(&range, r, 4), "no evaluation returned");
        }
    }

    #[test]
    fn same_timestamp_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local::now();
        let first = write_report(dir.path(), &ctx(), &rows(), at).unwrap();
        let second = write_report(dir.path(), &ctx(), &rows(), at).unwrap();
        assert_ne!(first, second);
        let second_name = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(second_name.ends_with("_1.xlsx"), "{second_name}");
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_report(&missing, &ctx(), &rows(), Local::now()).unwrap_err();
        assert!(matches!(err, ReportError::Write { .. }));
    }
}
