//! Spreadsheet-HTML and CSV renderings of a ranked class, plus the CSV
//! reader used for bulk score import.
//!
//! CSV fields are never quoted: a name containing a comma shifts every
//! following column of its row. Import maps score columns to subjects by
//! position in the class's current subject order, not by header text.

use crate::calc::{self, Locale};
use crate::model::{self, SchoolClass, Scores};
use crate::ranking::RankedStudent;
use serde::Serialize;
use std::fmt::Write as _;

pub const XLS_MIME_TYPE: &str = "application/vnd.ms-excel";
pub const XLS_FILE_SUFFIX: &str = "_نتائج.xls";
const CSV_BOM: char = '\u{feff}';

const SHADE_EXCELLENT: &str = "#d1fae5";
const SHADE_VERY_GOOD: &str = "#dbeafe";
const SHADE_FAILING: &str = "#fee2e2";
const SHADE_NONE: &str = "#ffffff";

struct HeaderText {
    rank: &'static str,
    name: &'static str,
    total: &'static str,
    percentage: &'static str,
    grade: &'static str,
    title: &'static str,
}

fn header_text(locale: Locale) -> HeaderText {
    match locale {
        Locale::Arabic => HeaderText {
            rank: "الترتيب",
            name: "الاسم",
            total: "المجموع",
            percentage: "النسبة %",
            grade: "التقدير",
            title: "كشف درجات",
        },
        Locale::English => HeaderText {
            rank: "Rank",
            name: "Name",
            total: "Total",
            percentage: "Percentage %",
            grade: "Grade",
            title: "Grade sheet",
        },
    }
}

/// Column headers shared by the HTML and CSV outputs.
pub fn export_headers(class: &SchoolClass, locale: Locale) -> Vec<String> {
    let t = header_text(locale);
    let mut out = vec![t.rank.to_string(), t.name.to_string()];
    out.extend(
        class
            .subjects
            .iter()
            .map(|s| format!("{} ({})", s.name, s.max_score)),
    );
    out.push(t.total.to_string());
    out.push(t.percentage.to_string());
    out.push(t.grade.to_string());
    out
}

/// Download name for the spreadsheet export: `<class>_نتائج.xls`.
pub fn xls_file_name(class: &SchoolClass) -> String {
    format!("{}{}", class.name, XLS_FILE_SUFFIX)
}

/// Background colour of the grade cell. Uses the grade calculator's bands.
pub fn grade_shade(percentage: f64) -> &'static str {
    if percentage >= calc::EXCELLENT_MIN {
        SHADE_EXCELLENT
    } else if percentage >= calc::VERY_GOOD_MIN {
        SHADE_VERY_GOOD
    } else if percentage < calc::ACCEPTABLE_MIN {
        SHADE_FAILING
    } else {
        SHADE_NONE
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn score_cells(row: &RankedStudent, class: &SchoolClass) -> Vec<f64> {
    class
        .subjects
        .iter()
        .map(|s| calc::subject_score(&row.stats.student, &s.id))
        .collect()
}

/// Excel-readable HTML workbook with a right-to-left worksheet.
pub fn render_xls_html(rows: &[RankedStudent], class: &SchoolClass, locale: Locale) -> String {
    let t = header_text(locale);
    let class_name = escape_html(&class.name);

    let mut header_cells = String::new();
    for h in export_headers(class, locale) {
        let _ = write!(header_cells, "<th>{}</th>", escape_html(&h));
    }

    let mut body = String::new();
    for row in rows {
        let mut subject_cells = String::new();
        for v in score_cells(row, class) {
            let _ = write!(subject_cells, "<td style=\"text-align:center;\">{}</td>", v);
        }
        let _ = write!(
            body,
            "
      <tr>
        <td style=\"text-align:center; font-weight:bold;\">{rank}</td>
        <td style=\"text-align:right;\">{name}</td>
        {subjects}
        <td style=\"text-align:center; font-weight:bold;\">{total}</td>
        <td style=\"text-align:center;\">{pct}%</td>
        <td style=\"text-align:center; background-color:{shade};\">{grade}</td>
      </tr>",
            rank = escape_html(&row.rank_label),
            name = escape_html(&row.stats.student.name),
            subjects = subject_cells,
            total = row.stats.total_score,
            pct = row.stats.percentage,
            shade = grade_shade(row.stats.percentage),
            grade = row.stats.grade_label.localized(locale),
        );
    }

    format!(
        r#"<html xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel" xmlns="http://www.w3.org/TR/REC-html40">
<head>
  <meta charset="UTF-8">
  <!--[if gte mso 9]>
  <xml>
    <x:ExcelWorkbook>
      <x:ExcelWorksheets>
        <x:ExcelWorksheet>
          <x:Name>{class_name}</x:Name>
          <x:WorksheetOptions>
            <x:DisplayRightToLeft/>
          </x:WorksheetOptions>
        </x:ExcelWorksheet>
      </x:ExcelWorksheets>
    </x:ExcelWorkbook>
  </xml>
  <![endif]-->
  <style>
    body {{ font-family: 'Arial', sans-serif; }}
    table {{ border-collapse: collapse; width: 100%; }}
    th, td {{ border: 1px solid #000000; padding: 8px; font-size: 12pt; }}
    th {{ background-color: #f3f4f6; font-weight: bold; text-align: center; }}
  </style>
</head>
<body dir="rtl">
  <h2 style="text-align: center; margin-bottom: 20px;">{title}: {class_name}</h2>
  <table>
    <thead>
      <tr>{header_cells}</tr>
    </thead>
    <tbody>{body}
    </tbody>
  </table>
</body>
</html>
"#,
        class_name = class_name,
        title = t.title,
        header_cells = header_cells,
        body = body,
    )
}

/// BOM-prefixed CSV, one unquoted row per ranked student.
pub fn encode_csv(rows: &[RankedStudent], class: &SchoolClass, locale: Locale) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("{}{}", CSV_BOM, export_headers(class, locale).join(",")));
    for row in rows {
        let mut fields: Vec<String> = vec![row.rank_label.clone(), row.stats.student.name.clone()];
        fields.extend(score_cells(row, class).into_iter().map(|v| v.to_string()));
        fields.push(row.stats.total_score.to_string());
        fields.push(format!("{}%", row.stats.percentage));
        fields.push(row.stats.grade_label.localized(locale).to_string());
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedStudent {
    pub name: String,
    pub class_id: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ColumnMismatch {
    /// Header carries a different number of subject columns than the class.
    #[serde(rename_all = "camelCase")]
    Header {
        expected_subjects: usize,
        found_subjects: usize,
    },
    /// Data row too short to hold every subject score.
    #[serde(rename_all = "camelCase")]
    Row {
        line: usize,
        expected_columns: usize,
        found_columns: usize,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImport {
    pub students: Vec<ImportedStudent>,
    pub mismatches: Vec<ColumnMismatch>,
}

impl CsvImport {
    pub fn is_aligned(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Number of non-subject columns in an exported CSV (rank, name, total,
/// percentage, grade).
const FIXED_COLUMNS: usize = 5;

/// Name given to an imported row whose name cell is blank.
pub const UNNAMED_STUDENT: &str = "Unknown";

/// A header lines up when it is this class's own export header (either
/// locale), or has exactly the rank, name and score columns with or without
/// the three trailing summary columns.
fn header_matches(header: &str, class: &SchoolClass) -> bool {
    let n_subjects = class.subjects.len();
    let own_export = [Locale::Arabic, Locale::English]
        .into_iter()
        .any(|locale| export_headers(class, locale).join(",") == header);
    let cols = header.split(',').count();
    own_export || cols == 2 + n_subjects || cols == FIXED_COLUMNS + n_subjects
}

/// Parse CSV rows into partial student records for `class`.
///
/// Line 1 is the header. Blank lines are skipped, as are rows with fewer
/// than two cells. Score cells that are missing or not numbers become 0,
/// and a blank name becomes [`UNNAMED_STUDENT`].
pub fn decode_csv(text: &str, class: &SchoolClass) -> CsvImport {
    let n_subjects = class.subjects.len();
    let mut out = CsvImport::default();

    let mut lines = text
        .split('\n')
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    if let Some((_, header)) = lines.next() {
        let header = header.trim_start_matches(CSV_BOM);
        if !header_matches(header, class) {
            out.mismatches.push(ColumnMismatch::Header {
                expected_subjects: n_subjects,
                found_subjects: header.split(',').count().saturating_sub(FIXED_COLUMNS),
            });
        }
    }

    for (line_no, line) in lines {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 2 {
            continue;
        }
        if cols.len() < 2 + n_subjects {
            out.mismatches.push(ColumnMismatch::Row {
                line: line_no,
                expected_columns: 2 + n_subjects,
                found_columns: cols.len(),
            });
        }

        let mut scores = Scores::new();
        for (idx, subject) in class.subjects.iter().enumerate() {
            let v = cols.get(2 + idx).map(|c| model::parse_score(c)).unwrap_or(0.0);
            scores.insert(subject.id.clone(), v);
        }

        let name = match cols[1].trim() {
            "" => UNNAMED_STUDENT,
            n => n,
        };
        out.students.push(ImportedStudent {
            name: name.to_string(),
            class_id: class.id.clone(),
            scores,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Student, Subject};
    use crate::ranking;

    fn class_5a() -> SchoolClass {
        SchoolClass {
            id: "c5a".into(),
            name: "5A".into(),
            subjects: vec![
                Subject {
                    id: "math".into(),
                    name: "Math".into(),
                    max_score: 100.0,
                },
                Subject {
                    id: "sci".into(),
                    name: "Science".into(),
                    max_score: 50.0,
                },
            ],
        }
    }

    fn student(id: &str, name: &str, math: f64, sci: f64) -> Student {
        let mut scores = Scores::new();
        scores.insert("math".into(), math);
        scores.insert("sci".into(), sci);
        Student {
            id: id.into(),
            name: name.into(),
            class_id: "c5a".into(),
            scores,
        }
    }

    fn ranked() -> Vec<RankedStudent> {
        ranking::rank_class(
            &class_5a(),
            &[
                student("s1", "Ali", 90.0, 40.0),
                student("s2", "Huda", 95.0, 48.5),
                student("s3", "Omar", 20.0, 10.0),
            ],
        )
    }

    #[test]
    fn header_order() {
        let h = export_headers(&class_5a(), Locale::English);
        assert_eq!(
            h,
            vec![
                "Rank",
                "Name",
                "Math (100)",
                "Science (50)",
                "Total",
                "Percentage %",
                "Grade"
            ]
        );
        let ar = export_headers(&class_5a(), Locale::Arabic);
        assert_eq!(ar[0], "الترتيب");
        assert_eq!(ar[6], "التقدير");
    }

    #[test]
    fn csv_encode_layout() {
        let csv = encode_csv(&ranked(), &class_5a(), Locale::English);
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "\u{feff}Rank,Name,Math (100),Science (50),Total,Percentage %,Grade"
        );
        assert_eq!(lines[1], "1,Huda,95,48.5,143.5,95.67%,Excellent");
        assert_eq!(lines[2], "2,Ali,90,40,130,86.67%,Very Good");
        assert_eq!(lines[3], "3,Omar,20,10,30,20%,Weak");
    }

    #[test]
    fn csv_roundtrip_restores_scores() {
        let class = class_5a();
        let rows = ranked();
        let decoded = decode_csv(&encode_csv(&rows, &class, Locale::Arabic), &class);
        assert!(decoded.is_aligned(), "{:?}", decoded.mismatches);
        assert_eq!(decoded.students.len(), rows.len());
        for (imported, row) in decoded.students.iter().zip(rows.iter()) {
            assert_eq!(imported.name, row.stats.student.name);
            assert_eq!(imported.class_id, class.id);
            assert_eq!(imported.scores, row.stats.student.scores);
        }
    }

    #[test]
    fn csv_decode_defaults_and_short_rows() {
        let class = class_5a();
        let text = "Rank,Name,Math (100),Science (50),Total,Percentage %,Grade\r\n\
                    1,Sara,abc,30\r\n\
                    \r\n\
                    2,Lina\n\
                    lonely\n";
        let decoded = decode_csv(text, &class);
        assert_eq!(decoded.students.len(), 2);
        assert_eq!(decoded.students[0].name, "Sara");
        assert_eq!(decoded.students[0].scores["math"], 0.0);
        assert_eq!(decoded.students[0].scores["sci"], 30.0);
        assert_eq!(decoded.students[1].scores["math"], 0.0);
        assert_eq!(decoded.students[1].scores["sci"], 0.0);
        assert_eq!(
            decoded.mismatches,
            vec![ColumnMismatch::Row {
                line: 4,
                expected_columns: 4,
                found_columns: 2
            }]
        );
    }

    #[test]
    fn csv_header_mismatch_is_reported() {
        let class = class_5a();
        let text = "Rank,Name,Math (100),Total,Percentage %,Grade\n1,Ali,90,90,90%,Excellent\n";
        let decoded = decode_csv(text, &class);
        assert_eq!(
            decoded.mismatches,
            vec![ColumnMismatch::Header {
                expected_subjects: 2,
                found_subjects: 1
            }]
        );
        // positional mapping still applies
        assert_eq!(decoded.students[0].scores["math"], 90.0);
        assert_eq!(decoded.students[0].scores["sci"], 90.0);
    }

    #[test]
    fn csv_headers_without_summary_columns_line_up() {
        let class = class_5a();
        let decoded = decode_csv("Rank,Name,Math,Science\n1,Ali,90,40\n", &class);
        assert!(decoded.is_aligned(), "{:?}", decoded.mismatches);
        assert_eq!(decoded.students[0].scores["math"], 90.0);
        assert_eq!(decoded.students[0].scores["sci"], 40.0);
    }

    #[test]
    fn csv_own_export_header_lines_up_with_commas_in_subject_names() {
        let mut class = class_5a();
        class.subjects[0].name = "Math, Algebra".into();
        let rows = ranking::rank_class(&class, &[student("s1", "Ali", 90.0, 40.0)]);
        let csv = encode_csv(&rows, &class, Locale::English);
        let decoded = decode_csv(&csv, &class);
        assert!(decoded.is_aligned(), "{:?}", decoded.mismatches);
        assert_eq!(decoded.students.len(), 1);
    }

    #[test]
    fn csv_blank_name_becomes_placeholder() {
        let class = class_5a();
        let text = "Rank,Name,Math (100),Science (50),Total,Percentage %,Grade\n1,  ,90,40\n2,Ali,80,30\n";
        let decoded = decode_csv(text, &class);
        assert_eq!(decoded.students[0].name, UNNAMED_STUDENT);
        assert_eq!(decoded.students[0].scores["math"], 90.0);
        assert_eq!(decoded.students[1].name, "Ali");
    }

    #[test]
    fn stale_scores_are_not_exported() {
        let class = class_5a();
        let mut s = student("s1", "Ali", 90.0, 40.0);
        s.scores.insert("history".into(), 77.0);
        let rows = ranking::rank_class(&class, &[s]);
        let csv = encode_csv(&rows, &class, Locale::English);
        assert!(!csv.contains("77"));
        assert_eq!(rows[0].stats.total_score, 130.0);
    }

    #[test]
    fn zero_subject_class_still_renders_rows() {
        let class = SchoolClass {
            id: "c0".into(),
            name: "Empty".into(),
            subjects: vec![],
        };
        let s = Student {
            id: "s1".into(),
            name: "Ali".into(),
            class_id: "c0".into(),
            scores: Scores::new(),
        };
        let rows = ranking::rank_class(&class, &[s]);
        let csv = encode_csv(&rows, &class, Locale::English);
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines[0], "\u{feff}Rank,Name,Total,Percentage %,Grade");
        assert_eq!(lines[1], "1,Ali,0,0%,Weak");
        let html = render_xls_html(&rows, &class, Locale::English);
        assert!(html.contains("<th>Rank</th><th>Name</th><th>Total</th>"));
    }

    #[test]
    fn html_has_rtl_sheet_and_shading() {
        let html = render_xls_html(&ranked(), &class_5a(), Locale::Arabic);
        assert!(html.contains("<meta charset=\"UTF-8\">"));
        assert!(html.contains("<x:DisplayRightToLeft/>"));
        assert!(html.contains("<x:Name>5A</x:Name>"));
        assert!(html.contains("<th>Math (100)</th><th>Science (50)</th>"));
        assert!(html.contains("background-color:#d1fae5;\">ممتاز"));
        assert!(html.contains("background-color:#dbeafe;\">جيد جداً"));
        assert!(html.contains("background-color:#fee2e2;\">ضعيف"));
        let huda = html.find("Huda").expect("Huda row");
        let omar = html.find("Omar").expect("Omar row");
        assert!(huda < omar);
    }

    #[test]
    fn html_escapes_names() {
        let class = class_5a();
        let rows = ranking::rank_class(&class, &[student("s1", "<b>Ali</b>", 1.0, 1.0)]);
        let html = render_xls_html(&rows, &class, Locale::English);
        assert!(html.contains("&lt;b&gt;Ali&lt;/b&gt;"));
    }

    #[test]
    fn shade_bands() {
        assert_eq!(grade_shade(90.0), "#d1fae5");
        assert_eq!(grade_shade(89.99), "#dbeafe");
        assert_eq!(grade_shade(75.0), "#dbeafe");
        assert_eq!(grade_shade(60.0), "#ffffff");
        assert_eq!(grade_shade(50.0), "#ffffff");
        assert_eq!(grade_shade(49.99), "#fee2e2");
        assert_eq!(grade_shade(0.0), "#fee2e2");
    }

    #[test]
    fn xls_file_name_uses_class_name() {
        assert_eq!(xls_file_name(&class_5a()), "5A_نتائج.xls");
    }
}
