use crate::calc::{self, StudentWithStats};
use crate::model::{SchoolClass, Student};
use serde::Serialize;
use std::cmp::Ordering;

/// Marker appended to the rank label of a student tied with the one above.
pub const DUPLICATE_MARKER: &str = "مكرر";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    #[serde(flatten)]
    pub stats: StudentWithStats,
    pub rank: u32,
    pub rank_label: String,
}

/// Rank one class: drop students of other classes, recompute every
/// student's stats against `class`, then assign ranks.
pub fn rank_class(class: &SchoolClass, students: &[Student]) -> Vec<RankedStudent> {
    let with_stats = students
        .iter()
        .filter(|s| s.class_id == class.id)
        .map(|s| calc::compute_stats(s, class))
        .collect();
    assign_ranks(with_stats)
}

/// Competition ranking over total score.
///
/// Stable sort descending. Equal totals share the predecessor's rank and get
/// the duplicate marker; the next lower total jumps to its 1-based position,
/// so `[80, 80, 70]` ranks `1, 1, 3`.
pub fn assign_ranks(mut students: Vec<StudentWithStats>) -> Vec<RankedStudent> {
    students.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });

    let mut out: Vec<RankedStudent> = Vec::with_capacity(students.len());
    let mut prev: Option<(f64, u32)> = None;
    for (i, stats) in students.into_iter().enumerate() {
        let (rank, rank_label) = match prev {
            Some((prev_total, prev_rank)) if stats.total_score == prev_total => {
                (prev_rank, format!("{} {}", prev_rank, DUPLICATE_MARKER))
            }
            _ => {
                let rank = (i + 1) as u32;
                (rank, rank.to_string())
            }
        };
        prev = Some((stats.total_score, rank));
        out.push(RankedStudent {
            stats,
            rank,
            rank_label,
        });
    }
    out
}

/// Case-insensitive name filter applied after ranking.
pub fn filter_by_name(ranked: Vec<RankedStudent>, query: &str) -> Vec<RankedStudent> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return ranked;
    }
    ranked
        .into_iter()
        .filter(|r| r.stats.student.name.to_lowercase().contains(&q))
        .collect()
}
