use crate::calc::{self, GradeLabel, StudentWithStats};
use crate::model::{SchoolClass, Student};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A subject score below this fraction of the maximum is a fail.
pub const PASS_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolOverview {
    pub class_count: usize,
    pub student_count: usize,
    pub orphan_count: usize,
    pub school_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalysis {
    pub id: String,
    pub name: String,
    pub avg_score: f64,
    pub max_score: f64,
    pub avg_percentage: f64,
    pub pass_count: usize,
    pub fail_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDistribution {
    pub excellent: usize,
    pub very_good: usize,
    pub good: usize,
    pub acceptable: usize,
    pub weak: usize,
}

impl GradeDistribution {
    fn add(&mut self, label: GradeLabel) {
        match label {
            GradeLabel::Excellent => self.excellent += 1,
            GradeLabel::VeryGood => self.very_good += 1,
            GradeLabel::Good => self.good += 1,
            GradeLabel::Acceptable => self.acceptable += 1,
            GradeLabel::Weak => self.weak += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStats {
    pub class_id: String,
    pub student_count: usize,
    pub subjects: Vec<SubjectAnalysis>,
    pub hardest_subject: Option<SubjectAnalysis>,
    pub easiest_subject: Option<SubjectAnalysis>,
    pub grade_distribution: GradeDistribution,
}

/// Stats for every student whose class still exists. Orphans are dropped.
pub fn students_with_stats(classes: &[SchoolClass], students: &[Student]) -> Vec<StudentWithStats> {
    let by_id: HashMap<&str, &SchoolClass> = classes.iter().map(|c| (c.id.as_str(), c)).collect();
    students
        .iter()
        .filter_map(|s| {
            by_id
                .get(s.class_id.as_str())
                .map(|c| calc::compute_stats(s, c))
        })
        .collect()
}

pub fn school_overview(classes: &[SchoolClass], students: &[Student]) -> SchoolOverview {
    let scored = students_with_stats(classes, students);
    let school_average = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|s| s.percentage).sum::<f64>() / scored.len() as f64
    };
    SchoolOverview {
        class_count: classes.len(),
        student_count: scored.len(),
        orphan_count: students.len() - scored.len(),
        school_average,
    }
}

pub fn class_stats(class: &SchoolClass, students: &[Student]) -> ClassStats {
    let members: Vec<StudentWithStats> = students
        .iter()
        .filter(|s| s.class_id == class.id)
        .map(|s| calc::compute_stats(s, class))
        .collect();

    let subjects: Vec<SubjectAnalysis> = class
        .subjects
        .iter()
        .map(|subj| {
            let scores: Vec<f64> = members
                .iter()
                .map(|m| calc::subject_score(&m.student, &subj.id))
                .collect();
            let avg_score = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            let ratio = |v: f64| {
                if subj.max_score > 0.0 {
                    v / subj.max_score
                } else {
                    0.0
                }
            };
            let fail_count = scores.iter().filter(|v| ratio(**v) < PASS_FRACTION).count();
            SubjectAnalysis {
                id: subj.id.clone(),
                name: subj.name.clone(),
                avg_score,
                max_score: subj.max_score,
                avg_percentage: ratio(avg_score) * 100.0,
                pass_count: scores.len() - fail_count,
                fail_count,
            }
        })
        .collect();

    // Stable ascending sort: hardest is the first lowest, easiest the last highest.
    let mut by_difficulty = subjects.clone();
    by_difficulty.sort_by(|a, b| {
        a.avg_percentage
            .partial_cmp(&b.avg_percentage)
            .unwrap_or(Ordering::Equal)
    });

    let mut grade_distribution = GradeDistribution::default();
    for m in &members {
        grade_distribution.add(m.grade_label);
    }

    ClassStats {
        class_id: class.id.clone(),
        student_count: members.len(),
        hardest_subject: by_difficulty.first().cloned(),
        easiest_subject: by_difficulty.last().cloned(),
        subjects,
        grade_distribution,
    }
}
