use crate::model::{SchoolClass, Student};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GradeLabel {
    #[serde(rename = "Excellent")]
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Acceptable")]
    Acceptable,
    #[serde(rename = "Weak")]
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Arabic,
    English,
}

impl Locale {
    pub fn parse(s: &str) -> Option<Locale> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ar" | "arabic" => Some(Locale::Arabic),
            "en" | "english" => Some(Locale::English),
            _ => None,
        }
    }
}

impl GradeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeLabel::Excellent => "Excellent",
            GradeLabel::VeryGood => "Very Good",
            GradeLabel::Good => "Good",
            GradeLabel::Acceptable => "Acceptable",
            GradeLabel::Weak => "Weak",
        }
    }

    pub fn arabic(self) -> &'static str {
        match self {
            GradeLabel::Excellent => "ممتاز",
            GradeLabel::VeryGood => "جيد جداً",
            GradeLabel::Good => "جيد",
            GradeLabel::Acceptable => "مقبول",
            GradeLabel::Weak => "ضعيف",
        }
    }

    pub fn localized(self, locale: Locale) -> &'static str {
        match locale {
            Locale::Arabic => self.arabic(),
            Locale::English => self.as_str(),
        }
    }
}

pub const EXCELLENT_MIN: f64 = 90.0;
pub const VERY_GOOD_MIN: f64 = 75.0;
pub const GOOD_MIN: f64 = 60.0;
pub const ACCEPTABLE_MIN: f64 = 50.0;

/// Bands are inclusive lower bounds checked from the top down.
pub fn grade_label(percentage: f64) -> GradeLabel {
    if percentage >= EXCELLENT_MIN {
        GradeLabel::Excellent
    } else if percentage >= VERY_GOOD_MIN {
        GradeLabel::VeryGood
    } else if percentage >= GOOD_MIN {
        GradeLabel::Good
    } else if percentage >= ACCEPTABLE_MIN {
        GradeLabel::Acceptable
    } else {
        GradeLabel::Weak
    }
}

/// 2-decimal rounding: scale by 100, round half away from zero, scale back.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithStats {
    #[serde(flatten)]
    pub student: Student,
    pub total_score: f64,
    pub max_possible_score: f64,
    pub percentage: f64,
    pub grade_label: GradeLabel,
}

/// Score the student against the class's current subject list.
///
/// Entries in `student.scores` for subjects the class no longer has are
/// ignored; subjects without an entry count as 0.
pub fn compute_stats(student: &Student, class: &SchoolClass) -> StudentWithStats {
    let mut total_score = 0.0;
    let mut max_possible_score = 0.0;
    for subject in &class.subjects {
        total_score += subject_score(student, &subject.id);
        max_possible_score += subject.max_score;
    }

    let percentage = if max_possible_score > 0.0 {
        round_off_2_decimals(total_score / max_possible_score * 100.0)
    } else {
        0.0
    };

    StudentWithStats {
        student: student.clone(),
        total_score,
        max_possible_score,
        percentage,
        grade_label: grade_label(percentage),
    }
}

pub fn subject_score(student: &Student, subject_id: &str) -> f64 {
    match student.scores.get(subject_id) {
        Some(v) if v.is_finite() => *v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scores, Subject};

    fn subject(id: &str, max: f64) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_string(),
            max_score: max,
        }
    }

    fn student(scores: &[(&str, f64)]) -> Student {
        Student {
            id: "s1".into(),
            name: "Ali".into(),
            class_id: "c1".into(),
            scores: scores
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<Scores>(),
        }
    }

    fn class_5a() -> SchoolClass {
        SchoolClass {
            id: "c1".into(),
            name: "5A".into(),
            subjects: vec![subject("math", 100.0), subject("sci", 50.0)],
        }
    }

    #[test]
    fn scenario_5a_ali() {
        let s = compute_stats(&student(&[("math", 90.0), ("sci", 40.0)]), &class_5a());
        assert_eq!(s.total_score, 130.0);
        assert_eq!(s.max_possible_score, 150.0);
        assert_eq!(s.percentage, 86.67);
        assert_eq!(s.grade_label, GradeLabel::VeryGood);
    }

    #[test]
    fn zero_subjects_means_zero_percentage() {
        let class = SchoolClass {
            id: "c1".into(),
            name: "Empty".into(),
            subjects: vec![],
        };
        let s = compute_stats(&student(&[("math", 90.0)]), &class);
        assert_eq!(s.total_score, 0.0);
        assert_eq!(s.percentage, 0.0);
        assert_eq!(s.grade_label, GradeLabel::Weak);
    }

    #[test]
    fn stale_and_missing_subjects() {
        let s = compute_stats(
            &student(&[("math", 50.0), ("history", 99.0)]),
            &class_5a(),
        );
        // history is not a class subject, sci is missing
        assert_eq!(s.total_score, 50.0);
        assert_eq!(s.percentage, 33.33);
    }

    #[test]
    fn non_finite_scores_count_as_zero() {
        let s = compute_stats(
            &student(&[("math", f64::NAN), ("sci", f64::INFINITY)]),
            &class_5a(),
        );
        assert_eq!(s.total_score, 0.0);
    }

    #[test]
    fn grade_boundaries_are_closed_below() {
        assert_eq!(grade_label(100.0), GradeLabel::Excellent);
        assert_eq!(grade_label(90.0), GradeLabel::Excellent);
        assert_eq!(grade_label(89.99), GradeLabel::VeryGood);
        assert_eq!(grade_label(75.0), GradeLabel::VeryGood);
        assert_eq!(grade_label(74.99), GradeLabel::Good);
        assert_eq!(grade_label(60.0), GradeLabel::Good);
        assert_eq!(grade_label(59.99), GradeLabel::Acceptable);
        assert_eq!(grade_label(50.0), GradeLabel::Acceptable);
        assert_eq!(grade_label(49.99), GradeLabel::Weak);
        assert_eq!(grade_label(0.0), GradeLabel::Weak);
    }

    #[test]
    fn rounding_behavior() {
        assert_eq!(round_off_2_decimals(200.0 / 3.0), 66.67);
        assert_eq!(round_off_2_decimals(0.125), 0.13);
        // 1.005 is stored just below the tie
        assert_eq!(round_off_2_decimals(1.005), 1.0);
        assert_eq!(round_off_2_decimals(90.0), 90.0);
    }

    #[test]
    fn rounded_percentage_drives_the_label() {
        // 179.991 / 200 = 89.9955% -> 90.0 after rounding
        let class = SchoolClass {
            id: "c1".into(),
            name: "x".into(),
            subjects: vec![subject("a", 200.0)],
        };
        let s = compute_stats(&student(&[("a", 179.991)]), &class);
        assert_eq!(s.percentage, 90.0);
        assert_eq!(s.grade_label, GradeLabel::Excellent);
    }

    #[test]
    fn labels_localize() {
        assert_eq!(GradeLabel::VeryGood.localized(Locale::English), "Very Good");
        assert_eq!(GradeLabel::VeryGood.localized(Locale::Arabic), "جيد جداً");
        assert_eq!(Locale::parse("EN"), Some(Locale::English));
        assert_eq!(Locale::parse("fr"), None);
    }
}
