use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "lenient_number")]
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

pub type Scores = BTreeMap<String, f64>;

/// Raw student input. Totals, grades and ranks are never stored here; see
/// `calc::compute_stats` and `ranking::rank_class` for the projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_id: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub scores: Scores,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolSettings {
    pub school_name: String,
    pub principal_name: String,
    pub academic_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Full-tenant backup as written by `backup.export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub timestamp: String,
    #[serde(default)]
    pub settings: Option<SchoolSettings>,
    pub classes: Vec<SchoolClass>,
    pub students: Vec<Student>,
}

/// Reads one score cell. Numbers pass through, numeric strings are parsed,
/// everything else (including NaN and infinities) is 0.
pub fn score_from_json(v: &serde_json::Value) -> f64 {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => parse_score(s),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Text to score. Reads the leading decimal number and ignores whatever
/// follows it, so `"90abc"` is 90 and `"12.5 kg"` is 12.5. No leading number
/// gives 0.
pub fn parse_score(s: &str) -> f64 {
    match numeric_prefix(s.trim()).parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Longest prefix of the form `[+-]digits[.digits][e[+-]digits]`.
fn numeric_prefix(s: &str) -> &str {
    let b = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    let mut end = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if b.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return "";
    }
    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(b.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    &s[..end]
}

pub fn scores_from_json(v: &serde_json::Value) -> Scores {
    let mut out = Scores::new();
    if let Some(obj) = v.as_object() {
        for (k, cell) in obj {
            out.insert(k.clone(), score_from_json(cell));
        }
    }
    out
}

fn lenient_scores<'de, D>(deserializer: D) -> Result<Scores, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(scores_from_json(&raw))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(score_from_json(&raw))
}
