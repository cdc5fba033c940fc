use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DepartmentSummary {
    pub(crate) department: i16,
    pub(crate) tested_count: i64,
    pub(crate) total_score: i64,
    pub(crate) average: f64,
    pub(crate) ge90: i64,
    pub(crate) ge75: i64,
    pub(crate) ge60: i64,
}

impl DepartmentSummary {
    pub(crate) fn from_counters(
        department: i16,
        tested_count: i64,
        total_score: i64,
        ge90: i64,
        ge75: i64,
        ge60: i64,
    ) -> Self {
        let average = if tested_count > 0 { total_score as f64 / tested_count as f64 } else { 0.0 };
        Self { department, tested_count, total_score, average, ge90, ge75, ge60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SchoolSummary {
    pub(crate) tested_count: i64,
    pub(crate) total_score: i64,
    pub(crate) average: f64,
    pub(crate) ge90: i64,
    pub(crate) ge75: i64,
    pub(crate) ge60: i64,
    pub(crate) departments: Vec<DepartmentSummary>,
}

impl SchoolSummary {
    pub(crate) fn from_departments(departments: Vec<DepartmentSummary>) -> Self {
        let tested_count: i64 = departments.iter().map(|d| d.tested_count).sum();
        let total_score: i64 = departments.iter().map(|d| d.total_score).sum();
        let average = if tested_count > 0 { total_score as f64 / tested_count as f64 } else { 0.0 };

        Self {
            tested_count,
            total_score,
            average,
            ge90: departments.iter().map(|d| d.ge90).sum(),
            ge75: departments.iter().map(|d| d.ge75).sum(),
            ge60: departments.iter().map(|d| d.ge60).sum(),
            departments,
        }
    }
}
