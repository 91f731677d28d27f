//! Aggregates behind the dashboard home screen (`GET /statistics/dashboard`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub students: StudentCounts,
    #[serde(default)]
    pub programs: Vec<ProgramCount>,
    #[serde(default)]
    pub academic_years: Vec<AcademicYearCount>,
    #[serde(default)]
    pub recent_imports: Vec<RecentImport>,
    #[serde(default)]
    pub recent_students: Vec<RecentStudent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentCounts {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub expired: u64,
    pub expiring_soon: u64,
    pub new_this_month: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicYearCount {
    pub year: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentImport {
    pub id: i64,
    pub filename: String,
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub successful_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentStudent {
    pub id: i64,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub program: Option<String>,
}

impl DashboardStats {
    /// The programs with the most students, largest first.
    pub fn top_programs(&self, limit: usize) -> Vec<&ProgramCount> {
        let mut programs: Vec<&ProgramCount> = self.programs.iter().collect();
        programs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        programs.truncate(limit);
        programs
    }
}
