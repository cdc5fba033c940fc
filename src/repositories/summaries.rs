use crate::core::state::AppState;
use crate::db::models::Student;
use crate::repositories::{students, RepoError};
use crate::schemas::summary::{DepartmentSummary, SchoolSummary};

const SCHOOL_KEY: &str = "summary:school";

fn key(department: i16) -> String {
    format!("summary:{department}")
}

/// Folds one freshly scored student into the department aggregate. Every
/// field is an add-only counter, so updates from different students
/// commute and need no cross-student lock. Called exactly once per
/// transition into `Tested`; the per-student submission lock guarantees
/// the once.
pub(crate) async fn apply_student(state: &AppState, student: &Student) -> Result<(), RepoError> {
    let score = i64::from(student.score.unwrap_or(0));
    let fields = [
        ("tested_count", 1),
        ("total_score", score),
        ("ge90", i64::from(score >= 90)),
        ("ge75", i64::from(score >= 75)),
        ("ge60", i64::from(score >= 60)),
    ];

    state.redis().hash_increment(&key(student.department), &fields).await?;
    Ok(())
}

pub(crate) async fn department(
    state: &AppState,
    department: i16,
) -> Result<DepartmentSummary, RepoError> {
    let fields = state.redis().hash_get_all(&key(department)).await?;
    let field = |name: &str| fields.get(name).copied().unwrap_or(0);

    Ok(DepartmentSummary::from_counters(
        department,
        field("tested_count"),
        field("total_score"),
        field("ge90"),
        field("ge75"),
        field("ge60"),
    ))
}

/// School-wide roll-up across all known departments, cached with the
/// configured expiry so the counselor dashboard does not hammer the
/// per-department hashes.
pub(crate) async fn school(state: &AppState) -> Result<SchoolSummary, RepoError> {
    if let Some(cached) = state.redis().get_json::<SchoolSummary>(SCHOOL_KEY).await? {
        return Ok(cached);
    }

    let departments = students::distinct_departments(state.db()).await?;
    let mut rows = Vec::with_capacity(departments.len());
    for dept in departments {
        rows.push(department(state, dept).await?);
    }

    let summary = SchoolSummary::from_departments(rows);
    let ttl = state.settings().contest().summary_expire_minutes * 60;
    state.redis().set_json_ex(SCHOOL_KEY, &summary, ttl).await?;

    Ok(summary)
}
