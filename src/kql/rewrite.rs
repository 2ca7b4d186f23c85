use super::logical::QueryPlan;

/// Caps the row count of plans that set no limit of their own.
pub fn apply_row_limit(plan: &mut QueryPlan, default_limit: u64) {
    if plan.limit.is_none() && default_limit > 0 {
        plan.limit = Some(default_limit);
    }
}
