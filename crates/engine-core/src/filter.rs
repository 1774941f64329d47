use model::config::table::{PerformanceCategory, TableConfig, TableImportance};

/// Which tables a batch operation runs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableFilter {
    All,
    Names(Vec<String>),
    Category(PerformanceCategory),
    MaxPriority(u8),
    Importance(TableImportance),
}

impl TableFilter {
    /// Resolves the filter against the configured tables. `Names`
    /// preserves the caller's order (unknown names stay in, and fail
    /// per-table later); the other variants order by processing
    /// priority, then name, so priority-1 work always starts first.
    pub fn resolve(&self, tables: &[&TableConfig]) -> Vec<String> {
        match self {
            TableFilter::All => sorted_names(tables.iter().copied()),
            TableFilter::Names(names) => names.clone(),
            TableFilter::Category(category) => sorted_names(
                tables
                    .iter()
                    .copied()
                    .filter(|t| t.performance_category == *category),
            ),
            TableFilter::MaxPriority(max) => sorted_names(
                tables
                    .iter()
                    .copied()
                    .filter(|t| t.processing_priority <= *max),
            ),
            TableFilter::Importance(importance) => sorted_names(
                tables
                    .iter()
                    .copied()
                    .filter(|t| t.table_importance == *importance),
            ),
        }
    }
}

fn sorted_names<'a>(tables: impl Iterator<Item = &'a TableConfig>) -> Vec<String> {
    let mut selected: Vec<&TableConfig> = tables.collect();
    selected.sort_by(|a, b| {
        a.processing_priority
            .cmp(&b.processing_priority)
            .then_with(|| a.table_name.cmp(&b.table_name))
    });
    selected.iter().map(|t| t.table_name.clone()).collect()
}

/// Groups names by priority, ascending, for stage-by-stage scheduling.
pub fn priority_groups(tables: &[&TableConfig], max_priority: u8) -> Vec<(u8, Vec<String>)> {
    let mut groups: Vec<(u8, Vec<String>)> = Vec::new();
    let mut selected: Vec<&&TableConfig> = tables
        .iter()
        .filter(|t| t.processing_priority <= max_priority)
        .collect();
    selected.sort_by(|a, b| {
        a.processing_priority
            .cmp(&b.processing_priority)
            .then_with(|| a.table_name.cmp(&b.table_name))
    });

    for table in selected {
        match groups.last_mut() {
            Some((priority, names)) if *priority == table.processing_priority => {
                names.push(table.table_name.clone());
            }
            _ => groups.push((table.processing_priority, vec![table.table_name.clone()])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, priority: u8, category: &str) -> TableConfig {
        serde_json::from_str(&format!(
            r#"{{"table_name": "{name}", "processing_priority": {priority}, "performance_category": "{category}"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn all_orders_by_priority_then_name() {
        let a = table("claim", 5, "small");
        let b = table("patient", 1, "small");
        let c = table("appointment", 1, "medium");
        let tables = vec![&a, &b, &c];
        assert_eq!(
            TableFilter::All.resolve(&tables),
            vec!["appointment", "patient", "claim"]
        );
    }

    #[test]
    fn category_filters() {
        let a = table("claim", 5, "large");
        let b = table("patient", 1, "small");
        let tables = vec![&a, &b];
        assert_eq!(
            TableFilter::Category(PerformanceCategory::Large).resolve(&tables),
            vec!["claim"]
        );
    }

    #[test]
    fn max_priority_excludes_later_work() {
        let a = table("claim", 5, "small");
        let b = table("patient", 1, "small");
        let c = table("securitylog", 10, "large");
        let tables = vec![&a, &b, &c];
        assert_eq!(
            TableFilter::MaxPriority(5).resolve(&tables),
            vec!["patient", "claim"]
        );
    }

    #[test]
    fn names_preserve_caller_order() {
        let a = table("claim", 5, "small");
        let tables = vec![&a];
        let filter = TableFilter::Names(vec!["zzz".to_string(), "claim".to_string()]);
        assert_eq!(filter.resolve(&tables), vec!["zzz", "claim"]);
    }

    #[test]
    fn groups_are_ascending_and_complete() {
        let a = table("claim", 5, "small");
        let b = table("patient", 1, "small");
        let c = table("appointment", 1, "medium");
        let d = table("securitylog", 10, "large");
        let tables = vec![&a, &b, &c, &d];
        let groups = priority_groups(&tables, 5);
        assert_eq!(
            groups,
            vec![
                (1, vec!["appointment".to_string(), "patient".to_string()]),
                (5, vec!["claim".to_string()]),
            ]
        );
    }
}
