use crate::domain::model::{BundleReport, PackageSizeReport, SplitPlan, SplitTarget};
use crate::utils::error::{Result, SplitError};
use std::collections::{HashMap, HashSet};

const SERVICE_SUFFIX: &str = "-service";

/// Selects the packages to relocate and derives their identifiers.
///
/// Plans follow report order in automatic mode and caller order in explicit
/// mode. Either every plan is produced or none is.
pub fn create_split_plans(
    target: &SplitTarget,
    report: &BundleReport,
    threshold: u64,
) -> Result<Vec<SplitPlan>> {
    let selected: Vec<&PackageSizeReport> = match target {
        SplitTarget::Auto => report
            .packages
            .iter()
            .filter(|p| p.bytes >= threshold)
            .collect(),
        SplitTarget::Explicit(names) => {
            let mut seen = HashSet::new();
            let mut selected = Vec::new();
            for name in names {
                let package = report
                    .find(name)
                    .ok_or_else(|| SplitError::UnknownPackageError {
                        name: name.clone(),
                        available: report.package_names(),
                    })?;
                if seen.insert(package.name.as_str()) {
                    selected.push(package);
                }
            }
            selected
        }
    };

    let plans: Vec<SplitPlan> = selected.into_iter().map(|p| plan_for(&p.name)).collect();
    check_collisions(&plans)?;

    tracing::debug!("Planned {} split(s)", plans.len());
    Ok(plans)
}

pub fn plan_for(package_name: &str) -> SplitPlan {
    SplitPlan {
        package_name: package_name.to_string(),
        service_name: service_name(package_name),
        binding_name: binding_name(package_name),
        entrypoint_identifier: entrypoint_identifier(package_name),
        export_names: Vec::new(),
    }
}

/// `@`, `/` become `-`, one leading `-` is dropped.
fn safe_name(package_name: &str) -> String {
    let replaced = package_name.replace(['@', '/'], "-");
    match replaced.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None => replaced,
    }
}

pub fn service_name(package_name: &str) -> String {
    format!("{}{}", safe_name(package_name), SERVICE_SUFFIX)
}

pub fn binding_name(package_name: &str) -> String {
    let replaced = package_name.replace(['@', '/', '.', '-'], "_");
    replaced
        .strip_prefix('_')
        .unwrap_or(&replaced)
        .to_uppercase()
}

pub fn entrypoint_identifier(package_name: &str) -> String {
    format!("{}Entrypoint", to_pascal_case(&safe_name(package_name)))
}

pub fn to_pascal_case(value: &str) -> String {
    value
        .split(['-', '_'])
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Distinct packages must not share a derived identifier.
fn check_collisions(plans: &[SplitPlan]) -> Result<()> {
    let fields: [(&'static str, fn(&SplitPlan) -> &str); 3] = [
        ("service name", |p| p.service_name.as_str()),
        ("binding name", |p| p.binding_name.as_str()),
        ("entrypoint identifier", |p| p.entrypoint_identifier.as_str()),
    ];

    for (field, get) in fields {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for plan in plans {
            if let Some(first) = owners.insert(get(plan), &plan.package_name) {
                return Err(SplitError::NameCollisionError {
                    first: first.to_string(),
                    second: plan.package_name.clone(),
                    field,
                    value: get(plan).to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn package(name: &str, bytes: u64, percentage: u64) -> PackageSizeReport {
        PackageSizeReport {
            name: name.to_string(),
            bytes,
            percentage,
            files: vec![],
        }
    }

    fn report() -> BundleReport {
        BundleReport {
            packages: vec![
                package("sql-formatter", 600_000, 50),
                package("@faker-js/faker", 4_000_000, 40),
                package("tiny-lib", 1_000, 1),
            ],
            total_bytes: 10_000_000,
        }
    }

    fn explicit(names: &[&str]) -> SplitTarget {
        SplitTarget::Explicit(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_auto_selects_at_or_above_threshold_in_report_order() {
        let plans = create_split_plans(&SplitTarget::Auto, &report(), 500_000).unwrap();
        let names: Vec<&str> = plans.iter().map(|p| p.package_name.as_str()).collect();
        assert_eq!(names, vec!["sql-formatter", "@faker-js/faker"]);

        let exact = create_split_plans(&SplitTarget::Auto, &report(), 600_000).unwrap();
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn test_auto_with_nothing_above_threshold() {
        let plans = create_split_plans(&SplitTarget::Auto, &report(), 10_000_000).unwrap();
        assert!(plans.is_empty());
    }

    #[test]
    fn test_explicit_keeps_caller_order_and_ignores_threshold() {
        let plans =
            create_split_plans(&explicit(&["tiny-lib", "sql-formatter"]), &report(), u64::MAX).unwrap();
        let names: Vec<&str> = plans.iter().map(|p| p.package_name.as_str()).collect();
        assert_eq!(names, vec!["tiny-lib", "sql-formatter"]);
    }

    #[test]
    fn test_explicit_duplicates_are_selected_once() {
        let plans =
            create_split_plans(&explicit(&["tiny-lib", "tiny-lib"]), &report(), 0).unwrap();
        assert_eq!(plans.len(), 1);
    }

    #[test]
    fn test_unknown_package_lists_every_known_name() {
        let err = create_split_plans(&explicit(&["tiny-lib", "nonexistent"]), &report(), 0)
            .unwrap_err();
        match err {
            SplitError::UnknownPackageError { name, available } => {
                assert_eq!(name, "nonexistent");
                assert_eq!(available, vec!["sql-formatter", "@faker-js/faker", "tiny-lib"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_naming_scoped_package() {
        let plan = plan_for("@faker-js/faker");
        assert_eq!(plan.service_name, "faker-js-faker-service");
        assert_eq!(plan.binding_name, "FAKER_JS_FAKER");
        assert_eq!(plan.entrypoint_identifier, "FakerJsFakerEntrypoint");
        assert!(plan.export_names.is_empty());
    }

    #[test]
    fn test_naming_plain_package() {
        let plan = plan_for("sql-formatter");
        assert_eq!(plan.service_name, "sql-formatter-service");
        assert_eq!(plan.binding_name, "SQL_FORMATTER");
        assert_eq!(plan.entrypoint_identifier, "SqlFormatterEntrypoint");
    }

    #[test]
    fn test_naming_dots_and_case() {
        assert_eq!(binding_name("chart.js"), "CHART_JS");
        assert_eq!(service_name("chart.js"), "chart.js-service");
        assert_eq!(to_pascal_case("AWS-sdk_CLIENT"), "AwsSdkClient");
        assert_eq!(to_pascal_case("a--b"), "AB");
    }

    #[test]
    fn test_colliding_names_are_rejected() {
        let report = BundleReport {
            packages: vec![package("foo.bar", 10, 50), package("foo-bar", 10, 50)],
            total_bytes: 20,
        };
        let err = create_split_plans(&SplitTarget::Auto, &report, 0).unwrap_err();
        match err {
            SplitError::NameCollisionError {
                first,
                second,
                field,
                value,
            } => {
                assert_eq!(first, "foo.bar");
                assert_eq!(second, "foo-bar");
                assert_eq!(field, "binding name");
                assert_eq!(value, "FOO_BAR");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
