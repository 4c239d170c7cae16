//! KPI queries over the reporting view.
//!
//! Three fixed metrics are computed, each with its breakdowns:
//!
//! * KPI 1: average spend per transaction, overall and by discount usage and customer status.
//! * KPI 2: conversion rate (`100 * transactions / visits`), overall, by discount usage and by
//!   year and month.
//! * KPI 3: share of distinct customers per education level.
//!
//! Group labels are read back as text so any key type can be charted. Breakdowns are ordered by
//! their key with the null group last.

use std::fmt;

use duckdb::{Connection, Row};
use log::info;
use thiserror::Error;

use crate::load::quote_identifier;

/// Label used for customers without a known education level.
pub const UNKNOWN_EDUCATION_LABEL: &str = "Nepojasnjena izobrazba";

/// Errors raised while running KPI queries.
#[derive(Debug, Error)]
#[error("failed to compute {kpi}: {source}")]
pub struct KpiError {
    pub kpi: &'static str,
    #[source]
    pub source: duckdb::Error,
}

/// View and column names the KPI queries read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KpiColumns {
    pub view: String,
    pub spend: String,
    pub discount: String,
    pub customer_status: String,
    pub visits: String,
    pub year: String,
    pub month: String,
    pub customer_id: String,
    pub education: String,
}

impl Default for KpiColumns {
    fn default() -> Self {
        Self {
            view: "fact_with_dim".to_string(),
            spend: "povprecno_na_transakcijo".to_string(),
            discount: "popust_uporabljen".to_string(),
            customer_status: "kupec_status".to_string(),
            visits: "obiski_na_uporabnika".to_string(),
            year: "leto".to_string(),
            month: "mesec".to_string(),
            customer_id: "kupec_id".to_string(),
            education: "izobrazba".to_string(),
        }
    }
}

/// A metric value for one group. A `None` label is the null group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupValue {
    pub label: Option<String>,
    pub value: Option<f64>,
}

impl GroupValue {
    /// The label for display, with `fallback` standing in for the null group.
    pub fn label_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(fallback)
    }
}

/// A metric value for one (year, month) period.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodValue {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub value: Option<f64>,
}

/// Average spend per transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Kpi1 {
    pub overall: Option<f64>,
    pub by_discount: Vec<GroupValue>,
    pub by_customer_status: Vec<GroupValue>,
}

/// Conversion rate in percent.
#[derive(Clone, Debug, PartialEq)]
pub struct Kpi2 {
    pub overall: Option<f64>,
    pub by_discount: Vec<GroupValue>,
    pub by_period: Vec<PeriodValue>,
}

impl Kpi2 {
    /// Distinct years present in the monthly breakdown, in order.
    pub fn years(&self) -> Vec<i64> {
        let mut years: Vec<i64> = self.by_period.iter().filter_map(|period| period.year).collect();
        years.dedup();
        years
    }
}

/// Share of distinct customers per education level, in percent.
#[derive(Clone, Debug, PartialEq)]
pub struct Kpi3 {
    pub total_customers: u64,
    pub by_education: Vec<GroupValue>,
}

impl Kpi3 {
    /// Buckets with a known education level and a defined share.
    pub fn without_unknown(&self) -> Vec<GroupValue> {
        self.by_education
            .iter()
            .filter(|group| group.label.is_some() && group.value.is_some())
            .cloned()
            .collect()
    }

    /// All buckets, with the null education level relabeled.
    pub fn with_unknown_label(&self, label: &str) -> Vec<GroupValue> {
        self.by_education
            .iter()
            .map(|group| GroupValue {
                label: Some(group.label_or(label).to_string()),
                value: group.value,
            })
            .collect()
    }
}

/// Computes KPI 1.
pub fn kpi1(connection: &Connection, columns: &KpiColumns) -> Result<Kpi1, KpiError> {
    const KPI: &str = "KPI 1";
    let view = quote_identifier(&columns.view);
    let average = format!("CAST(AVG({}) AS DOUBLE)", quote_identifier(&columns.spend));

    let overall = scalar(connection, KPI, &format!("SELECT {average} FROM {view}"))?;
    let by_discount = grouped(connection, KPI, &group_sql(&view, &columns.discount, &average))?;
    let by_customer_status = grouped(
        connection,
        KPI,
        &group_sql(&view, &columns.customer_status, &average),
    )?;

    Ok(Kpi1 {
        overall,
        by_discount,
        by_customer_status,
    })
}

/// Computes KPI 2. A group whose visits do not sum to a positive number has a null rate.
pub fn kpi2(connection: &Connection, columns: &KpiColumns) -> Result<Kpi2, KpiError> {
    const KPI: &str = "KPI 2";
    let view = quote_identifier(&columns.view);
    let visits = quote_identifier(&columns.visits);
    let rate = format!(
        "CAST(CASE WHEN SUM({visits}) > 0 THEN 100.0 * COUNT(*) / SUM({visits}) END AS DOUBLE)"
    );

    let overall = scalar(connection, KPI, &format!("SELECT {rate} FROM {view}"))?;
    let by_discount = grouped(connection, KPI, &group_sql(&view, &columns.discount, &rate))?;

    let year = quote_identifier(&columns.year);
    let month = quote_identifier(&columns.month);
    let sql = format!(
        "SELECT CAST({year} AS BIGINT), CAST({month} AS BIGINT), {rate} FROM {view} \
         GROUP BY 1, 2 ORDER BY 1 NULLS LAST, 2 NULLS LAST"
    );
    let by_period = query_rows(connection, KPI, &sql, |row| {
        Ok(PeriodValue {
            year: row.get(0)?,
            month: row.get(1)?,
            value: row.get(2)?,
        })
    })?;

    Ok(Kpi2 {
        overall,
        by_discount,
        by_period,
    })
}

/// Computes KPI 3. Rows without a customer id are not counted.
pub fn kpi3(connection: &Connection, columns: &KpiColumns) -> Result<Kpi3, KpiError> {
    const KPI: &str = "KPI 3";
    let view = quote_identifier(&columns.view);
    let customer = quote_identifier(&columns.customer_id);
    let education = quote_identifier(&columns.education);

    let total: i64 = connection
        .query_row(
            &format!(
                "SELECT COUNT(DISTINCT {customer}) FROM {view} WHERE {customer} IS NOT NULL"
            ),
            [],
            |row| row.get(0),
        )
        .map_err(|source| KpiError { kpi: KPI, source })?;

    let sql = format!(
        "WITH unique_customers AS (\
           SELECT DISTINCT {customer}, {education} FROM {view} WHERE {customer} IS NOT NULL\
         ) \
         SELECT CAST({education} AS VARCHAR), \
                CAST(CASE WHEN {total} > 0 THEN 100.0 * COUNT(*) / {total} END AS DOUBLE) \
         FROM unique_customers GROUP BY {education} ORDER BY {education} NULLS LAST"
    );
    let by_education = grouped(connection, KPI, &sql)?;

    Ok(Kpi3 {
        total_customers: total.max(0) as u64,
        by_education,
    })
}

fn group_sql(view: &str, key: &str, metric: &str) -> String {
    let key = quote_identifier(key);
    format!(
        "SELECT CAST({key} AS VARCHAR), {metric} FROM {view} GROUP BY {key} ORDER BY {key} NULLS LAST"
    )
}

fn scalar(connection: &Connection, kpi: &'static str, sql: &str) -> Result<Option<f64>, KpiError> {
    connection
        .query_row(sql, [], |row| row.get(0))
        .map_err(|source| KpiError { kpi, source })
}

fn grouped(
    connection: &Connection,
    kpi: &'static str,
    sql: &str,
) -> Result<Vec<GroupValue>, KpiError> {
    query_rows(connection, kpi, sql, |row| {
        Ok(GroupValue {
            label: row.get(0)?,
            value: row.get(1)?,
        })
    })
}

fn query_rows<T, F>(
    connection: &Connection,
    kpi: &'static str,
    sql: &str,
    map: F,
) -> Result<Vec<T>, KpiError>
where
    F: FnMut(&Row<'_>) -> duckdb::Result<T>,
{
    let error = |source| KpiError { kpi, source };
    let mut statement = connection.prepare(sql).map_err(error)?;
    let rows = statement.query_map([], map).map_err(error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(error)
}

/// All three KPIs, as printed by the command-line front end.
#[derive(Clone, Debug, PartialEq)]
pub struct KpiReport {
    pub kpi1: Kpi1,
    pub kpi2: Kpi2,
    pub kpi3: Kpi3,
}

impl KpiReport {
    /// Runs every KPI query against the view named in `columns`.
    pub fn compute(connection: &Connection, columns: &KpiColumns) -> Result<Self, KpiError> {
        let report = Self {
            kpi1: kpi1(connection, columns)?,
            kpi2: kpi2(connection, columns)?,
            kpi3: kpi3(connection, columns)?,
        };
        info!(
            "Computed KPIs over `{}` ({} customers)",
            columns.view, report.kpi3.total_customers
        );
        Ok(report)
    }
}

struct Number(Option<f64>);

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.2}"),
            None => f.write_str("n/a"),
        }
    }
}

fn write_groups(f: &mut fmt::Formatter<'_>, title: &str, groups: &[GroupValue]) -> fmt::Result {
    writeln!(f, "  {title}:")?;
    for group in groups {
        writeln!(f, "    {:<28} {}", group.label_or("NULL"), Number(group.value))?;
    }
    Ok(())
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "KPI 1 - average spend per transaction: {}",
            Number(self.kpi1.overall)
        )?;
        write_groups(f, "by discount usage", &self.kpi1.by_discount)?;
        write_groups(f, "by customer status", &self.kpi1.by_customer_status)?;

        writeln!(f, "KPI 2 - conversion rate (%): {}", Number(self.kpi2.overall))?;
        write_groups(f, "by discount usage", &self.kpi2.by_discount)?;
        writeln!(f, "  by year and month:")?;
        for period in &self.kpi2.by_period {
            let year = period.year.map_or_else(|| "NULL".to_string(), |y| y.to_string());
            let month = period.month.map_or_else(|| "NULL".to_string(), |m| m.to_string());
            writeln!(f, "    {year}-{month:<23} {}", Number(period.value))?;
        }

        writeln!(
            f,
            "KPI 3 - customers by education level (%), {} customers:",
            self.kpi3.total_customers
        )?;
        for group in &self.kpi3.by_education {
            writeln!(f, "    {:<28} {}", group.label_or("NULL"), Number(group.value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(rows: &str) -> Connection {
        let connection = Connection::open_in_memory().expect("in-memory store");
        connection
            .execute_batch(&format!(
                "CREATE TABLE fact_with_dim (
                    kupec_id BIGINT,
                    kupec_status VARCHAR,
                    popust_uporabljen VARCHAR,
                    povprecno_na_transakcijo DOUBLE,
                    obiski_na_uporabnika BIGINT,
                    leto BIGINT,
                    mesec BIGINT,
                    izobrazba VARCHAR
                 );
                 {rows}"
            ))
            .expect("seed view");
        connection
    }

    fn sample() -> Connection {
        store(
            "INSERT INTO fact_with_dim VALUES
               (1, 'Nov',      'Yes', 10.0, 4, 2023, 1, 'Srednja'),
               (1, 'Nov',      'No',  20.0, 6, 2023, 2, 'Srednja'),
               (2, 'Vracajoc', 'Yes', 30.0, 5, 2024, 1, 'Visoka'),
               (3, 'Vracajoc', 'No',  40.0, 5, 2024, 1, NULL),
               (NULL, 'Nov',   'No',  50.0, 0, 2024, 2, 'Visoka');",
        )
    }

    #[test]
    fn kpi1_groups_by_two_valued_flag() {
        let kpi = kpi1(&sample(), &KpiColumns::default()).expect("kpi1");
        assert_eq!(kpi.overall, Some(30.0));
        assert_eq!(kpi.by_discount.len(), 2);
        assert_eq!(kpi.by_discount[0].label.as_deref(), Some("No"));
        let average = kpi.by_discount[0].value.expect("average");
        assert!((average - 110.0 / 3.0).abs() < 1e-9);
        assert_eq!(kpi.by_customer_status.len(), 2);
    }

    #[test]
    fn kpi2_rate_is_null_when_visits_sum_to_zero() {
        let kpi = kpi2(&sample(), &KpiColumns::default()).expect("kpi2");
        assert_eq!(kpi.overall, Some(100.0 * 5.0 / 20.0));

        let last = kpi.by_period.last().expect("periods");
        assert_eq!((last.year, last.month, last.value), (Some(2024), Some(2), None));
        assert_eq!(kpi.years(), vec![2023, 2024]);
        assert!(kpi
            .by_period
            .iter()
            .filter_map(|period| period.value)
            .all(|value| value >= 0.0));
    }

    #[test]
    fn kpi2_rate_is_null_for_missing_or_negative_visits() {
        let connection = store(
            "INSERT INTO fact_with_dim VALUES
               (1, 'Nov', 'Yes', 10.0, NULL, 2023, 1, 'Srednja'),
               (2, 'Nov', 'No',  20.0, -3,   2023, 2, 'Visoka'),
               (3, 'Nov', 'Yes', 30.0, 0,    2023, 2, NULL);",
        );
        let kpi = kpi2(&connection, &KpiColumns::default()).expect("kpi2");

        assert_eq!(kpi.overall, None);
        assert_eq!(kpi.by_discount.len(), 2);
        assert!(kpi.by_discount.iter().all(|group| group.value.is_none()));
        assert_eq!(kpi.by_period.len(), 2);
        assert!(kpi.by_period.iter().all(|period| period.value.is_none()));
    }

    #[test]
    fn kpi2_on_empty_view_is_null() {
        let kpi = kpi2(&store(""), &KpiColumns::default()).expect("kpi2");
        assert_eq!(kpi.overall, None);
        assert!(kpi.by_period.is_empty());
    }

    #[test]
    fn kpi3_shares_cover_all_customers() {
        let kpi = kpi3(&sample(), &KpiColumns::default()).expect("kpi3");
        assert_eq!(kpi.total_customers, 3);

        let total: f64 = kpi.by_education.iter().filter_map(|group| group.value).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert_eq!(kpi.by_education.last().and_then(|g| g.label.clone()), None);

        let known = kpi.without_unknown();
        assert_eq!(known.len(), 2);
        assert!(known.iter().all(|group| group.label.is_some()));

        let filled = kpi.with_unknown_label(UNKNOWN_EDUCATION_LABEL);
        assert_eq!(filled.len(), 3);
        assert_eq!(filled[2].label.as_deref(), Some(UNKNOWN_EDUCATION_LABEL));
    }

    #[test]
    fn report_display_lists_every_kpi() {
        let report = KpiReport::compute(&sample(), &KpiColumns::default()).expect("report");
        let text = report.to_string();
        assert!(text.contains("KPI 1 - average spend per transaction: 30.00"));
        assert!(text.contains("KPI 2 - conversion rate (%): 25.00"));
        assert!(text.contains("3 customers"));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn missing_view_is_an_error() {
        let connection = Connection::open_in_memory().expect("in-memory store");
        let err = kpi1(&connection, &KpiColumns::default()).unwrap_err();
        assert_eq!(err.kpi, "KPI 1");
    }
}
