use crate::aggregate::{
    aggregate_by_company, aggregate_by_company_state, aggregate_by_state, correlation_matrix,
    municipality_totals, top_n_by_metric, MunicipalityMetric,
};
use crate::error::{Result, SisserError};
use crate::types::{
    CleanTable, CompanyAggregate, CompanyStateAggregate, CorrelationMatrix, MetricCard,
    MunicipalityTotals, StateAggregate, StateLeader, SummaryStats, ValueShare, CORRELATION_FIELDS,
};
use crate::util::{average, pearson, round_to};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_TOP_N: usize = 10;

/// Company-level metric selectable for sorting and summary cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyMetric {
    Policies,
    StateCount,
    Area,
    Value,
}

impl CompanyMetric {
    pub fn label(self) -> &'static str {
        match self {
            CompanyMetric::Policies => "Número de Seguros",
            CompanyMetric::StateCount => "Contagem de Estados",
            CompanyMetric::Area => "Área Total",
            CompanyMetric::Value => "Valor Total",
        }
    }

    pub fn of(self, c: &CompanyAggregate) -> f64 {
        match self {
            CompanyMetric::Policies => c.numero_seguros as f64,
            CompanyMetric::StateCount => c.contagem_estados as f64,
            CompanyMetric::Area => c.area_total,
            CompanyMetric::Value => c.valor_total,
        }
    }
}

impl FromStr for CompanyMetric {
    type Err = SisserError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "numero_seguros" => Ok(CompanyMetric::Policies),
            "contagem_estados" => Ok(CompanyMetric::StateCount),
            "area_total" => Ok(CompanyMetric::Area),
            "valor_total" => Ok(CompanyMetric::Value),
            other => Err(SisserError::InvalidSelection(format!("unknown metric '{}'", other))),
        }
    }
}

/// Which way the user pivots the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMode {
    ByCompany,
    ByState(String),
}

/// The derived tables of one session, built from the cleaned table.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub states: Vec<StateAggregate>,
    pub companies: Vec<CompanyAggregate>,
    pub company_states: Vec<CompanyStateAggregate>,
    pub correlation: CorrelationMatrix,
}

fn or_empty<T>(name: &str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(table = name, error = %e, "aggregation skipped");
        Vec::new()
    })
}

impl Dashboard {
    /// Run every aggregation. One that lacks a column comes back empty and
    /// does not affect the others.
    pub fn build(table: &CleanTable) -> Dashboard {
        let dashboard = Dashboard {
            states: or_empty("estado", aggregate_by_state(table)),
            companies: or_empty("razao_social", aggregate_by_company(table)),
            company_states: or_empty("razao_social_estado", aggregate_by_company_state(table)),
            correlation: correlation_matrix(table, &CORRELATION_FIELDS),
        };
        info!(
            states = dashboard.states.len(),
            companies = dashboard.companies.len(),
            correlation_fields = dashboard.correlation.fields.len(),
            "dashboard tables built"
        );
        dashboard
    }
}

/// Companies sorted descending by `metric`; ties keep table order.
pub fn sort_companies(companies: &[CompanyAggregate], metric: CompanyMetric) -> Vec<CompanyAggregate> {
    let mut sorted = companies.to_vec();
    sorted.sort_by(|a, b| {
        metric
            .of(b)
            .partial_cmp(&metric.of(a))
            .unwrap_or(Ordering::Equal)
    });
    sorted
}

/// Maximum, its holder, the mean and how far the maximum sits above the
/// mean, for policies, state count and area.
pub fn metric_cards(companies: &[CompanyAggregate]) -> Vec<MetricCard> {
    if companies.is_empty() {
        return Vec::new();
    }
    [CompanyMetric::Policies, CompanyMetric::StateCount, CompanyMetric::Area]
        .into_iter()
        .filter_map(|metric| {
            let values: Vec<f64> = companies.iter().map(|c| metric.of(c)).collect();
            let max = values.iter().copied().fold(f64::MIN, f64::max);
            let holder = companies.iter().find(|c| metric.of(c) == max)?;
            let mean = average(&values);
            let pct_over_mean = if mean.abs() < f64::EPSILON {
                0.0
            } else {
                (max - mean) / mean * 100.0
            };
            Some(MetricCard {
                metric: metric.label().to_string(),
                holder: holder.company.clone(),
                max,
                mean,
                pct_over_mean,
            })
        })
        .collect()
}

/// The state with the most policies, the largest area and the largest value.
pub fn state_leaders(states: &[StateAggregate]) -> Vec<StateLeader> {
    let metrics: [(&str, fn(&StateAggregate) -> f64); 3] = [
        ("Número de Seguros", |s| s.numero_seguros as f64),
        ("Área Total", |s| s.area_total),
        ("Valor Total", |s| s.valor_total),
    ];
    metrics
        .into_iter()
        .filter_map(|(label, of)| {
            // First state wins on ties.
            let best = states.iter().fold(None::<&StateAggregate>, |best, s| match best {
                Some(b) if of(b) >= of(s) => Some(b),
                _ => Some(s),
            })?;
            Some(StateLeader {
                metric: label.to_string(),
                state: best.state.clone(),
                value: of(best),
            })
        })
        .collect()
}

/// Each company's share of the total premium, largest first.
pub fn value_share(companies: &[CompanyAggregate]) -> Vec<ValueShare> {
    let total: f64 = companies.iter().map(|c| c.valor_total).sum();
    let mut rows: Vec<ValueShare> = companies
        .iter()
        .map(|c| ValueShare {
            company: c.company.clone(),
            valor_total: c.valor_total,
            share_pct: if total.abs() < f64::EPSILON {
                0.0
            } else {
                c.valor_total / total * 100.0
            },
        })
        .collect();
    rows.sort_by(|a, b| {
        b.valor_total
            .partial_cmp(&a.valor_total)
            .unwrap_or(Ordering::Equal)
    });
    rows
}

/// Company rows for one state, most policies first.
pub fn companies_in_state(rows: &[CompanyStateAggregate], state: &str) -> Vec<CompanyStateAggregate> {
    let mut filtered: Vec<CompanyStateAggregate> =
        rows.iter().filter(|r| r.state == state).cloned().collect();
    filtered.sort_by(|a, b| b.numero_seguros.cmp(&a.numero_seguros));
    filtered
}

/// Area/value correlation over the union of the two top-N municipality lists.
pub fn municipality_correlation(
    top_area: &[MunicipalityTotals],
    top_value: &[MunicipalityTotals],
) -> Option<f64> {
    let mut seen: HashSet<&str> = HashSet::new();
    let pairs: Vec<(f64, f64)> = top_area
        .iter()
        .chain(top_value.iter())
        .filter(|m| seen.insert(m.municipality.as_str()))
        .map(|m| (m.area_total, m.valor_total))
        .collect();
    pearson(&pairs).map(|r| round_to(r, 2))
}

/// Drill-down for one selected state.
#[derive(Debug, Clone, Default)]
pub struct StateView {
    pub state: String,
    pub companies: Vec<CompanyStateAggregate>,
    pub top_area: Vec<MunicipalityTotals>,
    pub top_value: Vec<MunicipalityTotals>,
    pub correlation: Option<f64>,
}

impl StateView {
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.top_area.is_empty() && self.top_value.is_empty()
    }
}

pub fn state_view(table: &CleanTable, dashboard: &Dashboard, state: &str, n: usize) -> StateView {
    let totals = or_empty("municipio", municipality_totals(table, state));
    let top_area = top_n_by_metric(&totals, MunicipalityMetric::Area, n);
    let top_value = top_n_by_metric(&totals, MunicipalityMetric::Value, n);
    let view = StateView {
        state: state.to_string(),
        companies: companies_in_state(&dashboard.company_states, state),
        correlation: municipality_correlation(&top_area, &top_value),
        top_area,
        top_value,
    };
    if view.is_empty() {
        warn!(state, "no rows for the selected state");
    }
    view
}

/// State codes present in the table, sorted.
pub fn available_states(table: &CleanTable) -> Vec<String> {
    let states: BTreeSet<&str> = table.records.iter().filter_map(|r| r.state.as_deref()).collect();
    states.into_iter().map(str::to_string).collect()
}

pub fn generate_summary(table: &CleanTable, dashboard: &Dashboard) -> SummaryStats {
    let policies: HashSet<&str> = table
        .records
        .iter()
        .filter_map(|r| r.policy_id.as_deref())
        .collect();
    SummaryStats {
        generated_at: chrono::Utc::now(),
        total_rows: table.len(),
        total_policies: policies.len(),
        total_companies: dashboard.companies.len(),
        total_states: dashboard.states.len(),
        state_leaders: state_leaders(&dashboard.states),
        metric_cards: metric_cards(&dashboard.companies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CleanRecord, Column};

    fn company(name: &str, policies: usize, states: &[&str], area: f64, value: f64) -> CompanyAggregate {
        CompanyAggregate {
            company: name.to_string(),
            numero_seguros: policies,
            area_total: area,
            valor_total: value,
            estados: states.iter().map(|s| s.to_string()).collect(),
            contagem_estados: states.len(),
        }
    }

    fn rec(company: &str, state: &str, muni: &str, policy: &str, area: f64, premium: f64) -> CleanRecord {
        CleanRecord {
            company: Some(company.into()),
            state: Some(state.into()),
            municipality: Some(muni.into()),
            policy_id: Some(policy.into()),
            area: Some(area),
            premium: Some(premium),
            ..CleanRecord::default()
        }
    }

    fn full_table() -> CleanTable {
        CleanTable {
            present: [
                Column::Company,
                Column::State,
                Column::Municipality,
                Column::PolicyId,
                Column::Area,
                Column::Premium,
            ]
            .into_iter()
            .collect(),
            extra_columns: Vec::new(),
            records: vec![
                rec("Alfa", "SP", "Campinas", "A1", 100.0, 50.0),
                rec("Alfa", "SP", "Campinas", "A1", 20.0, 10.0),
                rec("Beta", "SP", "Bauru", "B2", 60.0, 40.0),
                rec("Beta", "RJ", "Niterói", "B1", 30.0, 15.0),
                rec("Gama", "SP", "Sorocaba", "C1", 5.0, 1.0),
            ],
        }
    }

    #[test]
    fn test_metric_cards() {
        let companies = vec![
            company("Alfa", 10, &["SP"], 100.0, 1.0),
            company("Beta", 30, &["SP", "RJ"], 300.0, 1.0),
            company("Gama", 20, &["MG"], 200.0, 1.0),
        ];
        let cards = metric_cards(&companies);
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].holder, "Beta");
        assert_eq!(cards[0].max, 30.0);
        assert_eq!(cards[0].mean, 20.0);
        assert_eq!(cards[0].pct_over_mean, 50.0);
        assert_eq!(cards[1].holder, "Beta");
        assert_eq!(cards[1].max, 2.0);
        assert_eq!(cards[2].metric, "Área Total");
    }

    #[test]
    fn test_metric_cards_empty() {
        assert!(metric_cards(&[]).is_empty());
    }

    #[test]
    fn test_state_leaders_first_wins_ties() {
        let states = vec![
            StateAggregate { state: "PR".into(), area_total: 10.0, valor_total: 9.0, numero_seguros: 4 },
            StateAggregate { state: "SP".into(), area_total: 50.0, valor_total: 9.0, numero_seguros: 2 },
        ];
        let leaders = state_leaders(&states);
        assert_eq!(leaders[0].state, "PR");
        assert_eq!(leaders[1].state, "SP");
        assert_eq!(leaders[2].state, "PR");
        assert!(state_leaders(&[]).is_empty());
    }

    #[test]
    fn test_value_share_sums_to_hundred() {
        let companies = vec![
            company("Alfa", 1, &["SP"], 0.0, 25.0),
            company("Beta", 1, &["SP"], 0.0, 75.0),
        ];
        let shares = value_share(&companies);
        assert_eq!(shares[0].company, "Beta");
        assert_eq!(shares[0].share_pct, 75.0);
        let total: f64 = shares.iter().map(|s| s.share_pct).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sort_companies_by_metric() {
        let companies = vec![
            company("Alfa", 5, &["SP"], 10.0, 1.0),
            company("Beta", 1, &["SP", "RJ", "MG"], 20.0, 1.0),
        ];
        let by_states = sort_companies(&companies, CompanyMetric::StateCount);
        assert_eq!(by_states[0].company, "Beta");
        let by_policies = sort_companies(&companies, "numero_seguros".parse().unwrap());
        assert_eq!(by_policies[0].company, "Alfa");
        assert!("premio".parse::<CompanyMetric>().is_err());
    }

    #[test]
    fn test_build_skips_only_failing_aggregations() {
        let mut table = full_table();
        table.present.remove(&Column::Company);
        let dashboard = Dashboard::build(&table);
        assert!(dashboard.companies.is_empty());
        assert!(dashboard.company_states.is_empty());
        assert_eq!(dashboard.states.len(), 2);
        assert_eq!(dashboard.correlation.fields, vec![Column::Area, Column::Premium]);
    }

    #[test]
    fn test_state_view() {
        let table = full_table();
        let dashboard = Dashboard::build(&table);
        let view = state_view(&table, &dashboard, "SP", DEFAULT_TOP_N);
        assert_eq!(view.companies.len(), 3);
        assert_eq!(view.top_area[0].municipality, "Campinas");
        assert_eq!(view.top_area[0].area_total, 120.0);
        assert_eq!(view.top_value.len(), 3);
        assert!(view.correlation.is_some());
    }

    #[test]
    fn test_state_view_unknown_state_is_empty() {
        let table = full_table();
        let dashboard = Dashboard::build(&table);
        let view = state_view(&table, &dashboard, "AC", DEFAULT_TOP_N);
        assert!(view.is_empty());
        assert_eq!(view.correlation, None);
    }

    #[test]
    fn test_municipality_correlation_deduplicates() {
        let m = |name: &str, a: f64, v: f64| MunicipalityTotals {
            municipality: name.to_string(),
            area_total: a,
            valor_total: v,
        };
        let area = vec![m("A", 3.0, 3.0), m("B", 2.0, 2.0)];
        let value = vec![m("A", 3.0, 3.0), m("C", 1.0, 1.0)];
        assert_eq!(municipality_correlation(&area, &value), Some(1.0));
        assert_eq!(municipality_correlation(&area[..1], &value[..1]), None);
    }

    #[test]
    fn test_summary_counts() {
        let table = full_table();
        let dashboard = Dashboard::build(&table);
        let summary = generate_summary(&table, &dashboard);
        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.total_policies, 4);
        assert_eq!(summary.total_companies, 3);
        assert_eq!(summary.total_states, 2);
        assert_eq!(available_states(&table), vec!["RJ".to_string(), "SP".to_string()]);
    }
}
