use crate::error::Result;
use crate::types::{
    CleanTable, Column, CompanyAggregate, CompanyStateAggregate, CorrelationMatrix,
    MunicipalityTotals, StateAggregate,
};
use crate::util::{pearson, round_to};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Default)]
struct Acc<'a> {
    area: f64,
    valor: f64,
    policies: HashSet<&'a str>,
}

impl<'a> Acc<'a> {
    fn add(&mut self, policy: Option<&'a str>, area: Option<f64>, valor: Option<f64>) {
        // Nulls contribute nothing to the sums, like a skip-null SUM.
        self.area += area.unwrap_or(0.0);
        self.valor += valor.unwrap_or(0.0);
        if let Some(p) = policy {
            self.policies.insert(p);
        }
    }
}

/// Totals per state. Policies are counted once per state even when they
/// span several property rows. Rows without a state code are skipped.
pub fn aggregate_by_state(table: &CleanTable) -> Result<Vec<StateAggregate>> {
    for col in [Column::State, Column::PolicyId, Column::Area, Column::Premium] {
        table.require(col)?;
    }
    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    for r in &table.records {
        let Some(state) = r.state.as_deref() else {
            continue;
        };
        map.entry(state)
            .or_default()
            .add(r.policy_id.as_deref(), r.area, r.premium);
    }
    Ok(map
        .into_iter()
        .map(|(state, acc)| StateAggregate {
            state: state.to_string(),
            area_total: acc.area,
            valor_total: acc.valor,
            numero_seguros: acc.policies.len(),
        })
        .collect())
}

pub fn aggregate_by_company(table: &CleanTable) -> Result<Vec<CompanyAggregate>> {
    for col in [
        Column::Company,
        Column::State,
        Column::PolicyId,
        Column::Area,
        Column::Premium,
    ] {
        table.require(col)?;
    }
    let mut map: BTreeMap<&str, (Acc, BTreeSet<&str>)> = BTreeMap::new();
    for r in &table.records {
        let Some(company) = r.company.as_deref() else {
            continue;
        };
        let (acc, states) = map.entry(company).or_default();
        acc.add(r.policy_id.as_deref(), r.area, r.premium);
        if let Some(state) = r.state.as_deref() {
            states.insert(state);
        }
    }
    Ok(map
        .into_iter()
        .map(|(company, (acc, states))| {
            let estados: Vec<String> = states.into_iter().map(str::to_string).collect();
            CompanyAggregate {
                company: company.to_string(),
                numero_seguros: acc.policies.len(),
                area_total: acc.area,
                valor_total: acc.valor,
                contagem_estados: estados.len(),
                estados,
            }
        })
        .collect())
}

/// Totals per (company, state) pair. The policy count is distinct, the same
/// measure [`aggregate_by_state`] uses.
pub fn aggregate_by_company_state(table: &CleanTable) -> Result<Vec<CompanyStateAggregate>> {
    for col in [
        Column::Company,
        Column::State,
        Column::PolicyId,
        Column::Area,
        Column::Premium,
    ] {
        table.require(col)?;
    }
    let mut map: BTreeMap<(&str, &str), Acc> = BTreeMap::new();
    for r in &table.records {
        let (Some(company), Some(state)) = (r.company.as_deref(), r.state.as_deref()) else {
            continue;
        };
        map.entry((company, state))
            .or_default()
            .add(r.policy_id.as_deref(), r.area, r.premium);
    }
    Ok(map
        .into_iter()
        .map(|((company, state), acc)| CompanyStateAggregate {
            company: company.to_string(),
            state: state.to_string(),
            numero_seguros: acc.policies.len(),
            area_total: acc.area,
            valor_total: acc.valor,
        })
        .collect())
}

/// Pairwise Pearson correlation over the requested fields present in
/// `table`, rounded to two decimals.
///
/// Each cell uses only rows where both fields are non-null. Cells whose
/// coefficient is undefined (fewer than two pairs, or a constant field) are
/// `None`.
pub fn correlation_matrix(table: &CleanTable, fields: &[Column]) -> CorrelationMatrix {
    let fields: Vec<Column> = fields
        .iter()
        .copied()
        .filter(|f| f.is_numeric() && table.has(*f))
        .collect();
    let n = fields.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        for j in i..n {
            let pairs: Vec<(f64, f64)> = table
                .records
                .iter()
                .filter_map(|r| Some((r.numeric(fields[i])?, r.numeric(fields[j])?)))
                .collect();
            let r = pearson(&pairs).map(|r| round_to(r, 2));
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix { fields, values }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MunicipalityMetric {
    Area,
    Value,
}

impl MunicipalityMetric {
    pub fn of(self, m: &MunicipalityTotals) -> f64 {
        match self {
            MunicipalityMetric::Area => m.area_total,
            MunicipalityMetric::Value => m.valor_total,
        }
    }
}

/// Area and premium per municipality of one state, in first-appearance order.
pub fn municipality_totals(table: &CleanTable, state: &str) -> Result<Vec<MunicipalityTotals>> {
    for col in [Column::State, Column::Municipality, Column::Area, Column::Premium] {
        table.require(col)?;
    }
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<MunicipalityTotals> = Vec::new();
    for r in &table.records {
        if r.state.as_deref() != Some(state) {
            continue;
        }
        let Some(municipality) = r.municipality.as_deref() else {
            continue;
        };
        let idx = *index.entry(municipality).or_insert_with(|| {
            rows.push(MunicipalityTotals {
                municipality: municipality.to_string(),
                area_total: 0.0,
                valor_total: 0.0,
            });
            rows.len() - 1
        });
        rows[idx].area_total += r.area.unwrap_or(0.0);
        rows[idx].valor_total += r.premium.unwrap_or(0.0);
    }
    Ok(rows)
}

/// The `n` largest municipalities by `metric`, descending. The sort is
/// stable, so ties keep their input order.
pub fn top_n_by_metric(
    totals: &[MunicipalityTotals],
    metric: MunicipalityMetric,
    n: usize,
) -> Vec<MunicipalityTotals> {
    let mut sorted = totals.to_vec();
    sorted.sort_by(|a, b| {
        metric
            .of(b)
            .partial_cmp(&metric.of(a))
            .unwrap_or(Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CleanRecord, CORRELATION_FIELDS};

    fn rec(company: &str, state: &str, policy: &str, area: f64, premium: f64) -> CleanRecord {
        CleanRecord {
            company: Some(company.to_string()),
            state: Some(state.to_string()),
            policy_id: Some(policy.to_string()),
            area: Some(area),
            premium: Some(premium),
            ..CleanRecord::default()
        }
    }

    fn table(records: Vec<CleanRecord>) -> CleanTable {
        CleanTable {
            present: [
                Column::Company,
                Column::State,
                Column::PolicyId,
                Column::Area,
                Column::Premium,
                Column::Municipality,
            ]
            .into_iter()
            .collect(),
            extra_columns: Vec::new(),
            records,
        }
    }

    fn sample() -> CleanTable {
        table(vec![
            rec("Alfa", "SP", "A1", 100.0, 50.0),
            rec("Alfa", "SP", "A1", 20.0, 10.0),
            rec("Beta", "RJ", "B1", 30.0, 15.0),
        ])
    }

    #[test]
    fn test_state_aggregate_counts_distinct_policies() {
        let states = aggregate_by_state(&sample()).unwrap();
        assert_eq!(states.len(), 2);
        let sp = states.iter().find(|s| s.state == "SP").unwrap();
        assert_eq!(sp.area_total, 120.0);
        assert_eq!(sp.valor_total, 60.0);
        assert_eq!(sp.numero_seguros, 1);
        let rj = states.iter().find(|s| s.state == "RJ").unwrap();
        assert_eq!(rj.area_total, 30.0);
        assert_eq!(rj.valor_total, 15.0);
        assert_eq!(rj.numero_seguros, 1);
    }

    #[test]
    fn test_state_aggregate_sums_match_raw_rows() {
        let mut t = sample();
        t.records.push(rec("Gama", "SP", "C9", 7.5, 2.5));
        let mut nulls = rec("Gama", "SP", "C9", 0.0, 0.0);
        nulls.area = None;
        nulls.premium = None;
        t.records.push(nulls);
        let mut stateless = rec("Gama", "MG", "D1", 1.0, 1.0);
        stateless.state = None;
        t.records.push(stateless);

        let states = aggregate_by_state(&t).unwrap();
        let distinct: HashSet<_> = t.records.iter().filter_map(|r| r.state.clone()).collect();
        assert!(states.len() <= distinct.len());
        for s in &states {
            let area: f64 = t
                .records
                .iter()
                .filter(|r| r.state.as_deref() == Some(s.state.as_str()))
                .filter_map(|r| r.area)
                .sum();
            assert_eq!(s.area_total, area);
        }
        let sp = states.iter().find(|s| s.state == "SP").unwrap();
        assert_eq!(sp.numero_seguros, 2);
    }

    #[test]
    fn test_missing_required_column() {
        let mut t = sample();
        t.present.remove(&Column::PolicyId);
        assert!(aggregate_by_state(&t).is_err());
        assert!(aggregate_by_company(&t).is_err());
        // Municipality totals do not need policy ids.
        assert!(municipality_totals(&t, "SP").is_ok());
    }

    #[test]
    fn test_company_state_count_is_cardinality() {
        let mut t = sample();
        t.records.push(rec("Alfa", "PR", "A2", 5.0, 1.0));
        t.records.push(rec("Alfa", "PR", "A3", 5.0, 1.0));
        let companies = aggregate_by_company(&t).unwrap();
        let alfa = companies.iter().find(|c| c.company == "Alfa").unwrap();
        assert_eq!(alfa.estados, vec!["PR".to_string(), "SP".to_string()]);
        assert_eq!(alfa.contagem_estados, 2);
        assert_eq!(alfa.numero_seguros, 3);
        assert_eq!(alfa.area_total, 130.0);
        assert_eq!(alfa.valor_total, 62.0);
    }

    #[test]
    fn test_company_state_uses_distinct_policy_count() {
        let rows = aggregate_by_company_state(&sample()).unwrap();
        assert_eq!(rows.len(), 2);
        let alfa_sp = rows
            .iter()
            .find(|r| r.company == "Alfa" && r.state == "SP")
            .unwrap();
        assert_eq!(alfa_sp.numero_seguros, 1);
        assert_eq!(alfa_sp.area_total, 120.0);
        assert_eq!(alfa_sp.valor_total, 60.0);
    }

    #[test]
    fn test_correlation_matrix_properties() {
        let mut t = table(vec![
            rec("A", "SP", "1", 10.0, 3.0),
            rec("A", "SP", "2", 20.0, 1.0),
            rec("A", "SP", "3", 30.0, 8.0),
            rec("A", "SP", "4", 45.0, 6.0),
        ]);
        let m = correlation_matrix(&t, &CORRELATION_FIELDS);
        assert_eq!(m.fields, vec![Column::Area, Column::Premium]);
        assert_eq!(m.get(Column::Area, Column::Area), Some(1.0));
        assert_eq!(m.get(Column::Premium, Column::Premium), Some(1.0));
        assert_eq!(
            m.get(Column::Area, Column::Premium),
            m.get(Column::Premium, Column::Area)
        );

        t.records.reverse();
        let reversed = correlation_matrix(&t, &CORRELATION_FIELDS);
        assert_eq!(reversed, m);
    }

    #[test]
    fn test_correlation_matrix_pairwise_complete() {
        let mut records = vec![
            rec("A", "SP", "1", 10.0, 3.0),
            rec("A", "SP", "2", 20.0, 1.0),
            rec("A", "SP", "3", 30.0, 8.0),
            rec("A", "SP", "4", 45.0, 6.0),
        ];
        records[0].federal_subsidy = Some(1.0);
        records[1].federal_subsidy = Some(4.0);
        records[3].federal_subsidy = Some(2.0);
        records[2].coverage_limit = Some(500.0);
        let mut t = table(records);
        t.present.insert(Column::FederalSubsidy);
        t.present.insert(Column::CoverageLimit);
        let m = correlation_matrix(&t, &CORRELATION_FIELDS);
        assert_eq!(
            m.fields,
            vec![Column::Area, Column::Premium, Column::CoverageLimit, Column::FederalSubsidy]
        );

        // Area x premium uses all four rows despite the gaps elsewhere.
        let all_rows = [(10.0, 3.0), (20.0, 1.0), (30.0, 8.0), (45.0, 6.0)];
        let expected = pearson(&all_rows).map(|r| round_to(r, 2));
        assert!(expected.is_some());
        assert_eq!(m.get(Column::Area, Column::Premium), expected);

        // Only the rows where both fields are present.
        let subsidy_rows = [(10.0, 1.0), (20.0, 4.0), (45.0, 2.0)];
        let expected = pearson(&subsidy_rows).map(|r| round_to(r, 2));
        assert!(expected.is_some());
        assert_eq!(m.get(Column::Area, Column::FederalSubsidy), expected);

        // A single complete row is not enough.
        assert_eq!(m.get(Column::Area, Column::CoverageLimit), None);
        assert_eq!(m.get(Column::CoverageLimit, Column::CoverageLimit), None);
        assert_eq!(m.get(Column::CoverageLimit, Column::FederalSubsidy), None);

        for a in &m.fields {
            for b in &m.fields {
                assert_eq!(m.get(*a, *b), m.get(*b, *a));
            }
        }
    }

    #[test]
    fn test_correlation_matrix_empty_when_no_fields_present() {
        let mut t = sample();
        t.present.clear();
        let m = correlation_matrix(&t, &CORRELATION_FIELDS);
        assert!(m.is_empty());
        assert!(m.values.is_empty());
    }

    fn muni(state: &str, name: &str, area: f64, premium: f64) -> CleanRecord {
        CleanRecord {
            municipality: Some(name.to_string()),
            ..rec("A", state, "1", area, premium)
        }
    }

    #[test]
    fn test_top_n_sorted_and_bounded() {
        let t = table(vec![
            muni("SP", "Campinas", 10.0, 5.0),
            muni("SP", "Sorocaba", 40.0, 1.0),
            muni("SP", "Campinas", 15.0, 5.0),
            muni("SP", "Bauru", 25.0, 9.0),
            muni("RJ", "Niterói", 500.0, 500.0),
        ]);
        let totals = municipality_totals(&t, "SP").unwrap();
        assert_eq!(totals.len(), 3);

        let top = top_n_by_metric(&totals, MunicipalityMetric::Area, 2);
        let names: Vec<_> = top.iter().map(|m| m.municipality.as_str()).collect();
        assert_eq!(names, vec!["Sorocaba", "Campinas"]);

        let all = top_n_by_metric(&totals, MunicipalityMetric::Value, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].municipality, "Campinas");
        assert_eq!(all[0].valor_total, 10.0);
    }

    #[test]
    fn test_top_n_ties_keep_input_order() {
        let t = table(vec![
            muni("SP", "Zeta", 10.0, 1.0),
            muni("SP", "Alfa", 10.0, 1.0),
            muni("SP", "Meio", 10.0, 1.0),
        ]);
        let totals = municipality_totals(&t, "SP").unwrap();
        let top = top_n_by_metric(&totals, MunicipalityMetric::Area, 2);
        let names: Vec<_> = top.iter().map(|m| m.municipality.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alfa"]);
    }

    #[test]
    fn test_unknown_state_gives_empty_totals() {
        let totals = municipality_totals(&sample(), "AC").unwrap();
        assert!(totals.is_empty());
        assert!(top_n_by_metric(&totals, MunicipalityMetric::Area, 10).is_empty());
    }
}
