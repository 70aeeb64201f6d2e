use crate::error::{Result, SisserError};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use tabled::Tabled;

/// Known columns of the SISSER extract that the pipeline types explicitly.
///
/// Every other non-dropped column is carried through as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    PolicyId,
    State,
    Municipality,
    Company,
    Area,
    Premium,
    CoverageLimit,
    EstimatedProductivity,
    InsuredProductivity,
    FederalSubsidy,
    AnimalCount,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::PolicyId,
        Column::State,
        Column::Municipality,
        Column::Company,
        Column::Area,
        Column::Premium,
        Column::CoverageLimit,
        Column::EstimatedProductivity,
        Column::InsuredProductivity,
        Column::FederalSubsidy,
        Column::AnimalCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::PolicyId => "NR_APOLICE",
            Column::State => "SG_UF_PROPRIEDADE",
            Column::Municipality => "NM_MUNICIPIO_PROPRIEDADE",
            Column::Company => "NM_RAZAO_SOCIAL",
            Column::Area => "NR_AREA_TOTAL",
            Column::Premium => "VL_PREMIO_LIQUIDO",
            Column::CoverageLimit => "VL_LIMITE_GARANTIA",
            Column::EstimatedProductivity => "NR_PRODUTIVIDADE_ESTIMADA",
            Column::InsuredProductivity => "NR_PRODUTIVIDADE_SEGURADA",
            Column::FederalSubsidy => "VL_SUBVENCAO_FEDERAL",
            Column::AnimalCount => "NR_ANIMAL",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            Column::PolicyId | Column::State | Column::Municipality | Column::Company
        )
    }
}

/// Numeric fields that arrive as decimal-comma text and feed the correlation matrix.
pub const CORRELATION_FIELDS: [Column; 6] = [
    Column::Area,
    Column::Premium,
    Column::CoverageLimit,
    Column::EstimatedProductivity,
    Column::InsuredProductivity,
    Column::FederalSubsidy,
];

/// Identifying or unused columns removed during cleaning.
pub const DROPPED_COLUMNS: [&str; 22] = [
    "CD_PROCESSO_SUSEP",
    "NR_PROPOSTA",
    "ID_PROPOSTA",
    "DT_PROPOSTA",
    "DT_INICIO_VIGENCIA",
    "DT_FIM_VIGENCIA",
    "NM_SEGURADO",
    "NR_DOCUMENTO_SEGURADO",
    "LATITUDE",
    "NR_GRAU_LAT",
    "NR_MIN_LAT",
    "NR_SEG_LAT",
    "LONGITUDE",
    "NR_GRAU_LONG",
    "NR_MIN_LONG",
    "NR_SEG_LONG",
    "NR_DECIMAL_LATITUDE",
    "NR_DECIMAL_LONGITUDE",
    "NivelDeCobertura",
    "DT_APOLICE",
    "ANO_APOLICE",
    "CD_GEOCMU",
];

/// One cleaned policy/property row.
///
/// `extra` holds the pass-through columns of the owning [`CleanTable`], in
/// the order given by [`CleanTable::extra_columns`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanRecord {
    pub policy_id: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
    pub company: Option<String>,
    pub area: Option<f64>,
    pub premium: Option<f64>,
    pub coverage_limit: Option<f64>,
    pub estimated_productivity: Option<f64>,
    pub insured_productivity: Option<f64>,
    pub federal_subsidy: Option<f64>,
    pub animal_count: Option<f64>,
    pub extra: Vec<Option<String>>,
}

impl CleanRecord {
    pub fn numeric(&self, column: Column) -> Option<f64> {
        match column {
            Column::Area => self.area,
            Column::Premium => self.premium,
            Column::CoverageLimit => self.coverage_limit,
            Column::EstimatedProductivity => self.estimated_productivity,
            Column::InsuredProductivity => self.insured_productivity,
            Column::FederalSubsidy => self.federal_subsidy,
            Column::AnimalCount => self.animal_count,
            _ => None,
        }
    }

    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::PolicyId => self.policy_id.as_deref(),
            Column::State => self.state.as_deref(),
            Column::Municipality => self.municipality.as_deref(),
            Column::Company => self.company.as_deref(),
            _ => None,
        }
    }

    pub fn set_numeric(&mut self, column: Column, value: Option<f64>) {
        match column {
            Column::Area => self.area = value,
            Column::Premium => self.premium = value,
            Column::CoverageLimit => self.coverage_limit = value,
            Column::EstimatedProductivity => self.estimated_productivity = value,
            Column::InsuredProductivity => self.insured_productivity = value,
            Column::FederalSubsidy => self.federal_subsidy = value,
            Column::AnimalCount => self.animal_count = value,
            _ => {}
        }
    }

    pub fn set_text(&mut self, column: Column, value: Option<String>) {
        match column {
            Column::PolicyId => self.policy_id = value,
            Column::State => self.state = value,
            Column::Municipality => self.municipality = value,
            Column::Company => self.company = value,
            _ => {}
        }
    }
}

/// The cleaned dataset: typed records plus the column layout they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanTable {
    /// Known columns that were present in the source header.
    pub present: BTreeSet<Column>,
    /// Names of the pass-through text columns, in source order.
    pub extra_columns: Vec<String>,
    pub records: Vec<CleanRecord>,
}

impl CleanTable {
    pub fn has(&self, column: Column) -> bool {
        self.present.contains(&column)
    }

    pub fn require(&self, column: Column) -> Result<()> {
        if self.has(column) {
            Ok(())
        } else {
            Err(SisserError::MissingColumn(column.name()))
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn display_f64(v: &f64) -> String {
    crate::util::format_number(*v, 2)
}

fn display_opt_f64(v: &Option<f64>) -> String {
    v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn display_states(v: &[String]) -> String {
    v.join(", ")
}

fn join_states<S: Serializer>(v: &[String], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&v.join("|"))
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct StateAggregate {
    #[serde(rename = "SG_UF_PROPRIEDADE")]
    #[tabled(rename = "UF")]
    pub state: String,
    #[tabled(rename = "Área Total", display_with = "display_f64")]
    pub area_total: f64,
    #[tabled(rename = "Valor Total", display_with = "display_f64")]
    pub valor_total: f64,
    #[tabled(rename = "Nº Seguros")]
    pub numero_seguros: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CompanyAggregate {
    #[serde(rename = "NM_RAZAO_SOCIAL")]
    #[tabled(rename = "Razão Social")]
    pub company: String,
    #[tabled(rename = "Nº Seguros")]
    pub numero_seguros: usize,
    #[tabled(rename = "Área Total", display_with = "display_f64")]
    pub area_total: f64,
    #[tabled(rename = "Valor Total", display_with = "display_f64")]
    pub valor_total: f64,
    #[serde(serialize_with = "join_states")]
    #[tabled(rename = "Estados", display_with = "display_states")]
    pub estados: Vec<String>,
    #[tabled(rename = "Contagem Estados")]
    pub contagem_estados: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CompanyStateAggregate {
    #[serde(rename = "NM_RAZAO_SOCIAL")]
    #[tabled(rename = "Razão Social")]
    pub company: String,
    #[serde(rename = "SG_UF_PROPRIEDADE")]
    #[tabled(rename = "UF")]
    pub state: String,
    #[tabled(rename = "Nº Seguros")]
    pub numero_seguros: usize,
    #[tabled(rename = "Área Total", display_with = "display_f64")]
    pub area_total: f64,
    #[tabled(rename = "Valor Total", display_with = "display_f64")]
    pub valor_total: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MunicipalityTotals {
    #[serde(rename = "NM_MUNICIPIO_PROPRIEDADE")]
    #[tabled(rename = "Município")]
    pub municipality: String,
    #[tabled(rename = "Área Total", display_with = "display_f64")]
    pub area_total: f64,
    #[tabled(rename = "Valor Total", display_with = "display_f64")]
    pub valor_total: f64,
}

/// Square Pearson matrix; `values[i][j]` pairs `fields[i]` with `fields[j]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMatrix {
    pub fields: Vec<Column>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, a: Column, b: Column) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == a)?;
        let j = self.fields.iter().position(|f| *f == b)?;
        self.values[i][j]
    }
}

/// Rendered correlation row for CSV export and console preview.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CorrelationRow {
    #[serde(rename = "campo")]
    #[tabled(rename = "Campo")]
    pub field: String,
    #[tabled(rename = "NR_AREA_TOTAL", display_with = "display_opt_f64")]
    #[serde(rename = "NR_AREA_TOTAL")]
    pub area: Option<f64>,
    #[tabled(rename = "VL_PREMIO_LIQUIDO", display_with = "display_opt_f64")]
    #[serde(rename = "VL_PREMIO_LIQUIDO")]
    pub premium: Option<f64>,
    #[tabled(rename = "VL_LIMITE_GARANTIA", display_with = "display_opt_f64")]
    #[serde(rename = "VL_LIMITE_GARANTIA")]
    pub coverage_limit: Option<f64>,
    #[tabled(rename = "NR_PRODUTIVIDADE_ESTIMADA", display_with = "display_opt_f64")]
    #[serde(rename = "NR_PRODUTIVIDADE_ESTIMADA")]
    pub estimated_productivity: Option<f64>,
    #[tabled(rename = "NR_PRODUTIVIDADE_SEGURADA", display_with = "display_opt_f64")]
    #[serde(rename = "NR_PRODUTIVIDADE_SEGURADA")]
    pub insured_productivity: Option<f64>,
    #[tabled(rename = "VL_SUBVENCAO_FEDERAL", display_with = "display_opt_f64")]
    #[serde(rename = "VL_SUBVENCAO_FEDERAL")]
    pub federal_subsidy: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MetricCard {
    #[tabled(rename = "Métrica")]
    pub metric: String,
    #[tabled(rename = "Razão Social")]
    pub holder: String,
    #[tabled(rename = "Máximo", display_with = "display_f64")]
    pub max: f64,
    #[tabled(rename = "Média", display_with = "display_f64")]
    pub mean: f64,
    #[tabled(rename = "% vs Média", display_with = "display_f64")]
    pub pct_over_mean: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct StateLeader {
    #[tabled(rename = "Métrica")]
    pub metric: String,
    #[tabled(rename = "UF")]
    pub state: String,
    #[tabled(rename = "Valor", display_with = "display_f64")]
    pub value: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ValueShare {
    #[serde(rename = "NM_RAZAO_SOCIAL")]
    #[tabled(rename = "Razão Social")]
    pub company: String,
    #[tabled(rename = "Valor Total", display_with = "display_f64")]
    pub valor_total: f64,
    #[tabled(rename = "% do Total", display_with = "display_f64")]
    pub share_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub total_rows: usize,
    pub total_policies: usize,
    pub total_companies: usize,
    pub total_states: usize,
    pub state_leaders: Vec<StateLeader>,
    pub metric_cards: Vec<MetricCard>,
}
